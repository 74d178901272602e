// Sync orchestrator: the per-playlist pipeline that matches provider
// tracks against the local server, downloads the gaps, mirrors the
// playlist and records the leftovers.

pub mod resolver;
pub mod service;

pub use resolver::{resolve_track, ResolvedTrack};
pub use service::{ProgressCallback, SyncService};

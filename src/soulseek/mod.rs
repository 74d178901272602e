// Adapter for the slskd peer-to-peer transfer daemon: rate-limited search
// with incremental result streaming, download enqueueing with endpoint
// fallbacks, and search-history maintenance. All outbound requests are
// serialized through a process-wide lock; the daemon tolerates only one
// concurrent operation.

pub mod client;
pub mod results;

pub use client::{SearchRateLimiter, SoulseekClient};
pub use results::{AlbumResult, AudioQuality, DownloadStatus, TrackResult};

// Catalog store: the durable local mirror of the media servers' libraries,
// plus the wishlist, watchlist and process-wide preferences.

pub mod client;
pub mod migrations;
pub mod models;

pub use client::{CompletionStats, Database, LibraryCounts};
pub use models::{
    CatalogAlbum, CatalogTrack, DbAlbum, DbArtist, DbTrack, SourceType, WatchlistArtist,
    WishlistEntry,
};

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use crate::models::ServerSource;

/// Parse a stored timestamp. Rows written by this crate use RFC 3339;
/// legacy rows may carry SQLite's `CURRENT_TIMESTAMP` format.
pub fn parse_timestamp(value: Option<String>) -> Option<DateTime<Utc>> {
    let value = value?;
    if let Ok(parsed) = DateTime::parse_from_rfc3339(&value) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(&value, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

fn genres_from_json(value: Option<String>) -> Option<Vec<String>> {
    value.and_then(|v| serde_json::from_str(&v).ok())
}

pub fn genres_to_json(genres: &Option<Vec<String>>) -> Option<String> {
    genres
        .as_ref()
        .map(|g| serde_json::to_string(g).unwrap_or_else(|_| "[]".to_string()))
}

/// An artist row. `id` is the media server's identifier, kept as opaque
/// text so integer and GUID backends both fit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DbArtist {
    pub id: String,
    pub name: String,
    pub thumb_url: Option<String>,
    pub genres: Option<Vec<String>>,
    /// Tracking markers only (`last_update:<ts>`, `ignore_update`), never a
    /// full biography.
    pub summary: Option<String>,
    pub server_source: ServerSource,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl DbArtist {
    pub fn from_row(row: &SqliteRow) -> DbArtist {
        DbArtist {
            id: row.get("id"),
            name: row.get("name"),
            thumb_url: row.get("thumb_url"),
            genres: genres_from_json(row.get("genres")),
            summary: row.get("summary"),
            server_source: ServerSource::parse(&row.get::<String, _>("server_source")),
            created_at: parse_timestamp(row.get("created_at")),
            updated_at: parse_timestamp(row.get("updated_at")),
        }
    }
}

/// An album row, owned by exactly one artist per server source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DbAlbum {
    pub id: String,
    pub artist_id: String,
    pub title: String,
    pub year: Option<i32>,
    pub thumb_url: Option<String>,
    pub genres: Option<Vec<String>>,
    /// Track count reported by the server, used for edition scoring.
    pub track_count: Option<i64>,
    pub duration_ms: Option<i64>,
    pub server_source: ServerSource,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl DbAlbum {
    pub fn from_row(row: &SqliteRow) -> DbAlbum {
        DbAlbum {
            id: row.get("id"),
            artist_id: row.get("artist_id"),
            title: row.get("title"),
            year: row.get("year"),
            thumb_url: row.get("thumb_url"),
            genres: genres_from_json(row.get("genres")),
            track_count: row.get("track_count"),
            duration_ms: row.get("duration"),
            server_source: ServerSource::parse(&row.get::<String, _>("server_source")),
            created_at: parse_timestamp(row.get("created_at")),
            updated_at: parse_timestamp(row.get("updated_at")),
        }
    }
}

/// A track row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DbTrack {
    pub id: String,
    pub album_id: String,
    pub artist_id: String,
    pub title: String,
    pub track_number: Option<i32>,
    pub duration_ms: Option<i64>,
    pub file_path: Option<String>,
    pub bitrate: Option<i32>,
    pub server_source: ServerSource,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl DbTrack {
    pub fn from_row(row: &SqliteRow) -> DbTrack {
        DbTrack {
            id: row.get("id"),
            album_id: row.get("album_id"),
            artist_id: row.get("artist_id"),
            title: row.get("title"),
            track_number: row.get("track_number"),
            duration_ms: row.get("duration"),
            file_path: row.get("file_path"),
            bitrate: row.get("bitrate"),
            server_source: ServerSource::parse(&row.get::<String, _>("server_source")),
            created_at: parse_timestamp(row.get("created_at")),
            updated_at: parse_timestamp(row.get("updated_at")),
        }
    }
}

/// A track joined with its artist and album names, as the matching queries
/// need them.
#[derive(Debug, Clone)]
pub struct CatalogTrack {
    pub track: DbTrack,
    pub artist_name: String,
    pub album_title: String,
}

impl CatalogTrack {
    pub fn from_row(row: &SqliteRow) -> CatalogTrack {
        CatalogTrack {
            track: DbTrack::from_row(row),
            artist_name: row.get("artist_name"),
            album_title: row.get("album_title"),
        }
    }
}

/// An album joined with its artist name.
#[derive(Debug, Clone)]
pub struct CatalogAlbum {
    pub album: DbAlbum,
    pub artist_name: String,
}

impl CatalogAlbum {
    pub fn from_row(row: &SqliteRow) -> CatalogAlbum {
        CatalogAlbum {
            album: DbAlbum::from_row(row),
            artist_name: row.get("artist_name"),
        }
    }
}

/// An artist monitored for new releases. Server-agnostic: keyed by the
/// remote provider's artist id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchlistArtist {
    pub id: i64,
    pub external_artist_id: String,
    pub artist_name: String,
    pub date_added: Option<DateTime<Utc>>,
    pub last_scan_timestamp: Option<DateTime<Utc>>,
    pub image_url: Option<String>,
    pub include_albums: bool,
    pub include_eps: bool,
    pub include_singles: bool,
    pub include_live: bool,
    pub include_remixes: bool,
    pub include_acoustic: bool,
    pub include_compilations: bool,
}

impl WatchlistArtist {
    pub fn from_row(row: &SqliteRow) -> WatchlistArtist {
        WatchlistArtist {
            id: row.get("id"),
            external_artist_id: row.get("external_artist_id"),
            artist_name: row.get("artist_name"),
            date_added: parse_timestamp(row.get("date_added")),
            last_scan_timestamp: parse_timestamp(row.get("last_scan_timestamp")),
            image_url: row.get("image_url"),
            include_albums: row.get("include_albums"),
            include_eps: row.get("include_eps"),
            include_singles: row.get("include_singles"),
            include_live: row.get("include_live"),
            include_remixes: row.get("include_remixes"),
            include_acoustic: row.get("include_acoustic"),
            include_compilations: row.get("include_compilations"),
        }
    }
}

/// Where a wishlist entry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Playlist,
    Album,
    Manual,
    Unknown,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Playlist => "playlist",
            SourceType::Album => "album",
            SourceType::Manual => "manual",
            SourceType::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> SourceType {
        match s {
            "playlist" => SourceType::Playlist,
            "album" => SourceType::Album,
            "manual" => SourceType::Manual,
            _ => SourceType::Unknown,
        }
    }
}

/// A track that could not be fulfilled, kept for later retry. Deduplicated
/// by (lowercase name, lowercase primary artist), not by external id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WishlistEntry {
    pub id: i64,
    pub external_track_id: String,
    /// Full provider track payload, replayed on retry.
    pub track_data: serde_json::Value,
    pub failure_reason: Option<String>,
    pub retry_count: i64,
    pub last_attempted: Option<DateTime<Utc>>,
    pub date_added: Option<DateTime<Utc>>,
    pub source_type: SourceType,
    pub source_info: serde_json::Value,
}

impl WishlistEntry {
    pub fn from_row(row: &SqliteRow) -> WishlistEntry {
        let track_data = serde_json::from_str(&row.get::<String, _>("track_data"))
            .unwrap_or(serde_json::Value::Null);
        let source_info = row
            .get::<Option<String>, _>("source_info")
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or(serde_json::Value::Null);

        WishlistEntry {
            id: row.get("id"),
            external_track_id: row.get("external_track_id"),
            track_data,
            failure_reason: row.get("failure_reason"),
            retry_count: row.get("retry_count"),
            last_attempted: parse_timestamp(row.get("last_attempted")),
            date_added: parse_timestamp(row.get("date_added")),
            source_type: SourceType::parse(&row.get::<String, _>("source_type")),
            source_info,
        }
    }

    /// Track name from the stored payload.
    pub fn track_name(&self) -> String {
        self.track_data
            .get("name")
            .and_then(|v| v.as_str())
            .unwrap_or("Unknown Track")
            .to_string()
    }

    /// Primary artist name from the stored payload.
    pub fn primary_artist(&self) -> String {
        self.track_data
            .get("artists")
            .and_then(|a| a.as_array())
            .and_then(|a| a.first())
            .and_then(|a| a.get("name"))
            .and_then(|v| v.as_str())
            .unwrap_or("Unknown Artist")
            .to_string()
    }
}

use std::future::Future;
use std::path::Path;
use std::time::Duration;

use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode};
use sqlx::{Connection, Row, SqliteConnection};
use tracing::{debug, info, warn};

use super::migrations;
use super::models::{
    CatalogAlbum, CatalogTrack, DbAlbum, DbArtist, DbTrack, SourceType, WatchlistArtist,
    WishlistEntry,
};
use crate::matching::{
    album_confidence, album_title_variations, artist_variations, normalize,
    track_confidence, track_title_variations,
};
use crate::models::ServerSource;
use crate::quality::QualityProfile;

const BUSY_TIMEOUT: Duration = Duration::from_secs(30);
const WRITE_RETRY_ATTEMPTS: u32 = 3;
const WRITE_RETRY_BASE: Duration = Duration::from_millis(100);

/// Aggregate library counts, optionally scoped to one server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LibraryCounts {
    pub artists: i64,
    pub albums: i64,
    pub tracks: i64,
}

/// Album completion buckets for one artist.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompletionStats {
    /// >= 90% of expected tracks.
    pub complete: usize,
    /// 80-89%.
    pub nearly_complete: usize,
    /// 1-79%.
    pub partial: usize,
    /// No tracks at all.
    pub missing: usize,
    pub total: usize,
}

/// The catalog store.
///
/// Every operation opens a fresh connection (WAL, 30 s busy timeout,
/// foreign keys on); connections are never shared across tasks. Writes
/// that still hit a lock retry with geometric backoff.
#[derive(Debug, Clone)]
pub struct Database {
    options: SqliteConnectOptions,
}

impl Database {
    /// Open (creating if needed) the catalog at `path` and bring the schema
    /// up to date.
    pub async fn new(path: &Path) -> Result<Database, sqlx::Error> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(sqlx::Error::Io)?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT)
            .foreign_keys(true);

        let db = Database { options };

        let mut conn = db.connect().await?;
        migrations::run(&mut conn).await?;
        conn.close().await?;

        info!("Catalog database ready at {}", path.display());
        Ok(db)
    }

    async fn connect(&self) -> Result<SqliteConnection, sqlx::Error> {
        SqliteConnection::connect_with(&self.options).await
    }

    // ------------------------------------------------------------------
    // Library records
    // ------------------------------------------------------------------

    /// Insert or update an artist record.
    pub async fn upsert_artist(&self, artist: &DbArtist) -> Result<(), sqlx::Error> {
        with_write_retry("upsert artist", || async move {
            let mut conn = self.connect().await?;
            sqlx::query(
                r#"
                INSERT INTO artists (id, name, thumb_url, genres, summary, server_source, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    name = excluded.name,
                    thumb_url = excluded.thumb_url,
                    genres = excluded.genres,
                    summary = excluded.summary,
                    server_source = excluded.server_source,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(&artist.id)
            .bind(&artist.name)
            .bind(&artist.thumb_url)
            .bind(super::models::genres_to_json(&artist.genres))
            .bind(&artist.summary)
            .bind(artist.server_source.as_str())
            .bind(timestamp_or_now(artist.created_at))
            .bind(Utc::now().to_rfc3339())
            .execute(&mut conn)
            .await?;
            Ok(())
        })
        .await
    }

    /// Insert or update an album record.
    pub async fn upsert_album(&self, album: &DbAlbum) -> Result<(), sqlx::Error> {
        with_write_retry("upsert album", || async move {
            let mut conn = self.connect().await?;
            sqlx::query(
                r#"
                INSERT INTO albums (id, artist_id, title, year, thumb_url, genres, track_count, duration, server_source, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    artist_id = excluded.artist_id,
                    title = excluded.title,
                    year = excluded.year,
                    thumb_url = excluded.thumb_url,
                    genres = excluded.genres,
                    track_count = excluded.track_count,
                    duration = excluded.duration,
                    server_source = excluded.server_source,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(&album.id)
            .bind(&album.artist_id)
            .bind(&album.title)
            .bind(album.year)
            .bind(&album.thumb_url)
            .bind(super::models::genres_to_json(&album.genres))
            .bind(album.track_count)
            .bind(album.duration_ms)
            .bind(album.server_source.as_str())
            .bind(timestamp_or_now(album.created_at))
            .bind(Utc::now().to_rfc3339())
            .execute(&mut conn)
            .await?;
            Ok(())
        })
        .await
    }

    /// Insert or update a track record.
    pub async fn upsert_track(&self, track: &DbTrack) -> Result<(), sqlx::Error> {
        with_write_retry("upsert track", || async move {
            let mut conn = self.connect().await?;
            sqlx::query(
                r#"
                INSERT INTO tracks (id, album_id, artist_id, title, track_number, duration, file_path, bitrate, server_source, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    album_id = excluded.album_id,
                    artist_id = excluded.artist_id,
                    title = excluded.title,
                    track_number = excluded.track_number,
                    duration = excluded.duration,
                    file_path = excluded.file_path,
                    bitrate = excluded.bitrate,
                    server_source = excluded.server_source,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(&track.id)
            .bind(&track.album_id)
            .bind(&track.artist_id)
            .bind(&track.title)
            .bind(track.track_number)
            .bind(track.duration_ms)
            .bind(&track.file_path)
            .bind(track.bitrate)
            .bind(track.server_source.as_str())
            .bind(timestamp_or_now(track.created_at))
            .bind(Utc::now().to_rfc3339())
            .execute(&mut conn)
            .await?;
            Ok(())
        })
        .await
    }

    pub async fn get_artist(&self, artist_id: &str) -> Result<Option<DbArtist>, sqlx::Error> {
        let mut conn = self.connect().await?;
        let row = sqlx::query("SELECT * FROM artists WHERE id = ?")
            .bind(artist_id)
            .fetch_optional(&mut conn)
            .await?;
        Ok(row.map(|r| DbArtist::from_row(&r)))
    }

    pub async fn get_album(&self, album_id: &str) -> Result<Option<DbAlbum>, sqlx::Error> {
        let mut conn = self.connect().await?;
        let row = sqlx::query("SELECT * FROM albums WHERE id = ?")
            .bind(album_id)
            .fetch_optional(&mut conn)
            .await?;
        Ok(row.map(|r| DbAlbum::from_row(&r)))
    }

    /// Fetch a track with its artist and album names.
    pub async fn get_track(&self, track_id: &str) -> Result<Option<CatalogTrack>, sqlx::Error> {
        let mut conn = self.connect().await?;
        let row = sqlx::query(
            r#"
            SELECT tracks.*, artists.name AS artist_name, albums.title AS album_title
            FROM tracks
            JOIN artists ON tracks.artist_id = artists.id
            JOIN albums ON tracks.album_id = albums.id
            WHERE tracks.id = ?
            "#,
        )
        .bind(track_id)
        .fetch_optional(&mut conn)
        .await?;
        Ok(row.map(|r| CatalogTrack::from_row(&r)))
    }

    pub async fn get_albums_by_artist(&self, artist_id: &str) -> Result<Vec<DbAlbum>, sqlx::Error> {
        let mut conn = self.connect().await?;
        let rows = sqlx::query("SELECT * FROM albums WHERE artist_id = ? ORDER BY title")
            .bind(artist_id)
            .fetch_all(&mut conn)
            .await?;
        Ok(rows.iter().map(DbAlbum::from_row).collect())
    }

    pub async fn get_tracks_by_album(&self, album_id: &str) -> Result<Vec<DbTrack>, sqlx::Error> {
        let mut conn = self.connect().await?;
        let rows = sqlx::query("SELECT * FROM tracks WHERE album_id = ? ORDER BY track_number")
            .bind(album_id)
            .fetch_all(&mut conn)
            .await?;
        Ok(rows.iter().map(DbTrack::from_row).collect())
    }

    // ------------------------------------------------------------------
    // Search
    // ------------------------------------------------------------------

    pub async fn search_artists(
        &self,
        query: &str,
        limit: i64,
    ) -> Result<Vec<DbArtist>, sqlx::Error> {
        let mut conn = self.connect().await?;
        let rows = sqlx::query("SELECT * FROM artists WHERE name LIKE ? ORDER BY name LIMIT ?")
            .bind(format!("%{}%", query))
            .bind(limit)
            .fetch_all(&mut conn)
            .await?;
        Ok(rows.iter().map(DbArtist::from_row).collect())
    }

    /// Search tracks by title and/or artist name.
    ///
    /// Three strategies, cheapest first: plain SQL LIKE, a diacritic-folded
    /// LIKE with client-side refiltering (SQL LIKE is accent-sensitive),
    /// then a tokenized fuzzy sweep scored by term hits.
    pub async fn search_tracks(
        &self,
        title: &str,
        artist: &str,
        limit: i64,
        server_source: Option<ServerSource>,
    ) -> Result<Vec<CatalogTrack>, sqlx::Error> {
        if title.is_empty() && artist.is_empty() {
            return Ok(Vec::new());
        }

        let mut conn = self.connect().await?;

        let basic = self
            .search_tracks_basic(&mut conn, title, artist, limit, server_source)
            .await?;
        if !basic.is_empty() {
            debug!("basic track search found {} results", basic.len());
            return Ok(basic);
        }

        let folded = self
            .search_tracks_folded(&mut conn, title, artist, limit, server_source)
            .await?;
        if !folded.is_empty() {
            debug!("folded track search found {} results", folded.len());
            return Ok(folded);
        }

        let fuzzy = self
            .search_tracks_fuzzy(&mut conn, title, artist, limit)
            .await?;
        if !fuzzy.is_empty() {
            debug!("fuzzy track search found {} results", fuzzy.len());
        }
        Ok(fuzzy)
    }

    async fn search_tracks_basic(
        &self,
        conn: &mut SqliteConnection,
        title: &str,
        artist: &str,
        limit: i64,
        server_source: Option<ServerSource>,
    ) -> Result<Vec<CatalogTrack>, sqlx::Error> {
        let mut conditions = Vec::new();
        let mut binds: Vec<String> = Vec::new();

        if !title.is_empty() {
            conditions.push("tracks.title LIKE ?");
            binds.push(format!("%{}%", title));
        }
        if !artist.is_empty() {
            conditions.push("artists.name LIKE ?");
            binds.push(format!("%{}%", artist));
        }
        if let Some(source) = server_source {
            conditions.push("tracks.server_source = ?");
            binds.push(source.as_str().to_string());
        }

        let sql = format!(
            r#"
            SELECT tracks.*, artists.name AS artist_name, albums.title AS album_title
            FROM tracks
            JOIN artists ON tracks.artist_id = artists.id
            JOIN albums ON tracks.album_id = albums.id
            WHERE {}
            ORDER BY tracks.title, artists.name
            LIMIT ?
            "#,
            conditions.join(" AND ")
        );

        let mut query = sqlx::query(&sql);
        for bind in &binds {
            query = query.bind(bind);
        }
        let rows = query.bind(limit).fetch_all(conn).await?;
        Ok(rows.iter().map(CatalogTrack::from_row).collect())
    }

    async fn search_tracks_folded(
        &self,
        conn: &mut SqliteConnection,
        title: &str,
        artist: &str,
        limit: i64,
        server_source: Option<ServerSource>,
    ) -> Result<Vec<CatalogTrack>, sqlx::Error> {
        let title_norm = normalize(title);
        let artist_norm = normalize(artist);

        let mut conditions = Vec::new();
        let mut binds: Vec<String> = Vec::new();

        if !title.is_empty() {
            conditions.push("LOWER(tracks.title) LIKE ?");
            binds.push(format!("%{}%", title_norm));
        }
        if !artist.is_empty() {
            conditions.push("LOWER(artists.name) LIKE ?");
            binds.push(format!("%{}%", artist_norm));
        }
        if let Some(source) = server_source {
            conditions.push("tracks.server_source = ?");
            binds.push(source.as_str().to_string());
        }

        let sql = format!(
            r#"
            SELECT tracks.*, artists.name AS artist_name, albums.title AS album_title
            FROM tracks
            JOIN artists ON tracks.artist_id = artists.id
            JOIN albums ON tracks.album_id = albums.id
            WHERE {}
            ORDER BY tracks.title, artists.name
            LIMIT ?
            "#,
            conditions.join(" AND ")
        );

        let mut query = sqlx::query(&sql);
        for bind in &binds {
            query = query.bind(bind);
        }
        // Over-fetch: the SQL side misses accented rows, the refilter below
        // decides with proper folding.
        let rows = query.bind(limit * 2).fetch_all(conn).await?;

        let mut tracks = Vec::new();
        for row in &rows {
            let candidate = CatalogTrack::from_row(row);
            let title_matches =
                title.is_empty() || normalize(&candidate.track.title).contains(&title_norm);
            let artist_matches =
                artist.is_empty() || normalize(&candidate.artist_name).contains(&artist_norm);
            if title_matches && artist_matches {
                tracks.push(candidate);
                if tracks.len() as i64 >= limit {
                    break;
                }
            }
        }
        Ok(tracks)
    }

    async fn search_tracks_fuzzy(
        &self,
        conn: &mut SqliteConnection,
        title: &str,
        artist: &str,
        limit: i64,
    ) -> Result<Vec<CatalogTrack>, sqlx::Error> {
        let mut terms: Vec<String> = Vec::new();
        for source in [title, artist] {
            terms.extend(
                source
                    .to_lowercase()
                    .split_whitespace()
                    .filter(|w| w.len() >= 3)
                    .map(|w| w.to_string()),
            );
        }
        terms.truncate(5);
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let conditions: Vec<&str> = terms
            .iter()
            .map(|_| "(LOWER(tracks.title) LIKE ? OR LOWER(artists.name) LIKE ?)")
            .collect();
        let sql = format!(
            r#"
            SELECT tracks.*, artists.name AS artist_name, albums.title AS album_title
            FROM tracks
            JOIN artists ON tracks.artist_id = artists.id
            JOIN albums ON tracks.album_id = albums.id
            WHERE {}
            ORDER BY tracks.title, artists.name
            LIMIT ?
            "#,
            conditions.join(" OR ")
        );

        let mut query = sqlx::query(&sql);
        for term in &terms {
            let pattern = format!("%{}%", term);
            query = query.bind(pattern.clone());
            query = query.bind(pattern);
        }
        let rows = query.bind(limit * 3).fetch_all(conn).await?;

        let mut scored: Vec<(usize, CatalogTrack)> = rows
            .iter()
            .map(|row| {
                let candidate = CatalogTrack::from_row(row);
                let title_lower = candidate.track.title.to_lowercase();
                let artist_lower = candidate.artist_name.to_lowercase();
                let score = terms
                    .iter()
                    .filter(|t| title_lower.contains(*t) || artist_lower.contains(*t))
                    .count();
                (score, candidate)
            })
            .filter(|(score, _)| *score > 0)
            .collect();

        scored.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(scored
            .into_iter()
            .take(limit as usize)
            .map(|(_, t)| t)
            .collect())
    }

    /// Search albums by title and/or artist name.
    pub async fn search_albums(
        &self,
        title: &str,
        artist: &str,
        limit: i64,
        server_source: Option<ServerSource>,
    ) -> Result<Vec<CatalogAlbum>, sqlx::Error> {
        let mut conditions = Vec::new();
        let mut binds: Vec<String> = Vec::new();

        if !title.is_empty() {
            conditions.push("albums.title LIKE ?");
            binds.push(format!("%{}%", title));
        }
        if !artist.is_empty() {
            conditions.push("artists.name LIKE ?");
            binds.push(format!("%{}%", artist));
        }
        if let Some(source) = server_source {
            conditions.push("albums.server_source = ?");
            binds.push(source.as_str().to_string());
        }
        if conditions.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            r#"
            SELECT albums.*, artists.name AS artist_name
            FROM albums
            JOIN artists ON albums.artist_id = artists.id
            WHERE {}
            ORDER BY albums.title, artists.name
            LIMIT ?
            "#,
            conditions.join(" AND ")
        );

        let mut conn = self.connect().await?;
        let mut query = sqlx::query(&sql);
        for bind in &binds {
            query = query.bind(bind);
        }
        let rows = query.bind(limit).fetch_all(&mut conn).await?;
        Ok(rows.iter().map(CatalogAlbum::from_row).collect())
    }

    // ------------------------------------------------------------------
    // Existence queries
    // ------------------------------------------------------------------

    /// Decide whether a track already exists in the catalog.
    ///
    /// Iterates title variations, searches each with every artist alias
    /// (including the diacritic-folded spelling), scores all candidates and
    /// returns the best when it clears the threshold. The second element is
    /// always the best confidence seen, matched or not.
    pub async fn check_track_exists(
        &self,
        title: &str,
        artist: &str,
        confidence_threshold: f64,
        server_source: Option<ServerSource>,
    ) -> Result<(Option<CatalogTrack>, f64), sqlx::Error> {
        let title_variations = track_title_variations(title);
        debug!(
            "track existence check for '{}' by '{}': {} variations",
            title,
            artist,
            title_variations.len()
        );

        let mut best_match: Option<CatalogTrack> = None;
        let mut best_confidence = 0.0_f64;

        for variation in &title_variations {
            let mut candidates = Vec::new();
            for artist_variation in artist_variations(artist) {
                candidates.extend(
                    self.search_tracks(variation, &artist_variation, 20, server_source)
                        .await?,
                );
            }

            for candidate in candidates {
                let confidence =
                    track_confidence(title, artist, &candidate.track.title, &candidate.artist_name);
                if confidence > best_confidence {
                    best_confidence = confidence;
                    best_match = Some(candidate);
                }
            }
        }

        if best_confidence >= confidence_threshold {
            if let Some(found) = &best_match {
                debug!(
                    "track match: '{}' -> '{}' (confidence {:.3})",
                    title, found.track.title, best_confidence
                );
            }
            Ok((best_match, best_confidence))
        } else {
            debug!(
                "no confident track match for '{}' (best {:.3}, threshold {:.2})",
                title, best_confidence, confidence_threshold
            );
            Ok((None, best_confidence))
        }
    }

    /// Edition-aware album existence check.
    ///
    /// Tries every album-title variation; when none clears the threshold,
    /// falls back to enumerating up to 100 of the artist's albums and
    /// rescoring them client-side, which sidesteps SQL LIKE's accent
    /// sensitivity entirely.
    pub async fn check_album_exists_with_editions(
        &self,
        title: &str,
        artist: &str,
        confidence_threshold: f64,
        expected_track_count: Option<i64>,
        server_source: Option<ServerSource>,
    ) -> Result<(Option<CatalogAlbum>, f64), sqlx::Error> {
        let title_variations = album_title_variations(title);
        debug!(
            "edition matching for '{}' by '{}': {} variations",
            title,
            artist,
            title_variations.len()
        );

        let mut best_match: Option<CatalogAlbum> = None;
        let mut best_confidence = 0.0_f64;

        for variation in &title_variations {
            let mut albums: Vec<CatalogAlbum> = Vec::new();
            for artist_variation in artist_variations(artist) {
                for album in self
                    .search_albums(variation, &artist_variation, 10, server_source)
                    .await?
                {
                    if !albums.iter().any(|a| a.album.id == album.album.id) {
                        albums.push(album);
                    }
                }
            }

            for candidate in albums {
                let confidence = album_confidence(
                    title,
                    artist,
                    &candidate.album.title,
                    &candidate.artist_name,
                    candidate.album.track_count,
                    expected_track_count,
                );
                if confidence > best_confidence {
                    best_confidence = confidence;
                    best_match = Some(candidate);
                }
            }
        }

        if best_match.is_some() && best_confidence >= confidence_threshold {
            return Ok((best_match, best_confidence));
        }

        // Broad fallback: rescore everything by this artist.
        debug!(
            "title search failed for '{}', trying broad artist fallback for '{}'",
            title, artist
        );
        let mut artist_albums: Vec<CatalogAlbum> = Vec::new();
        for artist_variation in artist_variations(artist) {
            for album in self
                .search_albums("", &artist_variation, 100, server_source)
                .await?
            {
                if !artist_albums.iter().any(|a| a.album.id == album.album.id) {
                    artist_albums.push(album);
                }
            }
        }
        for candidate in artist_albums {
            let confidence = album_confidence(
                title,
                artist,
                &candidate.album.title,
                &candidate.artist_name,
                candidate.album.track_count,
                expected_track_count,
            );
            if confidence > best_confidence {
                best_confidence = confidence;
                best_match = Some(candidate);
            }
        }

        if best_match.is_some() && best_confidence >= confidence_threshold {
            Ok((best_match, best_confidence))
        } else {
            debug!(
                "no confident edition match for '{}' (best {:.3})",
                title, best_confidence
            );
            Ok((None, best_confidence))
        }
    }

    /// Album existence plus completeness in one call.
    pub async fn check_album_exists_with_completeness(
        &self,
        title: &str,
        artist: &str,
        expected_track_count: Option<i64>,
        confidence_threshold: f64,
        server_source: Option<ServerSource>,
    ) -> Result<(Option<CatalogAlbum>, f64, i64, i64, bool), sqlx::Error> {
        let (album, confidence) = self
            .check_album_exists_with_editions(
                title,
                artist,
                confidence_threshold,
                expected_track_count,
                server_source,
            )
            .await?;

        let Some(album) = album else {
            return Ok((None, 0.0, 0, 0, false));
        };

        let (owned, expected, complete) = self
            .check_album_completeness(&album.album.id, expected_track_count)
            .await?;
        Ok((Some(album), confidence, owned, expected, complete))
    }

    /// How many of an album's tracks the catalog holds.
    ///
    /// Complete means owning at least 90% of the expected count, or any
    /// tracks at all when the expected count is unknown.
    pub async fn check_album_completeness(
        &self,
        album_id: &str,
        expected_track_count: Option<i64>,
    ) -> Result<(i64, i64, bool), sqlx::Error> {
        let mut conn = self.connect().await?;

        let owned: i64 = sqlx::query("SELECT COUNT(*) AS n FROM tracks WHERE album_id = ?")
            .bind(album_id)
            .fetch_one(&mut conn)
            .await?
            .get("n");

        let stored: Option<i64> = sqlx::query("SELECT track_count FROM albums WHERE id = ?")
            .bind(album_id)
            .fetch_optional(&mut conn)
            .await?
            .and_then(|row| row.get("track_count"));

        let expected = expected_track_count.or(stored);
        let is_complete = match expected {
            Some(expected) if expected > 0 => {
                owned > 0 && (owned as f64 / expected as f64) >= 0.9
            }
            _ => owned > 0,
        };

        Ok((owned, expected.unwrap_or(0), is_complete))
    }

    /// Completion buckets for every album by artists matching `artist_name`.
    pub async fn album_completion_stats(
        &self,
        artist_name: &str,
    ) -> Result<CompletionStats, sqlx::Error> {
        let mut conn = self.connect().await?;
        let rows = sqlx::query(
            r#"
            SELECT albums.track_count, COUNT(tracks.id) AS actual_tracks
            FROM albums
            JOIN artists ON albums.artist_id = artists.id
            LEFT JOIN tracks ON albums.id = tracks.album_id
            WHERE artists.name LIKE ?
            GROUP BY albums.id, albums.track_count
            "#,
        )
        .bind(format!("%{}%", artist_name))
        .fetch_all(&mut conn)
        .await?;

        let mut stats = CompletionStats {
            total: rows.len(),
            ..Default::default()
        };
        for row in &rows {
            let expected: i64 = row.get::<Option<i64>, _>("track_count").unwrap_or(0).max(1);
            let actual: i64 = row.get("actual_tracks");
            let ratio = actual as f64 / expected as f64;

            if actual == 0 {
                stats.missing += 1;
            } else if ratio >= 0.9 {
                stats.complete += 1;
            } else if ratio >= 0.8 {
                stats.nearly_complete += 1;
            } else {
                stats.partial += 1;
            }
        }
        Ok(stats)
    }

    // ------------------------------------------------------------------
    // Statistics and maintenance
    // ------------------------------------------------------------------

    /// Library counts, optionally scoped to one server source.
    pub async fn statistics(
        &self,
        server_source: Option<ServerSource>,
    ) -> Result<LibraryCounts, sqlx::Error> {
        let mut conn = self.connect().await?;

        let counts = match server_source {
            Some(source) => {
                let artists: i64 = sqlx::query(
                    "SELECT COUNT(DISTINCT name) AS n FROM artists WHERE server_source = ?",
                )
                .bind(source.as_str())
                .fetch_one(&mut conn)
                .await?
                .get("n");
                let albums: i64 =
                    sqlx::query("SELECT COUNT(*) AS n FROM albums WHERE server_source = ?")
                        .bind(source.as_str())
                        .fetch_one(&mut conn)
                        .await?
                        .get("n");
                let tracks: i64 =
                    sqlx::query("SELECT COUNT(*) AS n FROM tracks WHERE server_source = ?")
                        .bind(source.as_str())
                        .fetch_one(&mut conn)
                        .await?
                        .get("n");
                LibraryCounts {
                    artists,
                    albums,
                    tracks,
                }
            }
            None => {
                let artists: i64 = sqlx::query("SELECT COUNT(*) AS n FROM artists")
                    .fetch_one(&mut conn)
                    .await?
                    .get("n");
                let albums: i64 = sqlx::query("SELECT COUNT(*) AS n FROM albums")
                    .fetch_one(&mut conn)
                    .await?
                    .get("n");
                let tracks: i64 = sqlx::query("SELECT COUNT(*) AS n FROM tracks")
                    .fetch_one(&mut conn)
                    .await?
                    .get("n");
                LibraryCounts {
                    artists,
                    albums,
                    tracks,
                }
            }
        };

        Ok(counts)
    }

    /// Delete all library rows for one server source, leaving the other
    /// source and the server-agnostic wishlist/watchlist untouched.
    /// Vacuums when enough rows went away to matter.
    pub async fn clear_server_data(&self, server_source: ServerSource) -> Result<(), sqlx::Error> {
        let mut conn = self.connect().await?;

        // Order matters: tracks -> albums -> artists.
        let tracks_deleted = sqlx::query("DELETE FROM tracks WHERE server_source = ?")
            .bind(server_source.as_str())
            .execute(&mut conn)
            .await?
            .rows_affected();
        let albums_deleted = sqlx::query("DELETE FROM albums WHERE server_source = ?")
            .bind(server_source.as_str())
            .execute(&mut conn)
            .await?
            .rows_affected();
        let artists_deleted = sqlx::query("DELETE FROM artists WHERE server_source = ?")
            .bind(server_source.as_str())
            .execute(&mut conn)
            .await?
            .rows_affected();

        if tracks_deleted > 1000 || albums_deleted > 100 {
            info!("Vacuuming database to reclaim disk space...");
            sqlx::query("VACUUM").execute(&mut conn).await?;
        }

        info!(
            "Cleared {} data: {} artists, {} albums, {} tracks",
            server_source, artists_deleted, albums_deleted, tracks_deleted
        );
        Ok(())
    }

    /// Remove artists and albums that no longer have any tracks.
    pub async fn cleanup_orphaned_records(&self) -> Result<(u64, u64), sqlx::Error> {
        let mut conn = self.connect().await?;

        let albums_removed = sqlx::query(
            r#"
            DELETE FROM albums
            WHERE id NOT IN (SELECT DISTINCT album_id FROM tracks WHERE album_id IS NOT NULL)
            "#,
        )
        .execute(&mut conn)
        .await?
        .rows_affected();

        let artists_removed = sqlx::query(
            r#"
            DELETE FROM artists
            WHERE id NOT IN (SELECT DISTINCT artist_id FROM tracks WHERE artist_id IS NOT NULL)
            "#,
        )
        .execute(&mut conn)
        .await?
        .rows_affected();

        if artists_removed > 0 || albums_removed > 0 {
            info!(
                "Removed {} orphaned artists and {} orphaned albums",
                artists_removed, albums_removed
            );
        }
        Ok((artists_removed, albums_removed))
    }

    // ------------------------------------------------------------------
    // Metadata and preferences
    // ------------------------------------------------------------------

    pub async fn set_metadata(&self, key: &str, value: &str) -> Result<(), sqlx::Error> {
        with_write_retry("set metadata", || async move {
            let mut conn = self.connect().await?;
            sqlx::query("INSERT OR REPLACE INTO metadata (key, value, updated_at) VALUES (?, ?, ?)")
                .bind(key)
                .bind(value)
                .bind(Utc::now().to_rfc3339())
                .execute(&mut conn)
                .await?;
            Ok(())
        })
        .await
    }

    pub async fn get_metadata(&self, key: &str) -> Result<Option<String>, sqlx::Error> {
        let mut conn = self.connect().await?;
        let row = sqlx::query("SELECT value FROM metadata WHERE key = ?")
            .bind(key)
            .fetch_optional(&mut conn)
            .await?;
        Ok(row.and_then(|r| r.get("value")))
    }

    pub async fn record_full_refresh_completion(&self) -> Result<(), sqlx::Error> {
        self.set_metadata("last_full_refresh", &Utc::now().to_rfc3339())
            .await
    }

    pub async fn get_last_full_refresh(&self) -> Result<Option<String>, sqlx::Error> {
        self.get_metadata("last_full_refresh").await
    }

    pub async fn set_preference(&self, key: &str, value: &str) -> Result<(), sqlx::Error> {
        self.set_metadata(&format!("preference_{}", key), value).await
    }

    pub async fn get_preference(&self, key: &str) -> Result<Option<String>, sqlx::Error> {
        self.get_metadata(&format!("preference_{}", key)).await
    }

    /// Persist which music library a backend should use, e.g.
    /// `primary_music_library = "Music"`.
    pub async fn set_library_preference(
        &self,
        source: ServerSource,
        library_name: &str,
    ) -> Result<(), sqlx::Error> {
        self.set_preference(&format!("{}_music_library", source), library_name)
            .await
    }

    pub async fn get_library_preference(
        &self,
        source: ServerSource,
    ) -> Result<Option<String>, sqlx::Error> {
        self.get_preference(&format!("{}_music_library", source)).await
    }

    /// The process-wide quality profile. Unset or malformed JSON yields the
    /// balanced default.
    pub async fn get_quality_profile(&self) -> QualityProfile {
        let stored = match self.get_preference("quality_profile").await {
            Ok(value) => value,
            Err(e) => {
                warn!("Failed to read quality profile: {}", e);
                None
            }
        };

        match stored {
            Some(json) => serde_json::from_str(&json).unwrap_or_else(|e| {
                warn!("Failed to parse quality profile JSON ({}), using default", e);
                QualityProfile::balanced()
            }),
            None => QualityProfile::balanced(),
        }
    }

    pub async fn set_quality_profile(&self, profile: &QualityProfile) -> Result<(), sqlx::Error> {
        let json = serde_json::to_string(profile).unwrap_or_default();
        self.set_preference("quality_profile", &json).await?;
        info!("Quality profile saved: preset={}", profile.preset);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Wishlist
    // ------------------------------------------------------------------

    /// Add an unfulfilled track to the wishlist.
    ///
    /// Deduplicated by (normalized name, normalized primary artist) rather
    /// than the external id, which drifts between playlist fetches. Returns
    /// false when a duplicate already exists.
    pub async fn add_to_wishlist(
        &self,
        track_data: &serde_json::Value,
        failure_reason: &str,
        source_type: SourceType,
        source_info: &serde_json::Value,
    ) -> Result<bool, sqlx::Error> {
        let Some(track_id) = track_data.get("id").and_then(|v| v.as_str()) else {
            warn!("Cannot add track to wishlist: missing external track id");
            return Ok(false);
        };

        let track_name = track_data
            .get("name")
            .and_then(|v| v.as_str())
            .unwrap_or("Unknown Track");
        let artist_name = track_data
            .get("artists")
            .and_then(|a| a.as_array())
            .and_then(|a| a.first())
            .and_then(|a| a.get("name"))
            .and_then(|v| v.as_str())
            .unwrap_or("Unknown Artist");

        let name_key = normalize(track_name);
        let artist_key = normalize(artist_name);

        let existing = self.get_wishlist_tracks(None).await?;
        for entry in &existing {
            if normalize(&entry.track_name()) == name_key
                && normalize(&entry.primary_artist()) == artist_key
            {
                info!(
                    "Skipping duplicate wishlist entry: '{}' by {} (already exists as id {})",
                    track_name, artist_name, entry.id
                );
                return Ok(false);
            }
        }

        let track_json = track_data.to_string();
        let source_json = source_info.to_string();
        let external_id = track_id.to_string();

        with_write_retry("wishlist insert", || {
            let track_json = track_json.clone();
            let source_json = source_json.clone();
            let external_id = external_id.clone();
            async move {
                let mut conn = self.connect().await?;
                sqlx::query(
                    r#"
                    INSERT INTO wishlist_tracks
                        (external_track_id, track_data, failure_reason, source_type, source_info, date_added)
                    VALUES (?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(external_id)
                .bind(track_json)
                .bind(failure_reason)
                .bind(source_type.as_str())
                .bind(source_json)
                .bind(Utc::now().to_rfc3339())
                .execute(&mut conn)
                .await?;
                Ok(())
            }
        })
        .await?;

        info!("Added track to wishlist: '{}' by {}", track_name, artist_name);
        Ok(true)
    }

    /// Remove a wishlist entry, typically after a successful re-download.
    pub async fn remove_from_wishlist(&self, external_track_id: &str) -> Result<bool, sqlx::Error> {
        let mut conn = self.connect().await?;
        let affected = sqlx::query("DELETE FROM wishlist_tracks WHERE external_track_id = ?")
            .bind(external_track_id)
            .execute(&mut conn)
            .await?
            .rows_affected();
        Ok(affected > 0)
    }

    /// Wishlist entries, oldest first so retries prioritize the longest
    /// waiting tracks.
    pub async fn get_wishlist_tracks(
        &self,
        limit: Option<i64>,
    ) -> Result<Vec<WishlistEntry>, sqlx::Error> {
        let mut conn = self.connect().await?;
        let rows = match limit {
            Some(limit) => {
                sqlx::query("SELECT * FROM wishlist_tracks ORDER BY date_added LIMIT ?")
                    .bind(limit)
                    .fetch_all(&mut conn)
                    .await?
            }
            None => {
                sqlx::query("SELECT * FROM wishlist_tracks ORDER BY date_added")
                    .fetch_all(&mut conn)
                    .await?
            }
        };
        Ok(rows.iter().map(WishlistEntry::from_row).collect())
    }

    /// Record the outcome of a retry: success deletes the entry, failure
    /// bumps the retry count and stamps the attempt.
    pub async fn update_wishlist_retry(
        &self,
        external_track_id: &str,
        success: bool,
        error_message: Option<&str>,
    ) -> Result<bool, sqlx::Error> {
        let mut conn = self.connect().await?;
        let affected = if success {
            sqlx::query("DELETE FROM wishlist_tracks WHERE external_track_id = ?")
                .bind(external_track_id)
                .execute(&mut conn)
                .await?
                .rows_affected()
        } else {
            sqlx::query(
                r#"
                UPDATE wishlist_tracks
                SET retry_count = retry_count + 1,
                    last_attempted = ?,
                    failure_reason = COALESCE(?, failure_reason)
                WHERE external_track_id = ?
                "#,
            )
            .bind(Utc::now().to_rfc3339())
            .bind(error_message)
            .bind(external_track_id)
            .execute(&mut conn)
            .await?
            .rows_affected()
        };
        Ok(affected > 0)
    }

    pub async fn wishlist_count(&self) -> Result<i64, sqlx::Error> {
        let mut conn = self.connect().await?;
        let row = sqlx::query("SELECT COUNT(*) AS n FROM wishlist_tracks")
            .fetch_one(&mut conn)
            .await?;
        Ok(row.get("n"))
    }

    pub async fn clear_wishlist(&self) -> Result<u64, sqlx::Error> {
        let mut conn = self.connect().await?;
        let affected = sqlx::query("DELETE FROM wishlist_tracks")
            .execute(&mut conn)
            .await?
            .rows_affected();
        info!("Cleared {} tracks from wishlist", affected);
        Ok(affected)
    }

    /// Sweep duplicate wishlist rows, keeping the oldest per
    /// (name, artist) key.
    pub async fn remove_wishlist_duplicates(&self) -> Result<usize, sqlx::Error> {
        let entries = self.get_wishlist_tracks(None).await?;

        let mut seen: std::collections::HashMap<(String, String), i64> =
            std::collections::HashMap::new();
        let mut duplicates = Vec::new();

        for entry in &entries {
            let key = (
                normalize(&entry.track_name()),
                normalize(&entry.primary_artist()),
            );
            match seen.get(&key) {
                Some(kept) => {
                    info!(
                        "Found duplicate wishlist entry '{}' (id {}, keeping id {})",
                        entry.track_name(),
                        entry.id,
                        kept
                    );
                    duplicates.push(entry.id);
                }
                None => {
                    seen.insert(key, entry.id);
                }
            }
        }

        let mut conn = self.connect().await?;
        for id in &duplicates {
            sqlx::query("DELETE FROM wishlist_tracks WHERE id = ?")
                .bind(id)
                .execute(&mut conn)
                .await?;
        }

        if !duplicates.is_empty() {
            info!("Removed {} duplicate wishlist entries", duplicates.len());
        }
        Ok(duplicates.len())
    }

    // ------------------------------------------------------------------
    // Watchlist
    // ------------------------------------------------------------------

    pub async fn add_artist_to_watchlist(
        &self,
        external_artist_id: &str,
        artist_name: &str,
    ) -> Result<bool, sqlx::Error> {
        let now = Utc::now().to_rfc3339();
        let result = with_write_retry("watchlist insert", || {
            let now = now.clone();
            async move {
                let mut conn = self.connect().await?;
                sqlx::query(
                    r#"
                    INSERT OR IGNORE INTO watchlist_artists
                        (external_artist_id, artist_name, date_added, created_at, updated_at)
                    VALUES (?, ?, ?, ?, ?)
                    "#,
                )
                .bind(external_artist_id)
                .bind(artist_name)
                .bind(&now)
                .bind(&now)
                .bind(&now)
                .execute(&mut conn)
                .await
            }
        })
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn remove_artist_from_watchlist(
        &self,
        external_artist_id: &str,
    ) -> Result<bool, sqlx::Error> {
        let mut conn = self.connect().await?;
        let affected = sqlx::query("DELETE FROM watchlist_artists WHERE external_artist_id = ?")
            .bind(external_artist_id)
            .execute(&mut conn)
            .await?
            .rows_affected();
        Ok(affected > 0)
    }

    pub async fn is_artist_in_watchlist(
        &self,
        external_artist_id: &str,
    ) -> Result<bool, sqlx::Error> {
        let mut conn = self.connect().await?;
        let row = sqlx::query("SELECT 1 AS one FROM watchlist_artists WHERE external_artist_id = ?")
            .bind(external_artist_id)
            .fetch_optional(&mut conn)
            .await?;
        Ok(row.is_some())
    }

    pub async fn get_watchlist_artists(&self) -> Result<Vec<WatchlistArtist>, sqlx::Error> {
        let mut conn = self.connect().await?;
        let rows = sqlx::query("SELECT * FROM watchlist_artists ORDER BY artist_name")
            .fetch_all(&mut conn)
            .await?;
        Ok(rows.iter().map(WatchlistArtist::from_row).collect())
    }

    pub async fn watchlist_count(&self) -> Result<i64, sqlx::Error> {
        let mut conn = self.connect().await?;
        let row = sqlx::query("SELECT COUNT(*) AS n FROM watchlist_artists")
            .fetch_one(&mut conn)
            .await?;
        Ok(row.get("n"))
    }

    pub async fn update_watchlist_artist_image(
        &self,
        external_artist_id: &str,
        image_url: &str,
    ) -> Result<bool, sqlx::Error> {
        let mut conn = self.connect().await?;
        let affected = sqlx::query(
            "UPDATE watchlist_artists SET image_url = ?, updated_at = ? WHERE external_artist_id = ?",
        )
        .bind(image_url)
        .bind(Utc::now().to_rfc3339())
        .bind(external_artist_id)
        .execute(&mut conn)
        .await?
        .rows_affected();
        Ok(affected > 0)
    }

    pub async fn update_watchlist_last_scan(
        &self,
        external_artist_id: &str,
    ) -> Result<bool, sqlx::Error> {
        let mut conn = self.connect().await?;
        let affected = sqlx::query(
            "UPDATE watchlist_artists SET last_scan_timestamp = ?, updated_at = ? WHERE external_artist_id = ?",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(Utc::now().to_rfc3339())
        .bind(external_artist_id)
        .execute(&mut conn)
        .await?
        .rows_affected();
        Ok(affected > 0)
    }

    /// Update the release-type include flags for a watchlist artist.
    pub async fn update_watchlist_filters(
        &self,
        external_artist_id: &str,
        artist: &WatchlistArtist,
    ) -> Result<bool, sqlx::Error> {
        let mut conn = self.connect().await?;
        let affected = sqlx::query(
            r#"
            UPDATE watchlist_artists SET
                include_albums = ?, include_eps = ?, include_singles = ?,
                include_live = ?, include_remixes = ?, include_acoustic = ?,
                include_compilations = ?, updated_at = ?
            WHERE external_artist_id = ?
            "#,
        )
        .bind(artist.include_albums)
        .bind(artist.include_eps)
        .bind(artist.include_singles)
        .bind(artist.include_live)
        .bind(artist.include_remixes)
        .bind(artist.include_acoustic)
        .bind(artist.include_compilations)
        .bind(Utc::now().to_rfc3339())
        .bind(external_artist_id)
        .execute(&mut conn)
        .await?
        .rows_affected();
        Ok(affected > 0)
    }
}

fn timestamp_or_now(value: Option<chrono::DateTime<Utc>>) -> String {
    value.unwrap_or_else(Utc::now).to_rfc3339()
}

fn is_locked(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db)
            if db.message().contains("locked") || db.message().contains("busy")
    )
}

/// Retry a write that hit SQLITE_BUSY with geometric backoff. Other errors
/// propagate immediately.
async fn with_write_retry<T, F, Fut>(label: &str, f: F) -> Result<T, sqlx::Error>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, sqlx::Error>>,
{
    let mut delay = WRITE_RETRY_BASE;
    let mut attempt = 1;
    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(e) if is_locked(&e) && attempt < WRITE_RETRY_ATTEMPTS => {
                warn!(
                    "{} hit a locked database (attempt {}/{}), retrying in {:?}",
                    label, attempt, WRITE_RETRY_ATTEMPTS, delay
                );
                tokio::time::sleep(delay).await;
                delay *= 2;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

// Schema creation and the ordered migration chain. Every migration is
// idempotent; the destructive ID-type migration is additionally guarded by
// a marker row in the metadata table and runs in one transaction.

use sqlx::{Connection, Row, SqliteConnection};
use tracing::{debug, info};

/// Create tables when missing, then apply migrations in order.
pub async fn run(conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    create_base_tables(conn).await?;
    add_server_source_columns(conn).await?;
    migrate_id_columns_to_text(conn).await?;
    add_watchlist_extensions(conn).await?;
    Ok(())
}

async fn create_base_tables(conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS artists (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            thumb_url TEXT,
            genres TEXT,
            summary TEXT,
            created_at TEXT,
            updated_at TEXT
        )
        "#,
    )
    .execute(&mut *conn)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS albums (
            id INTEGER PRIMARY KEY,
            artist_id INTEGER NOT NULL,
            title TEXT NOT NULL,
            year INTEGER,
            thumb_url TEXT,
            genres TEXT,
            track_count INTEGER,
            duration INTEGER,
            created_at TEXT,
            updated_at TEXT,
            FOREIGN KEY (artist_id) REFERENCES artists (id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(&mut *conn)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tracks (
            id INTEGER PRIMARY KEY,
            album_id INTEGER NOT NULL,
            artist_id INTEGER NOT NULL,
            title TEXT NOT NULL,
            track_number INTEGER,
            duration INTEGER,
            file_path TEXT,
            bitrate INTEGER,
            created_at TEXT,
            updated_at TEXT,
            FOREIGN KEY (album_id) REFERENCES albums (id) ON DELETE CASCADE,
            FOREIGN KEY (artist_id) REFERENCES artists (id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(&mut *conn)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS metadata (
            key TEXT PRIMARY KEY,
            value TEXT,
            updated_at TEXT
        )
        "#,
    )
    .execute(&mut *conn)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS wishlist_tracks (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            external_track_id TEXT NOT NULL,
            track_data TEXT NOT NULL,
            failure_reason TEXT,
            retry_count INTEGER DEFAULT 0,
            last_attempted TEXT,
            date_added TEXT,
            source_type TEXT DEFAULT 'unknown',
            source_info TEXT
        )
        "#,
    )
    .execute(&mut *conn)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS watchlist_artists (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            external_artist_id TEXT UNIQUE NOT NULL,
            artist_name TEXT NOT NULL,
            date_added TEXT,
            last_scan_timestamp TEXT,
            created_at TEXT,
            updated_at TEXT
        )
        "#,
    )
    .execute(&mut *conn)
    .await?;

    for statement in [
        "CREATE INDEX IF NOT EXISTS idx_albums_artist_id ON albums (artist_id)",
        "CREATE INDEX IF NOT EXISTS idx_tracks_album_id ON tracks (album_id)",
        "CREATE INDEX IF NOT EXISTS idx_tracks_artist_id ON tracks (artist_id)",
        "CREATE INDEX IF NOT EXISTS idx_artists_name ON artists (name)",
        "CREATE INDEX IF NOT EXISTS idx_albums_title ON albums (title)",
        "CREATE INDEX IF NOT EXISTS idx_tracks_title ON tracks (title)",
        "CREATE INDEX IF NOT EXISTS idx_wishlist_external_id ON wishlist_tracks (external_track_id)",
        "CREATE INDEX IF NOT EXISTS idx_wishlist_date_added ON wishlist_tracks (date_added)",
        "CREATE INDEX IF NOT EXISTS idx_watchlist_external_id ON watchlist_artists (external_artist_id)",
    ] {
        sqlx::query(statement).execute(&mut *conn).await?;
    }

    Ok(())
}

async fn column_exists(
    conn: &mut SqliteConnection,
    table: &str,
    column: &str,
) -> Result<bool, sqlx::Error> {
    let rows = sqlx::query(&format!("PRAGMA table_info({})", table))
        .fetch_all(&mut *conn)
        .await?;
    Ok(rows
        .iter()
        .any(|row| row.get::<String, _>("name") == column))
}

/// Migration 1: `server_source` column on library tables, defaulting to the
/// primary backend.
async fn add_server_source_columns(conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    for table in ["artists", "albums", "tracks"] {
        if !column_exists(conn, table, "server_source").await? {
            sqlx::query(&format!(
                "ALTER TABLE {} ADD COLUMN server_source TEXT DEFAULT 'primary'",
                table
            ))
            .execute(&mut *conn)
            .await?;
            info!("Added server_source column to {} table", table);
        }
    }

    for statement in [
        "CREATE INDEX IF NOT EXISTS idx_artists_server_source ON artists (server_source)",
        "CREATE INDEX IF NOT EXISTS idx_albums_server_source ON albums (server_source)",
        "CREATE INDEX IF NOT EXISTS idx_tracks_server_source ON tracks (server_source)",
    ] {
        sqlx::query(statement).execute(&mut *conn).await?;
    }

    Ok(())
}

/// Migration 2: ID columns to TEXT, so integer and GUID backends coexist.
///
/// SQLite cannot retype a column in place: new tables are created, rows
/// copied with integer-to-text casts, old tables dropped, indexes rebuilt.
/// The whole rewrite commits atomically, then a marker row records
/// completion so the migration can never run twice.
async fn migrate_id_columns_to_text(conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    let marker = sqlx::query("SELECT value FROM metadata WHERE key = 'id_columns_migrated' LIMIT 1")
        .fetch_optional(&mut *conn)
        .await?;
    if marker.is_some() {
        debug!("ID columns migration already applied");
        return Ok(());
    }

    info!("Migrating ID columns to text...");
    let mut tx = conn.begin().await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS artists_new (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            thumb_url TEXT,
            genres TEXT,
            summary TEXT,
            server_source TEXT DEFAULT 'primary',
            created_at TEXT,
            updated_at TEXT
        )
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS albums_new (
            id TEXT PRIMARY KEY,
            artist_id TEXT NOT NULL,
            title TEXT NOT NULL,
            year INTEGER,
            thumb_url TEXT,
            genres TEXT,
            track_count INTEGER,
            duration INTEGER,
            server_source TEXT DEFAULT 'primary',
            created_at TEXT,
            updated_at TEXT,
            FOREIGN KEY (artist_id) REFERENCES artists_new (id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tracks_new (
            id TEXT PRIMARY KEY,
            album_id TEXT NOT NULL,
            artist_id TEXT NOT NULL,
            title TEXT NOT NULL,
            track_number INTEGER,
            duration INTEGER,
            file_path TEXT,
            bitrate INTEGER,
            server_source TEXT DEFAULT 'primary',
            created_at TEXT,
            updated_at TEXT,
            FOREIGN KEY (album_id) REFERENCES albums_new (id) ON DELETE CASCADE,
            FOREIGN KEY (artist_id) REFERENCES artists_new (id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO artists_new (id, name, thumb_url, genres, summary, server_source, created_at, updated_at)
        SELECT CAST(id AS TEXT), name, thumb_url, genres, summary,
               COALESCE(server_source, 'primary'), created_at, updated_at
        FROM artists
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO albums_new (id, artist_id, title, year, thumb_url, genres, track_count, duration, server_source, created_at, updated_at)
        SELECT CAST(id AS TEXT), CAST(artist_id AS TEXT), title, year, thumb_url, genres, track_count, duration,
               COALESCE(server_source, 'primary'), created_at, updated_at
        FROM albums
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO tracks_new (id, album_id, artist_id, title, track_number, duration, file_path, bitrate, server_source, created_at, updated_at)
        SELECT CAST(id AS TEXT), CAST(album_id AS TEXT), CAST(artist_id AS TEXT), title, track_number, duration, file_path, bitrate,
               COALESCE(server_source, 'primary'), created_at, updated_at
        FROM tracks
        "#,
    )
    .execute(&mut *tx)
    .await?;

    for statement in [
        "DROP TABLE IF EXISTS tracks",
        "DROP TABLE IF EXISTS albums",
        "DROP TABLE IF EXISTS artists",
        "ALTER TABLE artists_new RENAME TO artists",
        "ALTER TABLE albums_new RENAME TO albums",
        "ALTER TABLE tracks_new RENAME TO tracks",
        "CREATE INDEX IF NOT EXISTS idx_albums_artist_id ON albums (artist_id)",
        "CREATE INDEX IF NOT EXISTS idx_tracks_album_id ON tracks (album_id)",
        "CREATE INDEX IF NOT EXISTS idx_tracks_artist_id ON tracks (artist_id)",
        "CREATE INDEX IF NOT EXISTS idx_artists_server_source ON artists (server_source)",
        "CREATE INDEX IF NOT EXISTS idx_albums_server_source ON albums (server_source)",
        "CREATE INDEX IF NOT EXISTS idx_tracks_server_source ON tracks (server_source)",
        "CREATE INDEX IF NOT EXISTS idx_artists_name ON artists (name)",
        "CREATE INDEX IF NOT EXISTS idx_albums_title ON albums (title)",
        "CREATE INDEX IF NOT EXISTS idx_tracks_title ON tracks (title)",
    ] {
        sqlx::query(statement).execute(&mut *tx).await?;
    }

    sqlx::query(
        "INSERT OR REPLACE INTO metadata (key, value, updated_at) VALUES ('id_columns_migrated', 'true', ?)",
    )
    .bind(chrono::Utc::now().to_rfc3339())
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    info!("ID columns migration completed");
    Ok(())
}

/// Migration 3: watchlist `image_url` plus per-artist release-type include
/// flags.
async fn add_watchlist_extensions(conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    if !column_exists(conn, "watchlist_artists", "image_url").await? {
        sqlx::query("ALTER TABLE watchlist_artists ADD COLUMN image_url TEXT")
            .execute(&mut *conn)
            .await?;
        info!("Added image_url column to watchlist_artists table");
    }

    let flags = [
        ("include_albums", 1),
        ("include_eps", 1),
        ("include_singles", 1),
        ("include_live", 0),
        ("include_remixes", 0),
        ("include_acoustic", 0),
        ("include_compilations", 0),
    ];
    for (column, default) in flags {
        if !column_exists(conn, "watchlist_artists", column).await? {
            sqlx::query(&format!(
                "ALTER TABLE watchlist_artists ADD COLUMN {} BOOLEAN NOT NULL DEFAULT {}",
                column, default
            ))
            .execute(&mut *conn)
            .await?;
        }
    }

    Ok(())
}

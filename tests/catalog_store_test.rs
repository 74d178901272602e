// Catalog store behavior: schema migration, fuzzy existence queries,
// wishlist dedup, server-scoped clears and preference handling.

mod support;

use cadence::db::{DbAlbum, DbArtist, DbTrack, SourceType};
use cadence::models::ServerSource;
use cadence::quality::QualityProfile;
use sqlx::{Connection, Row, SqliteConnection};
use support::temp_database;

fn artist(id: &str, name: &str, source: ServerSource) -> DbArtist {
    DbArtist {
        id: id.to_string(),
        name: name.to_string(),
        thumb_url: None,
        genres: None,
        summary: None,
        server_source: source,
        created_at: None,
        updated_at: None,
    }
}

fn album(id: &str, artist_id: &str, title: &str, track_count: Option<i64>, source: ServerSource) -> DbAlbum {
    DbAlbum {
        id: id.to_string(),
        artist_id: artist_id.to_string(),
        title: title.to_string(),
        year: None,
        thumb_url: None,
        genres: None,
        track_count,
        duration_ms: None,
        server_source: source,
        created_at: None,
        updated_at: None,
    }
}

fn track(id: &str, album_id: &str, artist_id: &str, title: &str, source: ServerSource) -> DbTrack {
    DbTrack {
        id: id.to_string(),
        album_id: album_id.to_string(),
        artist_id: artist_id.to_string(),
        title: title.to_string(),
        track_number: None,
        duration_ms: None,
        file_path: None,
        bitrate: None,
        server_source: source,
        created_at: None,
        updated_at: None,
    }
}

fn provider_track_json(id: &str, name: &str, artist: &str) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "name": name,
        "artists": [{"name": artist}],
        "album": {"name": "Album"},
        "duration_ms": 240000,
    })
}

#[tokio::test]
async fn migration_marker_set_and_id_columns_are_text() {
    let (db, dir) = temp_database().await;

    let marker = db.get_metadata("id_columns_migrated").await.unwrap();
    assert_eq!(marker.as_deref(), Some("true"));

    // Inspect the live schema directly.
    let path = dir.path().join("catalog.db");
    let mut conn = SqliteConnection::connect(&format!("sqlite://{}", path.display()))
        .await
        .unwrap();
    for table in ["artists", "albums", "tracks"] {
        let rows = sqlx::query(&format!("PRAGMA table_info({})", table))
            .fetch_all(&mut conn)
            .await
            .unwrap();
        let id_type: String = rows
            .iter()
            .find(|r| r.get::<String, _>("name") == "id")
            .map(|r| r.get("type"))
            .unwrap();
        assert_eq!(id_type, "TEXT", "{} id column should be TEXT", table);
    }
}

#[tokio::test]
async fn reopening_the_catalog_is_idempotent() {
    let (db, dir) = temp_database().await;
    db.upsert_artist(&artist("ar-1", "Artist", ServerSource::Primary))
        .await
        .unwrap();
    drop(db);

    let db = cadence::db::Database::new(&dir.path().join("catalog.db"))
        .await
        .expect("reopen catalog");
    let found = db.get_artist("ar-1").await.unwrap();
    assert_eq!(found.unwrap().name, "Artist");
}

#[tokio::test]
async fn string_ids_round_trip_through_library_records() {
    let (db, _dir) = temp_database().await;
    let guid = "a1b2c3d4-e5f6-a7b8-c9d0-e1f2a3b4c5d6";

    db.upsert_artist(&artist(guid, "Guid Artist", ServerSource::Primary))
        .await
        .unwrap();
    db.upsert_album(&album("al-1", guid, "Album", None, ServerSource::Primary))
        .await
        .unwrap();
    db.upsert_track(&track("42", "al-1", guid, "Track", ServerSource::Primary))
        .await
        .unwrap();

    // Integer-looking and GUID ids coexist as text.
    assert!(db.get_artist(guid).await.unwrap().is_some());
    assert!(db.get_track("42").await.unwrap().is_some());
}

#[tokio::test]
async fn diacritic_track_lookup_falls_back_to_folded_search() {
    let (db, _dir) = temp_database().await;

    db.upsert_artist(&artist("ar-1", "Subcarpati", ServerSource::Primary))
        .await
        .unwrap();
    db.upsert_album(&album("al-1", "ar-1", "Jertfa", Some(12), ServerSource::Primary))
        .await
        .unwrap();
    db.upsert_track(&track("tr-1", "al-1", "ar-1", "Jertfa", ServerSource::Primary))
        .await
        .unwrap();

    let (found, confidence) = db
        .check_track_exists("Jertfă", "Subcarpaţi", 0.7, Some(ServerSource::Primary))
        .await
        .unwrap();
    let found = found.expect("accented search should match folded library row");
    assert_eq!(found.track.id, "tr-1");
    assert!(confidence >= 0.8, "confidence was {confidence}");
}

#[tokio::test]
async fn diacritic_album_lookup_matches_with_high_confidence() {
    let (db, _dir) = temp_database().await;

    db.upsert_artist(&artist("ar-1", "Subcarpati", ServerSource::Primary))
        .await
        .unwrap();
    db.upsert_album(&album("al-1", "ar-1", "Jertfa", Some(12), ServerSource::Primary))
        .await
        .unwrap();

    let (found, confidence) = db
        .check_album_exists_with_editions("Jertfă", "Subcarpaţi", 0.8, None, Some(ServerSource::Primary))
        .await
        .unwrap();
    assert!(found.is_some(), "album should match via the normalized path");
    assert!(confidence >= 0.8, "confidence was {confidence}");
}

#[tokio::test]
async fn edition_upgrade_matches_with_bonus() {
    let (db, _dir) = temp_database().await;

    db.upsert_artist(&artist("ar-1", "Pink Floyd", ServerSource::Primary))
        .await
        .unwrap();
    db.upsert_album(&album(
        "al-1",
        "ar-1",
        "The Dark Side of the Moon (Deluxe Edition)",
        Some(14),
        ServerSource::Primary,
    ))
    .await
    .unwrap();

    let (found, confidence) = db
        .check_album_exists_with_editions(
            "The Dark Side of the Moon",
            "Pink Floyd",
            0.8,
            Some(10),
            Some(ServerSource::Primary),
        )
        .await
        .unwrap();
    assert!(found.is_some(), "deluxe edition should satisfy a base-title search");
    assert!(confidence >= 0.85, "confidence was {confidence}");
}

#[tokio::test]
async fn album_completeness_uses_ninety_percent_threshold() {
    let (db, _dir) = temp_database().await;

    db.upsert_artist(&artist("ar-1", "Artist", ServerSource::Primary))
        .await
        .unwrap();
    db.upsert_album(&album("al-1", "ar-1", "Album", Some(10), ServerSource::Primary))
        .await
        .unwrap();
    for i in 0..9 {
        db.upsert_track(&track(
            &format!("tr-{i}"),
            "al-1",
            "ar-1",
            &format!("Track {i}"),
            ServerSource::Primary,
        ))
        .await
        .unwrap();
    }

    let (owned, expected, complete) = db.check_album_completeness("al-1", None).await.unwrap();
    assert_eq!((owned, expected), (9, 10));
    assert!(complete, "9/10 tracks is at the 90% threshold");

    let (_, _, complete) = db.check_album_completeness("al-1", Some(14)).await.unwrap();
    assert!(!complete, "9/14 tracks is below the threshold");
}

#[tokio::test]
async fn wishlist_dedup_is_by_name_and_artist_not_id() {
    let (db, _dir) = temp_database().await;

    let first = db
        .add_to_wishlist(
            &provider_track_json("id-1", "Hey Jude", "The Beatles"),
            "Download failed",
            SourceType::Playlist,
            &serde_json::json!({}),
        )
        .await
        .unwrap();
    let second = db
        .add_to_wishlist(
            &provider_track_json("id-2", "hey jude", "the beatles"),
            "Download failed",
            SourceType::Manual,
            &serde_json::json!({}),
        )
        .await
        .unwrap();

    assert!(first);
    assert!(!second, "same (name, artist) with a different id must be dropped");
    assert_eq!(db.wishlist_count().await.unwrap(), 1);
}

#[tokio::test]
async fn wishlist_retry_bookkeeping() {
    let (db, _dir) = temp_database().await;
    db.add_to_wishlist(
        &provider_track_json("id-1", "Hey Jude", "The Beatles"),
        "Download failed",
        SourceType::Playlist,
        &serde_json::json!({}),
    )
    .await
    .unwrap();

    db.update_wishlist_retry("id-1", false, Some("Still no sources"))
        .await
        .unwrap();
    let entries = db.get_wishlist_tracks(None).await.unwrap();
    assert_eq!(entries[0].retry_count, 1);
    assert_eq!(entries[0].failure_reason.as_deref(), Some("Still no sources"));
    assert!(entries[0].last_attempted.is_some());

    db.update_wishlist_retry("id-1", true, None).await.unwrap();
    assert_eq!(db.wishlist_count().await.unwrap(), 0);
}

#[tokio::test]
async fn clear_server_data_only_touches_one_source() {
    let (db, _dir) = temp_database().await;

    for (suffix, source) in [("p", ServerSource::Primary), ("s", ServerSource::Secondary)] {
        db.upsert_artist(&artist(&format!("ar-{suffix}"), "Artist", source))
            .await
            .unwrap();
        db.upsert_album(&album(
            &format!("al-{suffix}"),
            &format!("ar-{suffix}"),
            "Album",
            None,
            source,
        ))
        .await
        .unwrap();
        db.upsert_track(&track(
            &format!("tr-{suffix}"),
            &format!("al-{suffix}"),
            &format!("ar-{suffix}"),
            "Track",
            source,
        ))
        .await
        .unwrap();
    }

    db.clear_server_data(ServerSource::Primary).await.unwrap();

    let primary = db.statistics(Some(ServerSource::Primary)).await.unwrap();
    assert_eq!((primary.artists, primary.albums, primary.tracks), (0, 0, 0));

    let secondary = db.statistics(Some(ServerSource::Secondary)).await.unwrap();
    assert_eq!((secondary.artists, secondary.albums, secondary.tracks), (1, 1, 1));

    // Wishlist and watchlist are server-agnostic and must survive.
    db.add_artist_to_watchlist("ext-1", "Watched").await.unwrap();
    db.clear_server_data(ServerSource::Secondary).await.unwrap();
    assert_eq!(db.watchlist_count().await.unwrap(), 1);
}

#[tokio::test]
async fn orphan_cleanup_removes_artists_and_albums_without_tracks() {
    let (db, _dir) = temp_database().await;

    db.upsert_artist(&artist("ar-1", "Kept", ServerSource::Primary))
        .await
        .unwrap();
    db.upsert_album(&album("al-1", "ar-1", "Kept Album", None, ServerSource::Primary))
        .await
        .unwrap();
    db.upsert_track(&track("tr-1", "al-1", "ar-1", "Track", ServerSource::Primary))
        .await
        .unwrap();

    db.upsert_artist(&artist("ar-2", "Orphan", ServerSource::Primary))
        .await
        .unwrap();
    db.upsert_album(&album("al-2", "ar-2", "Orphan Album", None, ServerSource::Primary))
        .await
        .unwrap();

    let (artists_removed, albums_removed) = db.cleanup_orphaned_records().await.unwrap();
    assert_eq!((artists_removed, albums_removed), (1, 1));
    assert!(db.get_artist("ar-1").await.unwrap().is_some());
    assert!(db.get_artist("ar-2").await.unwrap().is_none());
}

#[tokio::test]
async fn quality_profile_defaults_and_survives_malformed_json() {
    let (db, _dir) = temp_database().await;

    let profile = db.get_quality_profile().await;
    assert_eq!(profile.preset, "balanced");

    db.set_preference("quality_profile", "{definitely not json")
        .await
        .unwrap();
    let profile = db.get_quality_profile().await;
    assert_eq!(profile.preset, "balanced");

    db.set_quality_profile(&QualityProfile::audiophile())
        .await
        .unwrap();
    let profile = db.get_quality_profile().await;
    assert_eq!(profile.preset, "audiophile");
    assert!(!profile.fallback_enabled);
}

#[tokio::test]
async fn watchlist_flags_default_and_update() {
    let (db, _dir) = temp_database().await;

    assert!(db.add_artist_to_watchlist("ext-1", "Artist").await.unwrap());
    // Duplicate external id is ignored.
    assert!(!db.add_artist_to_watchlist("ext-1", "Artist").await.unwrap());
    assert!(db.is_artist_in_watchlist("ext-1").await.unwrap());

    let artists = db.get_watchlist_artists().await.unwrap();
    let watched = &artists[0];
    assert!(watched.include_albums && watched.include_eps && watched.include_singles);
    assert!(!watched.include_live && !watched.include_remixes);

    let mut updated = watched.clone();
    updated.include_live = true;
    db.update_watchlist_filters("ext-1", &updated).await.unwrap();
    db.update_watchlist_artist_image("ext-1", "http://img").await.unwrap();

    let artists = db.get_watchlist_artists().await.unwrap();
    assert!(artists[0].include_live);
    assert_eq!(artists[0].image_url.as_deref(), Some("http://img"));
}

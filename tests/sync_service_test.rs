// Orchestrator behavior: per-playlist single flight, cancellation, the
// three-tier resolver fallthrough, playlist mirroring with placeholder
// filtering, and wishlist handoff.

mod support;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use cadence::config::SoulseekSettings;
use cadence::db::{DbAlbum, DbArtist, DbTrack};
use cadence::models::{ProviderArtist, ProviderPlaylist, ProviderTrack, ServerSource, SyncProgress};
use cadence::soulseek::SoulseekClient;
use cadence::sync::SyncService;
use support::{temp_database, StubMediaServer};
use tempfile::TempDir;

fn provider_track(id: &str, name: &str, artist: &str) -> ProviderTrack {
    ProviderTrack {
        id: id.to_string(),
        name: name.to_string(),
        artists: vec![ProviderArtist {
            name: artist.to_string(),
        }],
        album: Some("Album".to_string()),
        duration_ms: Some(240_000),
        popularity: None,
        external_urls: None,
    }
}

fn playlist(name: &str, tracks: Vec<ProviderTrack>) -> ProviderPlaylist {
    ProviderPlaylist {
        id: format!("pl-{name}"),
        name: name.to_string(),
        tracks,
    }
}

struct Harness {
    service: Arc<SyncService>,
    stub: Arc<StubMediaServer>,
    db: cadence::db::Database,
    _db_dir: TempDir,
    transfer_dir: TempDir,
}

async fn harness_with(stub: StubMediaServer) -> Harness {
    let (db, db_dir) = temp_database().await;
    let transfer_dir = TempDir::new().unwrap();
    let stub = Arc::new(stub);
    let soulseek = Arc::new(SoulseekClient::new(&SoulseekSettings::default()));
    let service = Arc::new(SyncService::new(
        db.clone(),
        stub.clone(),
        soulseek,
        transfer_dir.path().to_path_buf(),
    ));
    Harness {
        service,
        stub,
        db,
        _db_dir: db_dir,
        transfer_dir,
    }
}

#[tokio::test]
async fn concurrent_sync_of_same_playlist_is_rejected() {
    let h = harness_with(StubMediaServer::with_delay(Duration::from_millis(50))).await;

    let tracks = vec![
        provider_track("t1", "Song One", "Artist"),
        provider_track("t2", "Song Two", "Artist"),
    ];
    let p = playlist("Daily Mix", tracks);

    let (first, second) = tokio::join!(
        h.service.sync_playlist(&p, false),
        h.service.sync_playlist(&p, false),
    );

    let rejected = [&first, &second]
        .iter()
        .filter(|r| {
            r.errors
                .iter()
                .any(|e| e.contains("Sync already in progress"))
        })
        .count();
    assert_eq!(rejected, 1, "exactly one of the two syncs must be rejected");

    let completed = if first.errors.is_empty() { &first } else { &second };
    assert_eq!(completed.total_tracks, 2);
}

#[tokio::test]
async fn sequential_resync_of_same_playlist_is_allowed() {
    let h = harness_with(StubMediaServer::new()).await;
    let p = playlist("Repeat", vec![provider_track("t1", "Song", "Artist")]);

    let first = h.service.sync_playlist(&p, false).await;
    let second = h.service.sync_playlist(&p, false).await;
    assert!(first.errors.is_empty());
    assert!(second.errors.is_empty(), "slot must be released after a sync ends");
}

#[tokio::test]
async fn cancelling_a_running_sync_returns_cancelled_result() {
    let h = harness_with(StubMediaServer::with_delay(Duration::from_millis(100))).await;

    let tracks: Vec<ProviderTrack> = (0..20)
        .map(|i| provider_track(&format!("t{i}"), &format!("Song {i}"), "Artist"))
        .collect();
    let p = playlist("Long Mix", tracks);

    let runner = {
        let service = h.service.clone();
        let p = p.clone();
        tokio::spawn(async move { service.sync_playlist(&p, false).await })
    };

    tokio::time::sleep(Duration::from_millis(120)).await;
    h.service.cancel_sync("Long Mix");

    let result = runner.await.unwrap();
    assert_eq!(result.errors, vec!["Sync cancelled".to_string()]);
    assert_eq!(result.total_tracks, 0);
    assert_eq!(result.synced_tracks, 0);
    assert!(!h.service.is_playlist_syncing("Long Mix"));
}

#[tokio::test]
async fn empty_playlist_is_a_semantic_failure() {
    let h = harness_with(StubMediaServer::new()).await;
    let result = h
        .service
        .sync_playlist(&playlist("Empty", Vec::new()), false)
        .await;
    assert!(result.errors.iter().any(|e| e.contains("has no tracks")));
    assert_eq!(result.total_tracks, 0);
}

#[tokio::test]
async fn matched_tracks_are_mirrored_and_misses_go_to_wishlist() {
    let stub = StubMediaServer::new();
    // One track resolvable on the server with a well-formed id.
    stub.add_metadata_hit("Song One", "Artist", "a1b2c3d4e5f6a7b8c9d0e1f2a3b4c5d6");
    let h = harness_with(stub).await;

    let tracks = vec![
        provider_track("t1", "Song One", "Artist"),
        provider_track("t2", "Unobtainable Song", "Artist"),
    ];
    let result = h.service.sync_playlist(&playlist("Mix", tracks), false).await;

    assert_eq!(result.total_tracks, 2);
    assert_eq!(result.matched_tracks, 1);
    assert_eq!(result.synced_tracks, 1);
    assert_eq!(result.wishlist_added, 1);
    assert_eq!(result.failed_tracks, 1);

    let writes = h.stub.written_playlists();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].0, "Mix");
    assert_eq!(writes[0].1, vec!["a1b2c3d4e5f6a7b8c9d0e1f2a3b4c5d6".to_string()]);
}

#[tokio::test]
async fn resolver_falls_through_to_catalog_tier() {
    // Nothing on the server API, nothing on disk, but the catalog has it.
    let h = harness_with(StubMediaServer::new()).await;

    h.db.upsert_artist(&DbArtist {
        id: "ar-1".to_string(),
        name: "Artist".to_string(),
        thumb_url: None,
        genres: None,
        summary: None,
        server_source: ServerSource::Primary,
        created_at: None,
        updated_at: None,
    })
    .await
    .unwrap();
    h.db.upsert_album(&DbAlbum {
        id: "al-1".to_string(),
        artist_id: "ar-1".to_string(),
        title: "Album".to_string(),
        year: None,
        thumb_url: None,
        genres: None,
        track_count: None,
        duration_ms: None,
        server_source: ServerSource::Primary,
        created_at: None,
        updated_at: None,
    })
    .await
    .unwrap();
    h.db.upsert_track(&DbTrack {
        id: "b1b2c3d4e5f6a7b8c9d0e1f2a3b4c5d6".to_string(),
        album_id: "al-1".to_string(),
        artist_id: "ar-1".to_string(),
        title: "Love Song".to_string(),
        track_number: None,
        duration_ms: None,
        file_path: None,
        bitrate: None,
        server_source: ServerSource::Primary,
        created_at: None,
        updated_at: None,
    })
    .await
    .unwrap();

    // Slightly different spelling: only the fuzzy catalog tier can match.
    let p = playlist("Catalog Mix", vec![provider_track("t1", "Lovesong", "Artist")]);
    let result = h.service.sync_playlist(&p, false).await;

    assert_eq!(result.matched_tracks, 1, "catalog tier should resolve the track");
    assert_eq!(result.synced_tracks, 1);
    let writes = h.stub.written_playlists();
    assert_eq!(writes[0].1, vec!["b1b2c3d4e5f6a7b8c9d0e1f2a3b4c5d6".to_string()]);
}

#[tokio::test]
async fn filesystem_placeholder_suppresses_download_but_not_playlist() {
    let h = harness_with(StubMediaServer::new()).await;

    // A downloaded-but-unscanned file sitting in the transfer directory.
    let artist_dir = h.transfer_dir.path().join("Artist");
    std::fs::create_dir_all(&artist_dir).unwrap();
    std::fs::write(artist_dir.join("01 - Fresh Song.flac"), b"x").unwrap();

    let p = playlist("Fresh Mix", vec![provider_track("t1", "Fresh Song", "Artist")]);
    let result = h.service.sync_playlist(&p, false).await;

    // The file match counts as matched (no re-download, no wishlist entry)
    // but its placeholder id never reaches the playlist write.
    assert_eq!(result.matched_tracks, 1);
    assert_eq!(result.wishlist_added, 0);
    assert_eq!(result.synced_tracks, 0);
    let writes = h.stub.written_playlists();
    assert!(writes.is_empty(), "placeholder ids must not be written: {writes:?}");
}

#[tokio::test]
async fn wishlist_entries_carry_playlist_source_context() {
    let h = harness_with(StubMediaServer::new()).await;

    let result = h
        .service
        .sync_playlist(
            &playlist("Context Mix", vec![provider_track("t9", "Nowhere Song", "Nobody")]),
            false,
        )
        .await;
    assert_eq!(result.wishlist_added, 1);

    let entries = h.db.get_wishlist_tracks(None).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].external_track_id, "t9");
    assert_eq!(
        entries[0].source_info.get("playlist_name").and_then(|v| v.as_str()),
        Some("Context Mix")
    );
    assert_eq!(
        entries[0].source_info.get("sync_type").and_then(|v| v.as_str()),
        Some("automatic_sync")
    );
}

#[tokio::test]
async fn progress_reaches_all_checkpoints() {
    let stub = StubMediaServer::new();
    stub.add_metadata_hit("Song One", "Artist", "a1b2c3d4e5f6a7b8c9d0e1f2a3b4c5d6");
    let h = harness_with(stub).await;

    let seen: Arc<Mutex<Vec<SyncProgress>>> = Arc::new(Mutex::new(Vec::new()));
    {
        let seen = seen.clone();
        h.service.set_progress_callback(
            "Progress Mix",
            Arc::new(move |progress| seen.lock().unwrap().push(progress)),
        );
    }

    let p = playlist("Progress Mix", vec![provider_track("t1", "Song One", "Artist")]);
    h.service.sync_playlist(&p, false).await;

    let seen = seen.lock().unwrap();
    assert!(!seen.is_empty());
    assert!((seen.first().unwrap().progress - 10.0).abs() < f32::EPSILON);
    assert!((seen.last().unwrap().progress - 100.0).abs() < f32::EPSILON);
    // Per-track updates land in the 20-60 band.
    assert!(seen.iter().any(|p| p.progress > 20.0 && p.progress <= 60.0));
    assert!(seen.iter().all(|p| p.total_steps == 5));
}

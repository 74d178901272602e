use std::path::{Path, PathBuf};

use crate::models::ServerSource;

/// Marker file present inside container filesystems. When it exists,
/// `localhost` daemon URLs and Windows drive paths are rewritten to the
/// container's view of the host.
const CONTAINER_MARKER: &str = "/.dockerenv";

/// Settings for one media-server backend.
#[derive(Clone, Debug, Default)]
pub struct BackendSettings {
    pub base_url: String,
    pub api_key: String,
}

/// Settings for the peer-to-peer transfer daemon.
#[derive(Clone, Debug)]
pub struct SoulseekSettings {
    pub base_url: String,
    pub api_key: String,
    /// Daemon-side search deadline, seconds.
    pub search_timeout_secs: u64,
    /// Extra polling window beyond the daemon deadline, seconds.
    pub search_timeout_buffer_secs: u64,
    /// Root the daemon moves finished files into; the filesystem tier of the
    /// track resolver walks this directory.
    pub transfer_path: PathBuf,
    /// Path sent along with download requests.
    pub download_path: PathBuf,
}

impl Default for SoulseekSettings {
    fn default() -> Self {
        SoulseekSettings {
            base_url: String::new(),
            api_key: String::new(),
            search_timeout_secs: 60,
            search_timeout_buffer_secs: 15,
            transfer_path: PathBuf::from("./Transfer"),
            download_path: PathBuf::from("./downloads"),
        }
    }
}

/// Settings for playlist mirroring.
#[derive(Clone, Debug)]
pub struct PlaylistSyncSettings {
    /// Keep a transient `<name> Backup` playlist while rewriting.
    pub create_backup: bool,
}

impl Default for PlaylistSyncSettings {
    fn default() -> Self {
        PlaylistSyncSettings {
            create_backup: true,
        }
    }
}

/// Application configuration, loaded from the environment.
///
/// In dev mode a `.env` file is read first; every value can also come from
/// real environment variables. `DATABASE_PATH` overrides the default catalog
/// file location.
#[derive(Clone, Debug)]
pub struct Config {
    pub database_path: PathBuf,
    pub active_server: ServerSource,
    pub primary: BackendSettings,
    pub secondary: BackendSettings,
    pub soulseek: SoulseekSettings,
    pub playlist_sync: PlaylistSyncSettings,
}

impl Config {
    /// Load configuration from `.env` + environment variables.
    pub fn load() -> Self {
        if dotenvy::dotenv().is_ok() {
            tracing::info!("Config: loaded .env file");
        }
        Self::from_env()
    }

    fn from_env() -> Self {
        let database_path = std::env::var("DATABASE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| Self::default_database_path());

        let active_server = std::env::var("CADENCE_ACTIVE_SERVER")
            .map(|s| ServerSource::parse(&s))
            .unwrap_or(ServerSource::Primary);

        let primary = BackendSettings {
            base_url: env_or_default("CADENCE_PRIMARY_URL", ""),
            api_key: env_or_default("CADENCE_PRIMARY_API_KEY", ""),
        };
        let secondary = BackendSettings {
            base_url: env_or_default("CADENCE_SECONDARY_URL", ""),
            api_key: env_or_default("CADENCE_SECONDARY_API_KEY", ""),
        };

        let defaults = SoulseekSettings::default();
        let soulseek = SoulseekSettings {
            base_url: rewrite_container_url(&env_or_default("CADENCE_SLSKD_URL", "")),
            api_key: env_or_default("CADENCE_SLSKD_API_KEY", ""),
            search_timeout_secs: env_parse("CADENCE_SEARCH_TIMEOUT", defaults.search_timeout_secs),
            search_timeout_buffer_secs: env_parse(
                "CADENCE_SEARCH_TIMEOUT_BUFFER",
                defaults.search_timeout_buffer_secs,
            ),
            transfer_path: PathBuf::from(rewrite_container_path(&env_or_default(
                "CADENCE_TRANSFER_PATH",
                "./Transfer",
            ))),
            download_path: PathBuf::from(rewrite_container_path(&env_or_default(
                "CADENCE_DOWNLOAD_PATH",
                "./downloads",
            ))),
        };

        let playlist_sync = PlaylistSyncSettings {
            create_backup: env_parse("CADENCE_PLAYLIST_BACKUP", true),
        };

        Config {
            database_path,
            active_server,
            primary,
            secondary,
            soulseek,
            playlist_sync,
        }
    }

    fn default_database_path() -> PathBuf {
        let base = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        base.join(".cadence").join("music_library.db")
    }

    /// Backend settings for the currently active server.
    pub fn active_backend(&self) -> &BackendSettings {
        match self.active_server {
            ServerSource::Primary => &self.primary,
            ServerSource::Secondary => &self.secondary,
        }
    }
}

fn env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn in_container() -> bool {
    Path::new(CONTAINER_MARKER).exists()
}

/// Rewrite `localhost` daemon URLs to the container host alias when running
/// inside a container, where `localhost` is the container itself.
pub fn rewrite_container_url(url: &str) -> String {
    rewrite_url(url, in_container())
}

fn rewrite_url(url: &str, containerized: bool) -> String {
    if containerized && url.contains("localhost") {
        let rewritten = url.replace("localhost", "host.docker.internal");
        tracing::info!("Container detected, using {} for daemon connection", rewritten);
        rewritten
    } else {
        url.to_string()
    }
}

/// Rewrite a Windows drive path (`E:/music`) to the container's host mount
/// (`/host/mnt/e/music`) when running inside a container.
pub fn rewrite_container_path(path: &str) -> String {
    rewrite_path(path, in_container())
}

fn rewrite_path(path: &str, containerized: bool) -> String {
    let bytes = path.as_bytes();
    if containerized
        && bytes.len() >= 3
        && bytes[1] == b':'
        && bytes[0].is_ascii_alphabetic()
    {
        let drive = (bytes[0] as char).to_ascii_lowercase();
        let rest = path[2..].replace('\\', "/");
        let rewritten = format!("/host/mnt/{}{}", drive, rest);
        tracing::info!("Container detected, using {} for transfers", rewritten);
        rewritten
    } else {
        path.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_rewrite_only_inside_container() {
        assert_eq!(
            rewrite_url("http://localhost:5030", true),
            "http://host.docker.internal:5030"
        );
        assert_eq!(rewrite_url("http://localhost:5030", false), "http://localhost:5030");
        assert_eq!(rewrite_url("http://slskd:5030", true), "http://slskd:5030");
    }

    #[test]
    fn windows_drive_path_rewrite() {
        assert_eq!(rewrite_path("E:/music/transfer", true), "/host/mnt/e/music/transfer");
        assert_eq!(rewrite_path("E:\\music\\transfer", true), "/host/mnt/e/music/transfer");
        assert_eq!(rewrite_path("/srv/transfer", true), "/srv/transfer");
        assert_eq!(rewrite_path("E:/music", false), "E:/music");
    }
}

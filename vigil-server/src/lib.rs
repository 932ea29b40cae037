pub mod auth;
pub mod config;
pub mod error;
pub mod moderation;
pub mod repository;
pub mod routes;

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use crate::config::{Config, StorageBackend};
use crate::moderation::ModerationService;
use crate::repository::{InMemoryRepository, ModerationRepository, SqliteRepository};

pub use error::ModerationError;

mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub fn get_service_version() -> String {
    // First check for git hash from Nix build environment
    if let Some(git_hash) = option_env!("VIGIL_GIT_HASH") {
        short_hash(git_hash)
    } else if let Some(git_hash) = built_info::GIT_COMMIT_HASH {
        // Fall back to built crate's git detection (for cargo builds)
        short_hash(git_hash)
    } else {
        built_info::PKG_VERSION.to_string()
    }
}

fn short_hash(hash: &str) -> String {
    hash.chars().take(8).collect()
}

pub struct AppState {
    pub moderation: ModerationService,
    pub session_secret: String,
}

impl AppState {
    /// Open the configured backend and wire up the moderation service.
    pub fn from_config(config: &Config) -> Result<Self> {
        let repository: Arc<dyn ModerationRepository> = match config.storage_backend {
            StorageBackend::Sqlite => {
                let db_path = config.database_path();
                info!("Using state database: {}", db_path.display());
                Arc::new(
                    SqliteRepository::new(&db_path)
                        .context("Failed to initialize SQLite database")?,
                )
            }
            StorageBackend::Memory => {
                info!("Using in-memory storage; state will not survive a restart");
                Arc::new(InMemoryRepository::new())
            }
        };

        Ok(Self {
            moderation: ModerationService::new(
                repository,
                config.vote_threshold,
                config.terminal_vote_policy,
            ),
            session_secret: config.session_secret.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_hash_truncates() {
        assert_eq!(short_hash("0123456789abcdef"), "01234567");
        assert_eq!(short_hash("abc"), "abc");
    }

    #[test]
    fn test_from_config_memory_backend() {
        let config = Config::from_lookup(|key| match key {
            "SESSION_JWT_SECRET" => Some("s".to_string()),
            "STORAGE_BACKEND" => Some("memory".to_string()),
            "VOTE_THRESHOLD" => Some("4".to_string()),
            _ => None,
        })
        .unwrap();

        let state = AppState::from_config(&config).unwrap();
        assert_eq!(state.moderation.threshold().get(), 4);
        assert_eq!(state.session_secret, "s");
    }

    #[test]
    fn test_from_config_sqlite_backend_creates_database() {
        let temp_dir = tempfile::tempdir().unwrap();
        let state_dir = temp_dir.path().join("state");
        let config = Config::from_lookup(|key| match key {
            "SESSION_JWT_SECRET" => Some("s".to_string()),
            "STATE_DIR" => Some(state_dir.to_string_lossy().into_owned()),
            _ => None,
        })
        .unwrap();

        AppState::from_config(&config).unwrap();
        assert!(config.database_path().exists());
    }
}

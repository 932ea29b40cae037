use anyhow::{bail, Context, Result};
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use vigil_core::Threshold;

use crate::moderation::TerminalVotePolicy;

/// File name of the SQLite database inside `state_dir`.
pub const DATABASE_FILE: &str = "vigil-state.db";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StorageBackend {
    #[default]
    Sqlite,
    /// Ephemeral; everything is lost on restart.
    Memory,
}

impl FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "memory" => Ok(Self::Memory),
            other => bail!("unknown storage backend '{}' (expected sqlite or memory)", other),
        }
    }
}

impl fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Sqlite => "sqlite",
            Self::Memory => "memory",
        })
    }
}

#[derive(Clone)]
pub struct Config {
    pub port: u16,
    /// Directory for persistent state (SQLite database).
    /// Defaults to current working directory.
    pub state_dir: PathBuf,
    /// HS256 secret used to verify session tokens.
    pub session_secret: String,
    /// Net score needed to publish (or, negated, to archive).
    pub vote_threshold: Threshold,
    pub terminal_vote_policy: TerminalVotePolicy,
    pub storage_backend: StorageBackend,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("port", &self.port)
            .field("state_dir", &self.state_dir)
            .field("session_secret", &"<redacted>")
            .field("vote_threshold", &self.vote_threshold)
            .field("terminal_vote_policy", &self.terminal_vote_policy)
            .field("storage_backend", &self.storage_backend)
            .finish()
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from any key lookup; `from_env` passes the process
    /// environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let port = lookup("PORT")
            .unwrap_or_else(|| "3000".to_string())
            .parse::<u16>()
            .context("PORT must be a valid number")?;

        let state_dir = lookup("STATE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));

        let session_secret = parse_session_secret(lookup("SESSION_JWT_SECRET"))
            .context("SESSION_JWT_SECRET environment variable is required")?;

        let vote_threshold = match lookup("VOTE_THRESHOLD") {
            Some(raw) => {
                let value = raw
                    .trim()
                    .parse::<u32>()
                    .context("VOTE_THRESHOLD must be a valid number")?;
                Threshold::new(value).context("VOTE_THRESHOLD must be at least 1")?
            }
            None => Threshold::default(),
        };

        let terminal_vote_policy = lookup("TERMINAL_VOTE_POLICY")
            .map(|raw| raw.parse::<TerminalVotePolicy>())
            .transpose()
            .context("TERMINAL_VOTE_POLICY is invalid")?
            .unwrap_or_default();

        let storage_backend = lookup("STORAGE_BACKEND")
            .map(|raw| raw.parse::<StorageBackend>())
            .transpose()
            .context("STORAGE_BACKEND is invalid")?
            .unwrap_or_default();

        Ok(Config {
            port,
            state_dir,
            session_secret,
            vote_threshold,
            terminal_vote_policy,
            storage_backend,
        })
    }

    pub fn database_path(&self) -> PathBuf {
        self.state_dir.join(DATABASE_FILE)
    }
}

/// Parse SESSION_JWT_SECRET from an optional string value.
///
/// Returns None if the value is missing, empty, or contains only whitespace,
/// so an empty secret can never sign or verify sessions.
pub fn parse_session_secret(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[("SESSION_JWT_SECRET", "s3cret")]).unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.state_dir, PathBuf::from("."));
        assert_eq!(config.vote_threshold.get(), 3);
        assert_eq!(config.terminal_vote_policy, TerminalVotePolicy::Record);
        assert_eq!(config.storage_backend, StorageBackend::Sqlite);
        assert_eq!(config.database_path(), PathBuf::from("./vigil-state.db"));
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("SESSION_JWT_SECRET", "s3cret"),
            ("PORT", "8080"),
            ("STATE_DIR", "/var/lib/vigil"),
            ("VOTE_THRESHOLD", "5"),
            ("TERMINAL_VOTE_POLICY", "reject"),
            ("STORAGE_BACKEND", "memory"),
        ])
        .unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(
            config.database_path(),
            PathBuf::from("/var/lib/vigil/vigil-state.db")
        );
        assert_eq!(config.vote_threshold.get(), 5);
        assert_eq!(config.terminal_vote_policy, TerminalVotePolicy::Reject);
        assert_eq!(config.storage_backend, StorageBackend::Memory);
    }

    #[test]
    fn test_secret_required() {
        assert!(config_from(&[]).is_err());
        assert!(config_from(&[("SESSION_JWT_SECRET", "   ")]).is_err());
    }

    #[test]
    fn test_zero_threshold_rejected() {
        let err = config_from(&[("SESSION_JWT_SECRET", "s"), ("VOTE_THRESHOLD", "0")])
            .unwrap_err();
        assert!(format!("{:#}", err).contains("VOTE_THRESHOLD"));
    }

    #[test]
    fn test_invalid_values_rejected() {
        for (key, value) in [
            ("PORT", "not-a-port"),
            ("VOTE_THRESHOLD", "-2"),
            ("TERMINAL_VOTE_POLICY", "ignore"),
            ("STORAGE_BACKEND", "postgres"),
        ] {
            let result = config_from(&[("SESSION_JWT_SECRET", "s"), (key, value)]);
            assert!(result.is_err(), "{}={} should be rejected", key, value);
        }
    }

    #[test]
    fn test_debug_redacts_secret() {
        let config = config_from(&[("SESSION_JWT_SECRET", "hunter2")]).unwrap();
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn test_parse_session_secret_whitespace_only() {
        assert_eq!(parse_session_secret(None), None);
        assert_eq!(parse_session_secret(Some("".to_string())), None);
        assert_eq!(parse_session_secret(Some("\t\n".to_string())), None);
        assert_eq!(
            parse_session_secret(Some("  token  ".to_string())),
            Some("  token  ".to_string())
        );
    }
}

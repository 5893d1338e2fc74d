//! Configuration for the tracker daemon.
//!
//! This module handles parsing configuration from environment variables.
//!
//! # Environment Variables
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `POCKETWATCH_STATE_DIR` | No | `~/.pocketwatch` | Directory for durable state (settings, token, registrations) |
//! | `POCKETWATCH_FIX_PATH` | No | `<state dir>/position.json` | Fix file written by the position producer |
//! | `POCKETWATCH_SERVER_URL` | No | - | Seeds the `url` setting when set |
//! | `POCKETWATCH_TOKEN` | No | - | Bearer token for foreground commands |

use std::env;
use std::path::PathBuf;

use directories::BaseDirs;
use thiserror::Error;

/// Default state directory name relative to home.
const DEFAULT_STATE_DIR: &str = ".pocketwatch";

/// File name of the settings store inside the state directory.
const SETTINGS_FILE: &str = "settings.json";

/// Default fix file name inside the state directory.
const DEFAULT_FIX_FILE: &str = "position.json";

/// Errors that can occur during configuration parsing.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to determine home directory.
    #[error("failed to determine home directory")]
    NoHomeDirectory,
}

/// Configuration for the tracker daemon.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding settings, the mirrored token, and the registration
    /// table.
    pub state_dir: PathBuf,

    /// Path the position producer writes fixes to.
    pub fix_path: PathBuf,

    /// Server base URL override, seeded into the settings store when set.
    pub server_url: Option<String>,
}

impl Config {
    /// Creates a new `Config` by parsing environment variables.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the home directory cannot be determined
    /// (needed for the default state directory).
    pub fn from_env() -> Result<Self, ConfigError> {
        let state_dir = match env::var("POCKETWATCH_STATE_DIR") {
            Ok(path) => PathBuf::from(path),
            Err(_) => BaseDirs::new()
                .ok_or(ConfigError::NoHomeDirectory)?
                .home_dir()
                .join(DEFAULT_STATE_DIR),
        };

        let fix_path = env::var("POCKETWATCH_FIX_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| state_dir.join(DEFAULT_FIX_FILE));

        let server_url = env::var("POCKETWATCH_SERVER_URL")
            .ok()
            .filter(|url| !url.is_empty());

        Ok(Self {
            state_dir,
            fix_path,
            server_url,
        })
    }

    /// Path of the settings store file.
    #[must_use]
    pub fn settings_path(&self) -> PathBuf {
        self.state_dir.join(SETTINGS_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    /// Helper to run tests with isolated environment variables.
    /// Clears all POCKETWATCH_* vars before the test and restores them after.
    fn with_clean_env<F, R>(f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let saved_vars: Vec<(String, String)> = env::vars()
            .filter(|(k, _)| k.starts_with("POCKETWATCH_"))
            .collect();

        for (key, _) in &saved_vars {
            env::remove_var(key);
        }

        let result = f();

        for (key, value) in saved_vars {
            env::set_var(key, value);
        }

        result
    }

    #[test]
    #[serial]
    fn minimal_config_uses_home_defaults() {
        with_clean_env(|| {
            let config = Config::from_env().expect("should parse minimal config");

            assert!(config.state_dir.ends_with(DEFAULT_STATE_DIR));
            assert_eq!(config.fix_path, config.state_dir.join(DEFAULT_FIX_FILE));
            assert!(config.server_url.is_none());
            assert_eq!(config.settings_path(), config.state_dir.join(SETTINGS_FILE));
        });
    }

    #[test]
    #[serial]
    fn explicit_paths_override_defaults() {
        with_clean_env(|| {
            env::set_var("POCKETWATCH_STATE_DIR", "/var/lib/pocketwatch");
            env::set_var("POCKETWATCH_FIX_PATH", "/run/gps/fix.json");
            env::set_var("POCKETWATCH_SERVER_URL", "https://watch.example.com");

            let config = Config::from_env().expect("should parse full config");

            assert_eq!(config.state_dir, PathBuf::from("/var/lib/pocketwatch"));
            assert_eq!(config.fix_path, PathBuf::from("/run/gps/fix.json"));
            assert_eq!(
                config.server_url,
                Some("https://watch.example.com".to_string())
            );
        });
    }

    #[test]
    #[serial]
    fn empty_server_url_is_ignored() {
        with_clean_env(|| {
            env::set_var("POCKETWATCH_SERVER_URL", "");

            let config = Config::from_env().expect("should parse config");
            assert!(config.server_url.is_none());
        });
    }
}

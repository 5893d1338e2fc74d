//! Durable mirror of the session bearer token.
//!
//! Background task handlers run outside the foreground object graph and
//! cannot reach in-memory session state, so the token they attach to
//! outbound requests must come from durable storage both contexts can see.
//! The mirror is written whenever a tracking session starts (copied from the
//! session provider's current token) and cleared on sign-out; handlers only
//! ever read it.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// File name for the mirrored token inside the state directory.
const TOKEN_FILE: &str = "token";

/// Errors from credential mirror operations.
#[derive(Error, Debug)]
pub enum CredentialError {
    /// Token file could not be read or written.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Durable, background-readable copy of the current bearer token.
pub trait CredentialMirror: Send + Sync {
    /// Replaces the mirrored token.
    fn store(&self, token: &str) -> Result<(), CredentialError>;

    /// Returns the mirrored token, or `None` when signed out.
    fn load(&self) -> Result<Option<String>, CredentialError>;

    /// Removes the mirrored token.
    fn clear(&self) -> Result<(), CredentialError>;
}

/// Credential mirror backed by a single file in the state directory.
///
/// The token file is created with mode 0600 on Unix.
#[derive(Debug, Clone)]
pub struct FileCredentialMirror {
    path: PathBuf,
}

impl FileCredentialMirror {
    /// Creates a mirror storing the token under `state_dir`.
    #[must_use]
    pub fn new(state_dir: &Path) -> Self {
        Self {
            path: state_dir.join(TOKEN_FILE),
        }
    }
}

impl CredentialMirror for FileCredentialMirror {
    fn store(&self, token: &str) -> Result<(), CredentialError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = File::create(&self.path)?;
        file.write_all(token.as_bytes())?;

        // Owner read/write only.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = fs::metadata(&self.path)?.permissions();
            perms.set_mode(0o600);
            fs::set_permissions(&self.path, perms)?;
        }

        Ok(())
    }

    fn load(&self) -> Result<Option<String>, CredentialError> {
        match fs::read_to_string(&self.path) {
            Ok(token) => {
                let token = token.trim().to_string();
                if token.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(token))
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn clear(&self) -> Result<(), CredentialError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

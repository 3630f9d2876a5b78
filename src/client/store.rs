//! Token persistence for the API client
//!
//! [`MemoryTokenStore`] keeps the pair for the life of the process;
//! [`FileTokenStore`] writes it to a JSON file so a session survives
//! restarts.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::error::ClientError;

/// Access/refresh token pair as persisted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredTokens {
    pub access_token: String,
    pub refresh_token: String,
}

/// Where the client keeps its session
pub trait TokenStore: Send + Sync {
    fn access_token(&self) -> Option<String>;
    fn refresh_token(&self) -> Option<String>;
    fn set_tokens(&self, access_token: &str, refresh_token: &str) -> Result<(), ClientError>;
    fn clear(&self) -> Result<(), ClientError>;
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-process token store
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    tokens: Mutex<Option<StoredTokens>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with a token pair
    pub fn with_tokens(access_token: &str, refresh_token: &str) -> Self {
        Self {
            tokens: Mutex::new(Some(StoredTokens {
                access_token: access_token.to_string(),
                refresh_token: refresh_token.to_string(),
            })),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn access_token(&self) -> Option<String> {
        lock(&self.tokens).as_ref().map(|t| t.access_token.clone())
    }

    fn refresh_token(&self) -> Option<String> {
        lock(&self.tokens).as_ref().map(|t| t.refresh_token.clone())
    }

    fn set_tokens(&self, access_token: &str, refresh_token: &str) -> Result<(), ClientError> {
        *lock(&self.tokens) = Some(StoredTokens {
            access_token: access_token.to_string(),
            refresh_token: refresh_token.to_string(),
        });
        Ok(())
    }

    fn clear(&self) -> Result<(), ClientError> {
        *lock(&self.tokens) = None;
        Ok(())
    }
}

/// Token store backed by a JSON file.
///
/// The file is read once on open and rewritten on every change; a
/// missing or unreadable file means "not logged in".
#[derive(Debug)]
pub struct FileTokenStore {
    path: PathBuf,
    tokens: Mutex<Option<StoredTokens>>,
}

impl FileTokenStore {
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let tokens = match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(tokens) => Some(tokens),
                Err(e) => {
                    tracing::warn!("Ignoring malformed token file {:?}: {}", path, e);
                    None
                }
            },
            Err(_) => None,
        };
        Self {
            path,
            tokens: Mutex::new(tokens),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TokenStore for FileTokenStore {
    fn access_token(&self) -> Option<String> {
        lock(&self.tokens).as_ref().map(|t| t.access_token.clone())
    }

    fn refresh_token(&self) -> Option<String> {
        lock(&self.tokens).as_ref().map(|t| t.refresh_token.clone())
    }

    fn set_tokens(&self, access_token: &str, refresh_token: &str) -> Result<(), ClientError> {
        let tokens = StoredTokens {
            access_token: access_token.to_string(),
            refresh_token: refresh_token.to_string(),
        };
        let mut guard = lock(&self.tokens);
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| ClientError::Store(e.to_string()))?;
        }
        std::fs::write(&self.path, serde_json::to_vec_pretty(&tokens)?)
            .map_err(|e| ClientError::Store(e.to_string()))?;
        *guard = Some(tokens);
        Ok(())
    }

    fn clear(&self) -> Result<(), ClientError> {
        let mut guard = lock(&self.tokens);
        *guard = None;
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ClientError::Store(e.to_string())),
        }
    }
}

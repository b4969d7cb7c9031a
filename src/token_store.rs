//! Durable Session Token persistence.
//!
//! SYSTEM CONTEXT
//! ==============
//! Only the gateway touches this store. It plays the role of browser local
//! storage: one opaque bearer token under a fixed key, scoped to an origin,
//! surviving process restarts. Writes are last-write-wins with no locking
//! across processes.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::GatewayError;

/// Key the token is stored under.
pub const AUTH_TOKEN_KEY: &str = "auth_token";

pub trait TokenStore: Send + Sync {
    /// Read the stored token, if any.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the backing medium cannot be read.
    fn load(&self) -> Result<Option<String>, GatewayError>;

    /// # Errors
    ///
    /// Returns `Storage` if the backing medium cannot be written.
    fn save(&self, token: &str) -> Result<(), GatewayError>;

    /// Remove the token. Removing an absent token is not an error.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the backing medium cannot be written.
    fn clear(&self) -> Result<(), GatewayError>;
}

// =============================================================================
// FILE STORE
// =============================================================================

/// JSON key/value file, one per origin.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store scoped to `origin` inside `dir`.
    #[must_use]
    pub fn for_origin(dir: impl AsRef<Path>, origin: &str) -> Self {
        Self::new(dir.as_ref().join(format!("{}.json", origin_file_stem(origin))))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_map(&self) -> Result<HashMap<String, String>, GatewayError> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) if raw.trim().is_empty() => Ok(HashMap::new()),
            Ok(raw) => serde_json::from_str(&raw).map_err(|e| GatewayError::Storage(e.to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(GatewayError::Storage(e.to_string())),
        }
    }

    fn write_map(&self, map: &HashMap<String, String>) -> Result<(), GatewayError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| GatewayError::Storage(e.to_string()))?;
        }
        let body = serde_json::to_string(map).map_err(|e| GatewayError::Storage(e.to_string()))?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, body).map_err(|e| GatewayError::Storage(e.to_string()))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| GatewayError::Storage(e.to_string()))
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> Result<Option<String>, GatewayError> {
        Ok(self.read_map()?.remove(AUTH_TOKEN_KEY))
    }

    fn save(&self, token: &str) -> Result<(), GatewayError> {
        let mut map = self.read_map()?;
        map.insert(AUTH_TOKEN_KEY.to_owned(), token.to_owned());
        self.write_map(&map)
    }

    fn clear(&self) -> Result<(), GatewayError> {
        let mut map = self.read_map()?;
        if map.remove(AUTH_TOKEN_KEY).is_none() {
            return Ok(());
        }
        self.write_map(&map)
    }
}

/// Turn an origin like `https://abc.supabase.co` into a safe file stem.
pub(crate) fn origin_file_stem(origin: &str) -> String {
    let trimmed = origin
        .trim()
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_end_matches('/');
    let stem: String = trimmed
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' { c } else { '_' })
        .collect();
    if stem.is_empty() { "default".to_owned() } else { stem }
}

// =============================================================================
// MEMORY STORE
// =============================================================================

#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    token: Mutex<Option<String>>,
}

impl MemoryTokenStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_token(token: impl Into<String>) -> Self {
        Self { token: Mutex::new(Some(token.into())) }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Option<String>>, GatewayError> {
        self.token
            .lock()
            .map_err(|_| GatewayError::Storage("token store lock poisoned".into()))
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Result<Option<String>, GatewayError> {
        Ok(self.lock()?.clone())
    }

    fn save(&self, token: &str) -> Result<(), GatewayError> {
        *self.lock()? = Some(token.to_owned());
        Ok(())
    }

    fn clear(&self) -> Result<(), GatewayError> {
        *self.lock()? = None;
        Ok(())
    }
}

#[cfg(test)]
#[path = "token_store_test.rs"]
mod tests;

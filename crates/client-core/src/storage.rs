//! Cached auth data
//!
//! The session keeps the identity it connected with under a single storage
//! key, so a client restarting on the same device comes back as the same
//! user. Storage backends only implement raw `get_item`/`set_item`;
//! encoding stays in the trait's provided methods.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{CallClientError, CallClientResult};

/// Storage key holding the serialized [`CachedCredentials`].
pub const AUTH_DATA_KEY: &str = "auth-data";

/// What survives between sessions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedCredentials {
    pub identity: String,
}

/// Key-value persistence for auth data.
pub trait AuthStorage: Send + Sync {
    fn get_item(&self, key: &str) -> CallClientResult<Option<String>>;
    fn set_item(&self, key: &str, value: &str) -> CallClientResult<()>;

    /// Read and decode the cached credentials, if any.
    fn load(&self) -> CallClientResult<Option<CachedCredentials>> {
        match self.get_item(AUTH_DATA_KEY)? {
            Some(raw) => serde_json::from_str(&raw).map(Some).map_err(|err| {
                CallClientError::storage(format!("cached auth data is corrupt: {err}"))
            }),
            None => Ok(None),
        }
    }

    /// Encode and persist the credentials.
    fn store(&self, credentials: &CachedCredentials) -> CallClientResult<()> {
        let raw = serde_json::to_string(credentials).map_err(|err| {
            CallClientError::storage(format!("encoding auth data failed: {err}"))
        })?;
        self.set_item(AUTH_DATA_KEY, &raw)
    }
}

/// In-process storage backend.
#[derive(Debug, Default)]
pub struct MemoryAuthStorage {
    items: RwLock<HashMap<String, String>>,
}

impl MemoryAuthStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AuthStorage for MemoryAuthStorage {
    fn get_item(&self, key: &str) -> CallClientResult<Option<String>> {
        Ok(self.items.read().get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> CallClientResult<()> {
        self.items.write().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

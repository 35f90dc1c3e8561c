//! Token storage and management

use serde::Deserialize;
use std::collections::HashMap;

/// Store key for the short-lived bearer credential.
pub const ACCESS_TOKEN_KEY: &str = "accessToken";
/// Store key for the credential exchanged for new access tokens.
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";

/// Token pair minted by the login and refresh endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Synchronous key-value contract the gateway reads and writes session tokens through.
///
/// Writes cannot fail from the caller's point of view; persistent backends log
/// and continue when the underlying medium rejects a write.
pub trait TokenStore {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: String);
    fn remove(&mut self, key: &str);

    fn access_token(&self) -> Option<String> {
        self.get(ACCESS_TOKEN_KEY)
    }

    fn refresh_token(&self) -> Option<String> {
        self.get(REFRESH_TOKEN_KEY)
    }

    /// Remove both session tokens.
    fn clear_tokens(&mut self) {
        self.remove(ACCESS_TOKEN_KEY);
        self.remove(REFRESH_TOKEN_KEY);
    }
}

/// Process-memory token store. Nothing survives a restart.
#[derive(Debug, Default, Clone)]
pub struct MemoryTokenStore {
    values: HashMap<String, String>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with an access/refresh pair.
    pub fn with_tokens(access: &str, refresh: &str) -> Self {
        let mut store = Self::new();
        store.set(ACCESS_TOKEN_KEY, access.to_string());
        store.set(REFRESH_TOKEN_KEY, refresh.to_string());
        store
    }
}

impl TokenStore for MemoryTokenStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: String) {
        self.values.insert(key.to_string(), value);
    }

    fn remove(&mut self, key: &str) {
        self.values.remove(key);
    }
}

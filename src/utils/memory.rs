use crate::core::traits::{IdentityStore, ResponseStore};
use crate::core::types::{MessageKind, Response};
use std::collections::HashMap;
use std::sync::RwLock;

/// In-process identity store
#[derive(Debug, Default)]
pub struct MemoryIdentityStore {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with a session token and the login id it belongs to
    pub fn with_session(token: impl Into<String>, loginid: impl Into<String>) -> Self {
        let store = Self::new();
        store.set(crate::core::traits::TOKEN_KEY, &token.into());
        store.set(crate::core::traits::LOGINID_KEY, &loginid.into());
        store
    }
}

impl IdentityStore for MemoryIdentityStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.values
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), value.to_string());
    }
}

/// In-process response store
#[derive(Debug, Default)]
pub struct MemoryResponseStore {
    responses: RwLock<HashMap<MessageKind, Response>>,
}

impl MemoryResponseStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.responses
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ResponseStore for MemoryResponseStore {
    fn get(&self, kind: &MessageKind) -> Option<Response> {
        self.responses
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(kind)
            .cloned()
    }

    fn set(&self, kind: &MessageKind, response: Response) {
        self.responses
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(kind.clone(), response);
    }
}

//! Authentication plus a hierarchical JSON document store.
//!
//! Paths address nodes in a single tree (`users/{id}/role`). Reading a node
//! returns its whole subtree; writing a node replaces its whole subtree.
//! Empty objects and nulls do not exist as nodes.

mod keys;
pub mod local;
pub mod rest;

use crate::error::{AppError, Result};
use async_trait::async_trait;
use std::fmt;

pub use keys::PushKeyGenerator;

/// Credentials accepted by the store's auth service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSession {
    pub uid: String,
    pub email: String,
    /// Bearer token for the remote backend; the local backend has none.
    pub id_token: Option<String>,
}

#[async_trait]
pub trait Store: Send + Sync {
    fn backend_name(&self) -> &'static str;

    async fn sign_up(&self, email: &str, password: &str) -> Result<AuthSession>;
    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession>;
    fn sign_out(&self);
    /// Remove an account created by `sign_up`, using the credentials it
    /// returned.
    async fn delete_account(&self, account: &AuthSession) -> Result<()>;

    async fn get(&self, path: &StorePath) -> Result<Option<serde_json::Value>>;
    async fn set(&self, path: &StorePath, value: &serde_json::Value) -> Result<()>;
    async fn remove(&self, path: &StorePath) -> Result<()>;

    /// A fresh child key, generated client-side without touching the store.
    fn push_key(&self) -> String;
}

/// A validated, `/`-separated store path. The empty path is the root.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorePath {
    segments: Vec<String>,
}

const FORBIDDEN_KEY_CHARS: &[char] = &['.', '#', '$', '[', ']', '/'];

impl StorePath {
    pub fn root() -> Self {
        Self {
            segments: Vec::new(),
        }
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let mut p = Self::root();
        for seg in raw.split('/').filter(|s| !s.is_empty()) {
            p = p.child(seg)?;
        }
        Ok(p)
    }

    pub fn child(&self, key: &str) -> Result<Self> {
        validate_key(key)?;
        let mut segments = self.segments.clone();
        segments.push(key.to_string());
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Every proper ancestor, nearest last, root excluded.
    pub fn ancestors(&self) -> impl Iterator<Item = StorePath> + '_ {
        (1..self.segments.len()).map(move |n| StorePath {
            segments: self.segments[..n].to_vec(),
        })
    }

    pub fn users() -> Self {
        Self {
            segments: vec!["users".to_string()],
        }
    }

    pub fn groups() -> Self {
        Self {
            segments: vec!["groups".to_string()],
        }
    }
}

impl fmt::Display for StorePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("/"))
    }
}

pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(AppError::Validation("key must not be empty".into()));
    }
    if key.contains(FORBIDDEN_KEY_CHARS) || key.chars().any(|c| c.is_control()) {
        return Err(AppError::Validation(format!(
            "key contains forbidden characters: {}",
            key
        )));
    }
    Ok(())
}

/// Drop nulls and empty objects the way the store does, so a value read
/// back compares equal to the value written.
pub fn normalize(value: &serde_json::Value) -> Option<serde_json::Value> {
    use serde_json::Value;
    match value {
        Value::Null => None,
        Value::Object(map) => {
            let out: serde_json::Map<String, Value> = map
                .iter()
                .filter_map(|(k, v)| normalize(v).map(|v| (k.clone(), v)))
                .collect();
            if out.is_empty() {
                None
            } else {
                Some(Value::Object(out))
            }
        }
        Value::Array(items) => {
            let out: serde_json::Map<String, Value> = items
                .iter()
                .enumerate()
                .filter_map(|(i, v)| normalize(v).map(|v| (i.to_string(), v)))
                .collect();
            if out.is_empty() {
                None
            } else {
                Some(Value::Object(out))
            }
        }
        other => Some(other.clone()),
    }
}

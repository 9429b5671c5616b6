//! Namespaced key/value secret lookup.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use tracing::debug;

/// Resolves `namespace/name[key]` to a value.
///
/// A missing secret or key yields `None`; the caller decides whether that
/// is fatal.
#[async_trait]
pub trait SecretLookup: Send + Sync {
    async fn lookup(&self, namespace: &str, name: &str, key: &str) -> Option<String>;
}

/// In-memory lookup, keyed by `(namespace, name, key)`.
#[derive(Debug, Default, Clone)]
pub struct MemorySecretLookup {
    entries: HashMap<(String, String, String), String>,
}

impl MemorySecretLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &mut self,
        namespace: impl Into<String>,
        name: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<String>,
    ) {
        self.entries
            .insert((namespace.into(), name.into(), key.into()), value.into());
    }

    pub fn with(
        mut self,
        namespace: impl Into<String>,
        name: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.insert(namespace, name, key, value);
        self
    }
}

#[async_trait]
impl SecretLookup for MemorySecretLookup {
    async fn lookup(&self, namespace: &str, name: &str, key: &str) -> Option<String> {
        self.entries
            .get(&(namespace.to_string(), name.to_string(), key.to_string()))
            .cloned()
    }
}

/// Directory-backed lookup: `<root>/<namespace>/<name>/<key>`.
///
/// Matches the layout of secrets projected into a container as files.
#[derive(Debug, Clone)]
pub struct DirSecretLookup {
    root: PathBuf,
}

impl DirSecretLookup {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl SecretLookup for DirSecretLookup {
    async fn lookup(&self, namespace: &str, name: &str, key: &str) -> Option<String> {
        // Path components come from config; refuse anything that escapes the root.
        if [namespace, name, key]
            .iter()
            .any(|part| part.is_empty() || part.contains('/') || *part == "..")
        {
            debug!(%namespace, %name, %key, "rejected secret reference");
            return None;
        }

        let path = self.root.join(namespace).join(name).join(key);
        match tokio::fs::read_to_string(&path).await {
            Ok(value) => Some(value),
            Err(e) => {
                debug!(path = %path.display(), error = %e, "secret not found");
                None
            }
        }
    }
}

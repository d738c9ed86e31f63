//! Enumeration source collaborators.
//!
//! A [`SourceProcessor`] turns one `(target, source)` pair into a list of
//! discovered host names. It is called once per pair and may fail; the
//! worker records the failure and moves on to the next pair.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Request failed: {0}")]
    Request(String),

    #[error("Source returned HTTP {0}")]
    HttpStatus(u16),

    #[error("Unexpected response: {0}")]
    Decode(String),
}

#[async_trait]
pub trait SourceProcessor: Send + Sync {
    /// Source name as used in job requests (e.g. `crt.sh`).
    fn name(&self) -> &str;

    /// Look up subdomains of `target`. `api_key` is the credential the
    /// [`CredentialProvider`] returned for this source, if any.
    async fn process(&self, target: &str, api_key: Option<&str>)
        -> Result<Vec<String>, SourceError>;
}

/// Source name to processor lookup.
#[derive(Default, Clone)]
pub struct ProcessorRegistry {
    processors: HashMap<String, Arc<dyn SourceProcessor>>,
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, processor: Arc<dyn SourceProcessor>) -> Self {
        self.processors
            .insert(processor.name().to_string(), processor);
        self
    }

    pub fn get(&self, source: &str) -> Option<&Arc<dyn SourceProcessor>> {
        self.processors.get(source)
    }

    /// Registered source names, sorted.
    pub fn sources(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.processors.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Per-source API key lookup.
pub trait CredentialProvider: Send + Sync {
    fn api_key(&self, source: &str) -> Option<String>;
}

/// Fixed source-to-key map, typically built from configuration.
#[derive(Debug, Default, Clone)]
pub struct StaticCredentials {
    keys: HashMap<String, String>,
}

impl StaticCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a key for `source`. Empty keys are ignored.
    pub fn with_key(mut self, source: impl Into<String>, key: Option<String>) -> Self {
        if let Some(key) = key.filter(|k| !k.trim().is_empty()) {
            self.keys.insert(source.into(), key);
        }
        self
    }
}

impl CredentialProvider for StaticCredentials {
    fn api_key(&self, source: &str) -> Option<String> {
        self.keys.get(source).cloned()
    }
}

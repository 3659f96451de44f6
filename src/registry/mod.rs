//! Thread-safe registry of named sources.
//!
//! Reads take a shared lock. Every mutation holds the exclusive lock across
//! both the in-memory change and the full rewrite of the store, and rolls the
//! in-memory change back if the rewrite fails.

pub mod store;

use crate::error::RegistryError;
use crate::models::{ParamValue, SourceConfig};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use store::SourceMap;
use tracing::{info, warn};
use url::Url;

/// Named source configurations, mirrored to an optional JSON store.
#[derive(Debug)]
pub struct SourceRegistry {
    /// Store file; `None` keeps the registry in memory only.
    path: Option<PathBuf>,
    sources: RwLock<SourceMap>,
}

impl SourceRegistry {
    /// Load the registry from `path`. A missing file gives an empty registry.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, RegistryError> {
        let path = path.into();
        let sources = store::read_store(&path)?;
        info!("Loaded {} sources from {}", sources.len(), path.display());

        Ok(Self {
            path: Some(path),
            sources: RwLock::new(sources),
        })
    }

    /// Load the registry, falling back to an empty one if the store is unusable.
    ///
    /// The fallback stays bound to `path`, so the next mutation overwrites
    /// the broken store.
    pub fn load_or_empty(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        match Self::open(&path) {
            Ok(registry) => registry,
            Err(e) => {
                warn!("{}; starting with an empty registry", e);
                Self {
                    path: Some(path),
                    sources: RwLock::new(SourceMap::new()),
                }
            }
        }
    }

    /// A registry that is never persisted.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            sources: RwLock::new(SourceMap::new()),
        }
    }

    #[cfg(test)]
    pub fn path(&self) -> Option<&std::path::Path> {
        self.path.as_deref()
    }

    /// Insert a new source and persist.
    pub fn add(&self, name: &str, config: SourceConfig) -> Result<(), RegistryError> {
        if name.is_empty() {
            return Err(RegistryError::InvalidSource("name must not be empty".to_string()));
        }

        let mut sources = self.write();
        if sources.contains_key(name) {
            return Err(RegistryError::DuplicateSource(name.to_string()));
        }

        sources.insert(name.to_string(), config);
        if let Err(e) = self.persist(&sources) {
            sources.remove(name);
            return Err(e);
        }

        info!("Added source '{}'", name);
        Ok(())
    }

    /// Register a source from a raw URL.
    ///
    /// The name is trimmed and spaces become `-`. The URL's query string is
    /// split into static parameters. Returns the stored name.
    pub fn add_source(&self, name: &str, raw_url: &str) -> Result<String, RegistryError> {
        let name = normalize_name(name);
        let config = parse_source_url(raw_url)?;
        self.add(&name, config)?;
        Ok(name)
    }

    /// Remove a source and persist. An absent name is `NotFound` and writes nothing.
    pub fn delete(&self, name: &str) -> Result<(), RegistryError> {
        let mut sources = self.write();
        let removed = sources
            .remove(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;

        if let Err(e) = self.persist(&sources) {
            sources.insert(name.to_string(), removed);
            return Err(e);
        }

        info!("Deleted source '{}'", name);
        Ok(())
    }

    /// Replace a source's parameter remapping. An empty map clears it.
    pub fn set_remap(
        &self,
        name: &str,
        remap: BTreeMap<String, String>,
    ) -> Result<(), RegistryError> {
        let mut sources = self.write();
        let config = sources
            .get_mut(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;

        let new_remap = if remap.is_empty() { None } else { Some(remap) };
        let previous = std::mem::replace(&mut config.request_params, new_remap);

        if let Err(e) = self.persist(&sources) {
            if let Some(config) = sources.get_mut(name) {
                config.request_params = previous;
            }
            return Err(e);
        }

        info!("Updated parameter remapping of '{}'", name);
        Ok(())
    }

    /// Names of all sources, in no particular order.
    pub fn list(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    pub fn get(&self, name: &str) -> Result<SourceConfig, RegistryError> {
        self.read()
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    /// Copy of every `(name, config)` pair, taken under one read lock.
    pub fn snapshot(&self) -> Vec<(String, SourceConfig)> {
        self.read()
            .iter()
            .map(|(name, config)| (name.clone(), config.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn persist(&self, sources: &SourceMap) -> Result<(), RegistryError> {
        match &self.path {
            Some(path) => store::write_store(path, sources),
            None => Ok(()),
        }
    }

    // A panic while holding the lock cannot leave the map half-written:
    // every mutation is a single insert/remove/replace.
    fn read(&self) -> RwLockReadGuard<'_, SourceMap> {
        self.sources.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, SourceMap> {
        self.sources.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Trim a source name and replace inner spaces with `-`.
pub fn normalize_name(name: &str) -> String {
    name.trim().replace(' ', "-")
}

/// Build a source config from an absolute http/https URL.
///
/// Keys seen once become scalar parameters, repeated keys become lists.
pub fn parse_source_url(raw_url: &str) -> Result<SourceConfig, RegistryError> {
    let raw_url = raw_url.trim();
    if raw_url.is_empty() {
        return Err(RegistryError::InvalidSource("URL must not be empty".to_string()));
    }

    let mut parsed = Url::parse(raw_url)
        .map_err(|e| RegistryError::InvalidSource(format!("invalid URL '{}': {}", raw_url, e)))?;

    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(RegistryError::InvalidSource(
            "URL must start with http:// or https://".to_string(),
        ));
    }
    if parsed.host_str().is_none() {
        return Err(RegistryError::InvalidSource(format!("URL '{}' has no host", raw_url)));
    }

    let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (key, value) in parsed.query_pairs() {
        grouped
            .entry(key.into_owned())
            .or_default()
            .push(value.into_owned());
    }

    let querystring: BTreeMap<String, ParamValue> = grouped
        .into_iter()
        .map(|(key, mut values)| {
            let value = if values.len() > 1 {
                ParamValue::List(values)
            } else {
                ParamValue::Scalar(values.pop().unwrap_or_default())
            };
            (key, value)
        })
        .collect();

    parsed.set_query(None);
    parsed.set_fragment(None);

    Ok(SourceConfig {
        url: parsed.to_string(),
        querystring: if querystring.is_empty() {
            None
        } else {
            Some(querystring)
        },
        request_params: None,
    })
}

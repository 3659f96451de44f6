//! JSON store backing the source registry.
//!
//! The store is a single file mapping source name to
//! `{url, querystring, request_params}`. It is read in full at startup and
//! rewritten in full on every mutation.

use crate::error::RegistryError;
use crate::models::SourceConfig;
use std::collections::BTreeMap;
use std::io::{ErrorKind, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::debug;

/// Sources keyed by name.
pub type SourceMap = BTreeMap<String, SourceConfig>;

/// Read the store at `path`.
///
/// A missing file yields an empty map. Unreadable or malformed content is a
/// `ConfigLoad` error.
pub fn read_store(path: &Path) -> Result<SourceMap, RegistryError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!("No source store at {}, starting empty", path.display());
            return Ok(SourceMap::new());
        }
        Err(e) => return Err(RegistryError::config_load(path, e)),
    };

    // `null` is accepted as an empty store
    let sources: Option<SourceMap> =
        serde_json::from_str(&content).map_err(|e| RegistryError::config_load(path, e))?;

    Ok(sources.unwrap_or_default())
}

/// Rewrite the whole store at `path`.
///
/// The content goes to a temporary file in the same directory which is then
/// renamed over the target, so a crash mid-write leaves the old store intact.
pub fn write_store(path: &Path, sources: &SourceMap) -> Result<(), RegistryError> {
    let data = serde_json::to_vec_pretty(sources).map_err(|e| RegistryError::persist(path, e))?;

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| RegistryError::persist(path, e))?;
    tmp.write_all(&data)
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| RegistryError::persist(path, e))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tmp.as_file()
            .set_permissions(std::fs::Permissions::from_mode(0o644))
            .map_err(|e| RegistryError::persist(path, e))?;
    }

    tmp.persist(path)
        .map_err(|e| RegistryError::persist(path, e.error))?;

    debug!("Wrote {} sources to {}", sources.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ParamValue;

    #[test]
    fn test_missing_store_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let sources = read_store(&dir.path().join("config.json")).unwrap();
        assert!(sources.is_empty());
    }

    #[test]
    fn test_malformed_store_is_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = read_store(&path).unwrap_err();
        assert!(matches!(err, RegistryError::ConfigLoad { .. }));
    }

    #[test]
    fn test_null_store_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "null").unwrap();
        assert!(read_store(&path).unwrap().is_empty());
    }

    #[test]
    fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut sources = SourceMap::new();
        sources.insert(
            "alpha".to_string(),
            SourceConfig::new("https://alpha.example/api")
                .with_static_param("mode", ParamValue::List(vec!["a".into(), "b".into()])),
        );
        write_store(&path, &sources).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"querystring\""));
        assert!(raw.contains("\"request_params\""));

        assert_eq!(read_store(&path).unwrap(), sources);
    }

    #[test]
    fn test_write_into_missing_dir_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("config.json");

        let err = write_store(&path, &SourceMap::new()).unwrap_err();
        assert!(matches!(err, RegistryError::Persist { .. }));
    }
}

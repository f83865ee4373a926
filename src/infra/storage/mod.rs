pub mod hub;

pub use hub::HubStore;

use crate::core::backend::BackendKind;
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

/// A file a pretrained identifier can provide.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Artifact {
    Config,
    Weights(BackendKind),
}

impl Artifact {
    pub fn file_name(self) -> &'static str {
        match self {
            Artifact::Config => "config.json",
            Artifact::Weights(kind) => kind.weights_file(),
        }
    }
}

/// Turns an identifier into a local file, fetching and caching it when needed.
pub trait WeightStore: Send + Sync {
    fn resolve(&self, identifier: &str, artifact: Artifact) -> Result<PathBuf>;
}

/// Resolves identifiers that are local directories or files.
///
/// A directory must contain the conventionally-named file. A file path is returned
/// as-is for any artifact.
#[derive(Debug, Clone, Default)]
pub struct LocalStore {
    root: Option<PathBuf>,
}

impl LocalStore {
    pub fn new() -> Self {
        Self { root: None }
    }

    /// Also look up relative identifiers under `root`.
    pub fn with_root<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: Some(root.as_ref().to_path_buf()),
        }
    }

    pub fn locate(&self, identifier: &str) -> Option<PathBuf> {
        let direct = PathBuf::from(identifier);
        if direct.exists() {
            return Some(direct);
        }
        self.root
            .as_ref()
            .map(|root| root.join(identifier))
            .filter(|p| p.exists())
    }
}

impl WeightStore for LocalStore {
    fn resolve(&self, identifier: &str, artifact: Artifact) -> Result<PathBuf> {
        let not_found = || Error::ArtifactNotFound {
            identifier: identifier.to_string(),
            file: artifact.file_name().to_string(),
        };

        let path = self.locate(identifier).ok_or_else(not_found)?;
        if path.is_file() {
            return Ok(path);
        }

        let file = path.join(artifact.file_name());
        if file.is_file() {
            debug!(path = %file.display(), "resolved local artifact");
            Ok(file)
        } else {
            Err(not_found())
        }
    }
}

/// Persist a configuration document into `dir`, creating it if needed.
pub fn write_config(dir: &Path, document: &serde_json::Value) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(Artifact::Config.file_name());
    std::fs::write(&path, serde_json::to_string_pretty(document)?)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directory_lookup() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path();
        write_config(dir, &serde_json::json!({"model_type": "bert"})).unwrap();
        let store = LocalStore::new();
        let id = dir.to_string_lossy().to_string();

        assert_eq!(store.resolve(&id, Artifact::Config).unwrap(), dir.join("config.json"));
        let err = store.resolve(&id, Artifact::Weights(BackendKind::Candle)).unwrap_err();
        assert!(matches!(err, Error::ArtifactNotFound { .. }));
    }

    #[test]
    fn test_file_identifier_is_returned_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("checkpoint.safetensors");
        std::fs::write(&file, b"x").unwrap();
        let store = LocalStore::new();
        let resolved = store
            .resolve(&file.to_string_lossy(), Artifact::Weights(BackendKind::Reference))
            .unwrap();
        assert_eq!(resolved, file);
    }

    #[test]
    fn test_root_relative_lookup() {
        let root = tempfile::tempdir().unwrap();
        write_config(&root.path().join("tiny"), &serde_json::json!({})).unwrap();
        let store = LocalStore::with_root(root.path());
        assert!(store.resolve("tiny", Artifact::Config).is_ok());
        assert!(store.resolve("missing", Artifact::Config).is_err());
    }
}

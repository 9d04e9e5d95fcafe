//! Trained-artifact persistence.
//!
//! An artifact is written as a JSON [`ArtifactEnvelope`] at a caller-chosen
//! path. Next to it lives the cache sidecar `<path>.hash`, whose entire
//! content is the hex digest of the inputs that produced the artifact. A
//! missing sidecar reads as the empty string: it never matches a computed
//! digest, so the worst case after a crash between the two writes is a
//! needless refit.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use intentkit_core::ModelConfig;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::StoreError;

/// Envelope format written by this version.
pub const FORMAT_VERSION: u32 = 1;

/// A serialized trained model: its configuration plus model-specific state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactEnvelope {
    pub format_version: u32,
    pub model_type: String,
    /// RFC 3339 timestamp string.
    pub dumped_at: String,
    pub config: ModelConfig,
    pub state: Value,
}

impl ArtifactEnvelope {
    pub fn new(config: ModelConfig, state: Value) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            model_type: config.model_type.clone(),
            dumped_at: chrono::Utc::now().to_rfc3339(),
            config,
            state,
        }
    }
}

/// Write an artifact, creating the destination directory if needed.
pub fn dump_artifact(path: &Path, envelope: &ArtifactEnvelope) -> Result<(), StoreError> {
    if let Some(dir) = path.parent()
        && !dir.as_os_str().is_empty()
    {
        fs::create_dir_all(dir).map_err(|e| StoreError::io(dir, e))?;
    }

    let json = serde_json::to_vec_pretty(envelope).map_err(|e| StoreError::Corrupt {
        path: path.to_path_buf(),
        source: e,
    })?;
    fs::write(path, json).map_err(|e| StoreError::io(path, e))?;

    info!(path = %path.display(), model_type = %envelope.model_type, "dumped artifact");
    Ok(())
}

/// Read an artifact. Missing, unreadable, truncated and wrong-version files
/// are all errors.
pub fn load_artifact(path: &Path) -> Result<ArtifactEnvelope, StoreError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(StoreError::ArtifactNotFound(path.to_path_buf()));
        }
        Err(e) => return Err(StoreError::io(path, e)),
    };

    let envelope: ArtifactEnvelope =
        serde_json::from_slice(&bytes).map_err(|e| StoreError::Corrupt {
            path: path.to_path_buf(),
            source: e,
        })?;

    if envelope.format_version != FORMAT_VERSION {
        return Err(StoreError::UnsupportedVersion {
            path: path.to_path_buf(),
            found: envelope.format_version,
            expected: FORMAT_VERSION,
        });
    }

    info!(path = %path.display(), model_type = %envelope.model_type, "loaded artifact");
    Ok(envelope)
}

/// Sidecar path: the artifact path with `.hash` appended.
pub fn hash_path(path: &Path) -> PathBuf {
    let mut s = path.as_os_str().to_owned();
    s.push(".hash");
    PathBuf::from(s)
}

/// Write the cache digest sidecar for the artifact at `path`.
pub fn write_hash(path: &Path, digest: &str) -> Result<(), StoreError> {
    let sidecar = hash_path(path);
    fs::write(&sidecar, digest).map_err(|e| StoreError::io(&sidecar, e))?;
    debug!(path = %sidecar.display(), "wrote cache digest");
    Ok(())
}

/// Read the cache digest recorded for the artifact at `path`, or `""` when no
/// sidecar exists.
pub fn read_hash(path: &Path) -> Result<String, StoreError> {
    let sidecar = hash_path(path);
    match fs::read_to_string(&sidecar) {
        Ok(digest) => Ok(digest.trim_end().to_string()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(String::new()),
        Err(e) => Err(StoreError::io(&sidecar, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use intentkit_core::{ClassifierConfig, ConfigFields};
    use serde_json::json;
    use tempfile::TempDir;

    fn envelope() -> ArtifactEnvelope {
        let config = ClassifierConfig::new(
            ConfigFields::from_json(
                r#"{"model_type": "logreg", "features": {"bag-of-words": {}}, "params": {"C": 1.0}}"#,
            )
            .unwrap(),
        )
        .unwrap();
        ArtifactEnvelope::new(
            ModelConfig::from_classifier_config(&config, "query", "class"),
            json!({"weights": [[0.5, -0.5]]}),
        )
    }

    #[test]
    fn dump_creates_directories_and_loads_back() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("models/nested/domain.json");

        dump_artifact(&path, &envelope()).unwrap();
        assert!(path.exists());

        let loaded = load_artifact(&path).unwrap();
        assert_eq!(loaded.model_type, "logreg");
        assert_eq!(loaded.config.label_type, "class");
        assert_eq!(loaded.state, json!({"weights": [[0.5, -0.5]]}));
    }

    #[test]
    fn load_missing_artifact() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("absent.json");
        assert!(matches!(
            load_artifact(&path),
            Err(StoreError::ArtifactNotFound(p)) if p == path
        ));
    }

    #[test]
    fn load_truncated_artifact() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("model.json");
        dump_artifact(&path, &envelope()).unwrap();

        let bytes = fs::read(&path).unwrap();
        fs::write(&path, &bytes[..bytes.len() / 2]).unwrap();

        assert!(matches!(
            load_artifact(&path),
            Err(StoreError::Corrupt { path: p, .. }) if p == path
        ));
    }

    #[test]
    fn load_rejects_other_versions() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("model.json");
        let mut env = envelope();
        env.format_version = 99;
        dump_artifact(&path, &env).unwrap();

        assert!(matches!(
            load_artifact(&path),
            Err(StoreError::UnsupportedVersion { found: 99, .. })
        ));
    }

    #[test]
    fn hash_path_appends_suffix() {
        assert_eq!(
            hash_path(Path::new("/models/domain.json")),
            PathBuf::from("/models/domain.json.hash")
        );
    }

    #[test]
    fn sidecar_roundtrip_and_missing() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("model.json");

        assert_eq!(read_hash(&path).unwrap(), "");

        write_hash(&path, "abc123").unwrap();
        assert_eq!(fs::read_to_string(hash_path(&path)).unwrap(), "abc123");
        assert_eq!(read_hash(&path).unwrap(), "abc123");
    }

    #[test]
    fn sidecar_ignores_trailing_newline() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("model.json");
        fs::write(hash_path(&path), "abc123\n").unwrap();
        assert_eq!(read_hash(&path).unwrap(), "abc123");
    }
}

//! Sidecar manifest
//!
//! A loosely-typed JSON document stored next to the container so tooling
//! can inspect a model without parsing the binary. Nothing in the decode
//! path requires it; its `content_hash` feeds the validator when an
//! integrity check is requested.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::error::Result;
use crate::reader::Container;

/// Sidecar manifest contents
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    /// Model display name, when known
    pub model_name: Option<String>,
    /// Manifest creation time
    pub created_at: DateTime<Utc>,
    /// Number of tensors in the container
    pub tensor_count: usize,
    /// Scheme names present, sorted and deduplicated
    pub schemes: Vec<String>,
    /// `sha256:`-prefixed hash of the container's data region
    pub content_hash: String,
    /// Any further untyped metadata
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl Manifest {
    /// Build a manifest describing `container`.
    pub fn for_container(container: &Container, model_name: Option<String>) -> Self {
        let schemes: BTreeSet<String> = container
            .summary()
            .into_iter()
            .map(|s| s.scheme)
            .collect();
        Self {
            model_name,
            created_at: Utc::now(),
            tensor_count: container.entries().len(),
            schemes: schemes.into_iter().collect(),
            content_hash: container.content_hash(),
            extra: Default::default(),
        }
    }

    /// Path of the manifest belonging to a container file.
    pub fn path_for<P: AsRef<Path>>(container_path: P) -> PathBuf {
        let mut os = container_path.as_ref().as_os_str().to_os_string();
        os.push(".manifest.json");
        PathBuf::from(os)
    }

    /// Write the manifest next to `container_path`.
    pub fn save<P: AsRef<Path>>(&self, container_path: P) -> Result<PathBuf> {
        let path = Self::path_for(&container_path);
        std::fs::write(&path, serde_json::to_vec_pretty(self)?)?;
        info!(path = %path.display(), "wrote manifest");
        Ok(path)
    }

    /// Load the manifest belonging to `container_path`.
    pub fn load<P: AsRef<Path>>(container_path: P) -> Result<Self> {
        let path = Self::path_for(&container_path);
        let bytes = std::fs::read(&path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::ContainerWriter;
    use merino_quant::{QuantizedTensor, Scheme};

    fn sample_container() -> Container {
        let mut writer = ContainerWriter::new();
        let values: Vec<f32> = (0..256).map(|i| i as f32 * 0.01).collect();
        writer
            .add_tensor(
                "a",
                QuantizedTensor::quantize(&values, &[256], Scheme::Q4_K).unwrap(),
            )
            .unwrap();
        writer
            .add_tensor(
                "b",
                QuantizedTensor::quantize(&values, &[8, 32], Scheme::Q8_0).unwrap(),
            )
            .unwrap();
        Container::from_bytes(writer.write().unwrap()).unwrap()
    }

    #[test]
    fn test_manifest_describes_container() {
        let container = sample_container();
        let manifest = Manifest::for_container(&container, Some("tiny".into()));
        assert_eq!(manifest.tensor_count, 2);
        assert_eq!(manifest.schemes, vec!["Q4_K", "Q8_0"]);
        assert_eq!(manifest.content_hash, container.content_hash());
    }

    #[test]
    fn test_manifest_save_load_round_trip() {
        let container = sample_container();
        let manifest = Manifest::for_container(&container, None);

        let dir = tempfile::tempdir().unwrap();
        let container_path = dir.path().join("model.mtc");
        manifest.save(&container_path).unwrap();

        let loaded = Manifest::load(&container_path).unwrap();
        assert_eq!(loaded.tensor_count, 2);
        assert_eq!(loaded.content_hash, manifest.content_hash);
    }

    #[test]
    fn test_manifest_path() {
        assert_eq!(
            Manifest::path_for("/models/tiny.mtc"),
            PathBuf::from("/models/tiny.mtc.manifest.json")
        );
    }
}

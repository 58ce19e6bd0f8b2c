//! Portable inference artifacts.
//!
//! A trained model is exported as a JSON artifact that a lightweight runtime
//! can score without the training-side machinery. Models whose learned state
//! is a raw sample bank (patchcore) cannot be represented and refuse export.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use ndarray::{Array1, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::CoreError;
use crate::models::{fastflow, padim, AnomalyModel};

/// File name of the artifact inside its export directory.
pub const ARTIFACT_FILE: &str = "model.json";

/// Learned state of an exported model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PortableModel {
    /// Per-dimension gaussian statistics over a selected feature subset.
    Gaussian {
        selected: Vec<usize>,
        mean: Vec<f32>,
        inv_var: Vec<f32>,
    },
    /// Element-wise affine whitening transform.
    Affine { scale: Vec<f32>, shift: Vec<f32> },
}

impl PortableModel {
    /// Scores a batch of samples, one score per row.
    ///
    /// Produces exactly the same values as the native model it was exported
    /// from; both delegate to the shared scoring routines.
    pub fn score(&self, samples: ArrayView2<'_, f32>) -> Result<Array1<f32>, CoreError> {
        match self {
            Self::Gaussian {
                selected,
                mean,
                inv_var,
            } => padim::gaussian_score(selected, mean, inv_var, samples),
            Self::Affine { scale, shift } => fastflow::affine_nll(scale, shift, samples),
        }
    }
}

/// On-disk artifact: portable model plus provenance metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortableArtifact {
    pub model_name: String,
    pub input_size: u32,
    pub created_at: DateTime<Utc>,
    pub model: PortableModel,
}

impl PortableArtifact {
    /// Writes the artifact into `dir`, atomically.
    pub fn save(&self, dir: &Path) -> Result<PathBuf, CoreError> {
        fs::create_dir_all(dir)?;
        let path = dir.join(ARTIFACT_FILE);
        let content = serde_json::to_string_pretty(self)?;
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, &content)?;
        fs::rename(&tmp, &path)?;
        Ok(path)
    }

    /// Loads an artifact previously written with [`PortableArtifact::save`].
    pub fn load(dir: &Path) -> Result<Self, CoreError> {
        let path = dir.join(ARTIFACT_FILE);
        let content = fs::read_to_string(&path).map_err(|e| {
            CoreError::export(format!("cannot read artifact {}: {e}", path.display()))
        })?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Exports a trained model into `dir` and returns the artifact path.
pub fn export_model(
    model: &dyn AnomalyModel,
    config: &Config,
    dir: &Path,
) -> Result<PathBuf, CoreError> {
    let portable = model.to_portable()?;
    let artifact = PortableArtifact {
        model_name: model.name().to_string(),
        input_size: config.dataset()?.image_size,
        created_at: Utc::now(),
        model: portable,
    };
    tracing::info!(model = model.name(), dir = %dir.display(), "exporting portable artifact");
    artifact.save(dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn artifact_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = PortableArtifact {
            model_name: "fastflow".to_string(),
            input_size: 64,
            created_at: Utc::now(),
            model: PortableModel::Affine {
                scale: vec![1.0, 2.0],
                shift: vec![0.0, -0.5],
            },
        };
        artifact.save(dir.path()).unwrap();
        let loaded = PortableArtifact::load(dir.path()).unwrap();
        assert_eq!(loaded.model_name, artifact.model_name);
        assert_eq!(loaded.model, artifact.model);
    }

    #[test]
    fn loading_a_missing_artifact_reports_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let err = PortableArtifact::load(dir.path()).unwrap_err();
        assert!(err.to_string().contains(ARTIFACT_FILE));
    }
}

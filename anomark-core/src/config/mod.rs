//! Configuration trees for model runs.
//!
//! Each model family ships a default configuration (embedded YAML). A run
//! starts from the family default and applies dotted-path overrides onto the
//! raw tree before any typed section is read, so every grid parameter lands
//! exactly where the default declares it. Unknown paths fail loudly instead
//! of silently growing the tree.

use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;

use crate::error::CoreError;

const PADIM_DEFAULTS: &str = include_str!("defaults/padim.yaml");
const PATCHCORE_DEFAULTS: &str = include_str!("defaults/patchcore.yaml");
const FASTFLOW_DEFAULTS: &str = include_str!("defaults/fastflow.yaml");

/// A fully mergeable model configuration.
///
/// Wraps the raw YAML tree; typed views are deserialized per section so the
/// model-specific block stays open-ended.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Config {
    tree: Value,
}

impl Config {
    /// Loads the default configuration for a model family.
    pub fn for_model(model_name: &str) -> Result<Self, CoreError> {
        let raw = match model_name {
            "padim" => PADIM_DEFAULTS,
            "patchcore" => PATCHCORE_DEFAULTS,
            "fastflow" => FASTFLOW_DEFAULTS,
            other => return Err(CoreError::UnknownModel(other.to_string())),
        };
        Self::from_yaml_str(raw)
    }

    /// Parses a configuration tree from a YAML document.
    pub fn from_yaml_str(raw: &str) -> Result<Self, CoreError> {
        Ok(Self {
            tree: serde_yaml::from_str(raw)?,
        })
    }

    /// Sets the value at a dotted parameter path.
    ///
    /// The full path must already exist in the tree; an unknown segment is a
    /// configuration error, never a silent insert.
    pub fn set_by_path(&mut self, path: &str, value: Value) -> Result<(), CoreError> {
        let mut node = &mut self.tree;
        let mut segments = path.split('.').peekable();
        while let Some(segment) = segments.next() {
            let slot = node
                .get_mut(segment)
                .ok_or_else(|| CoreError::config(format!("unknown parameter path `{path}`")))?;
            if segments.peek().is_none() {
                *slot = value;
                return Ok(());
            }
            node = slot;
        }
        Err(CoreError::config(format!("empty parameter path `{path}`")))
    }

    /// Name of the model family this configuration belongs to.
    pub fn model_name(&self) -> Result<String, CoreError> {
        self.tree
            .get("model")
            .and_then(|m| m.get("name"))
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| CoreError::config("missing `model.name`"))
    }

    pub fn dataset(&self) -> Result<DatasetConfig, CoreError> {
        self.section("dataset")
    }

    pub fn trainer(&self) -> Result<TrainerConfig, CoreError> {
        self.section("trainer")
    }

    pub fn project(&self) -> Result<ProjectConfig, CoreError> {
        self.section("project")
    }

    /// Deserializes the model section into family-specific parameters.
    pub fn model_params<T: DeserializeOwned>(&self) -> Result<T, CoreError> {
        self.section("model")
    }

    /// Copies `dataset.image_size` into `model.input_size`.
    ///
    /// Grid overrides touch the dataset side; the model side must follow so
    /// both agree on the resolution the run executes at.
    pub fn sync_input_size(&mut self) -> Result<(), CoreError> {
        let size = self.dataset()?.image_size;
        self.set_by_path("model.input_size", Value::Number(u64::from(size).into()))
    }

    /// Binds the trainer section to a concrete device assignment.
    ///
    /// Legacy single-purpose device fields inherited from the defaults are
    /// cleared so they cannot contradict the explicit assignment.
    pub fn apply_device(
        &mut self,
        accelerator: &str,
        device_index: Option<usize>,
    ) -> Result<(), CoreError> {
        self.set_by_path(
            "trainer.accelerator",
            Value::String(accelerator.to_string()),
        )?;
        let devices = match device_index {
            Some(index) => Value::Sequence(vec![Value::Number((index as u64).into())]),
            None => Value::Null,
        };
        self.set_by_path("trainer.devices", devices)?;
        for legacy in ["trainer.gpus", "trainer.num_processes"] {
            self.set_by_path(legacy, Value::Null)?;
        }
        Ok(())
    }

    pub fn set_seed(&mut self, seed: u64) -> Result<(), CoreError> {
        self.set_by_path("project.seed", Value::Number(seed.into()))
    }

    pub fn set_project_path(&mut self, path: &Path) -> Result<(), CoreError> {
        self.set_by_path(
            "project.path",
            Value::String(path.display().to_string()),
        )
    }

    fn section<T: DeserializeOwned>(&self, key: &str) -> Result<T, CoreError> {
        let value = self
            .tree
            .get(key)
            .cloned()
            .ok_or_else(|| CoreError::config(format!("missing `{key}` section")))?;
        Ok(serde_yaml::from_value(value)?)
    }
}

/// Dataset section of a model configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetConfig {
    pub name: String,
    pub category: String,
    pub image_size: u32,
    pub num_train: usize,
    pub num_test: usize,
    pub anomaly_ratio: f64,
}

/// Project section: seed and artifact root for one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub seed: u64,
    pub path: std::path::PathBuf,
}

/// Trainer section of a model configuration.
///
/// `gpus` and `num_processes` are legacy device-selection fields kept for
/// config compatibility; `apply_device` nulls them out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainerConfig {
    pub accelerator: String,
    pub devices: Option<Vec<usize>>,
    pub max_epochs: usize,
    pub early_stopping: Option<EarlyStoppingConfig>,
    #[serde(default)]
    pub gpus: Option<Vec<usize>>,
    #[serde(default)]
    pub num_processes: Option<usize>,
}

/// Early-stopping settings monitored by the engine's fit loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EarlyStoppingConfig {
    pub metric: String,
    pub patience: usize,
    pub mode: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn default_config_resolves_typed_sections() {
        let config = Config::for_model("padim").unwrap();
        assert_eq!(config.model_name().unwrap(), "padim");
        let dataset = config.dataset().unwrap();
        assert_eq!(dataset.category, "bottle");
        assert_eq!(dataset.image_size, 64);
        let trainer = config.trainer().unwrap();
        assert_eq!(trainer.accelerator, "cpu");
        assert_eq!(trainer.max_epochs, 1);
    }

    #[test]
    fn unknown_model_is_rejected() {
        let err = Config::for_model("autoencoder").unwrap_err();
        assert!(matches!(err, CoreError::UnknownModel(name) if name == "autoencoder"));
    }

    #[test]
    fn set_by_path_overrides_existing_leaf() {
        let mut config = Config::for_model("fastflow").unwrap();
        config
            .set_by_path("dataset.category", Value::String("cable".into()))
            .unwrap();
        config
            .set_by_path("model.lr", Value::Number(0.01.into()))
            .unwrap();
        assert_eq!(config.dataset().unwrap().category, "cable");
    }

    #[test]
    fn set_by_path_rejects_unknown_segment() {
        let mut config = Config::for_model("padim").unwrap();
        let err = config
            .set_by_path("model.nonexistent", Value::Null)
            .unwrap_err();
        assert!(err.to_string().contains("model.nonexistent"));

        let err = config
            .set_by_path("nonexistent.leaf", Value::Null)
            .unwrap_err();
        assert!(matches!(err, CoreError::Config(_)));
    }

    #[test]
    fn apply_device_sets_accelerator_and_clears_legacy_fields() {
        let mut config = Config::for_model("padim").unwrap();
        config.apply_device("gpu", Some(1)).unwrap();
        let trainer = config.trainer().unwrap();
        assert_eq!(trainer.accelerator, "gpu");
        assert_eq!(trainer.devices, Some(vec![1]));
        assert_eq!(trainer.gpus, None);
        assert_eq!(trainer.num_processes, None);

        config.apply_device("cpu", None).unwrap();
        let trainer = config.trainer().unwrap();
        assert_eq!(trainer.accelerator, "cpu");
        assert_eq!(trainer.devices, None);
    }

    #[test]
    fn sync_input_size_follows_dataset_override() {
        let mut config = Config::for_model("patchcore").unwrap();
        config
            .set_by_path("dataset.image_size", Value::Number(128u64.into()))
            .unwrap();
        config.sync_input_size().unwrap();

        #[derive(Deserialize)]
        struct ModelView {
            input_size: u32,
        }
        let view: ModelView = config.model_params().unwrap();
        assert_eq!(view.input_size, 128);
    }
}

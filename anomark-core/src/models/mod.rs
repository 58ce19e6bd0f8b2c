//! Anomaly-detection model zoo.
//!
//! Every family implements [`AnomalyModel`]; [`build_model`] resolves a
//! merged configuration into a boxed instance. Family-level capabilities the
//! sweep orchestrator needs (fixed canonical resolutions) are exposed as
//! plain lookups so the caller never has to instantiate a model to ask.

pub mod fastflow;
pub mod padim;
pub mod patchcore;

use ndarray::{Array1, ArrayView2};

pub use fastflow::Fastflow;
pub use padim::Padim;
pub use patchcore::Patchcore;

use crate::config::Config;
use crate::data::DataModule;
use crate::error::CoreError;
use crate::export::PortableModel;

/// A trainable anomaly detector over flattened sample grids.
pub trait AnomalyModel: Send {
    /// Family name, matching the configuration's `model.name`.
    fn name(&self) -> &'static str;

    /// Runs one training epoch over the train split and returns the epoch
    /// loss. Single-pass families complete their whole fit in epoch one and
    /// report a summary statistic as the loss.
    fn train_epoch(&mut self, data: &DataModule) -> Result<f64, CoreError>;

    /// Scores a batch of samples; higher means more anomalous.
    fn score(&self, samples: ArrayView2<'_, f32>) -> Result<Array1<f32>, CoreError>;

    /// Converts the learned state into the portable artifact representation.
    fn to_portable(&self) -> Result<PortableModel, CoreError>;
}

/// Instantiates the model family named by the configuration.
pub fn build_model(config: &Config) -> Result<Box<dyn AnomalyModel>, CoreError> {
    let name = config.model_name()?;
    let seed = config.project()?.seed;
    match name.as_str() {
        padim::NAME => Ok(Box::new(Padim::new(config.model_params()?, seed))),
        patchcore::NAME => Ok(Box::new(Patchcore::new(config.model_params()?, seed))),
        fastflow::NAME => Ok(Box::new(Fastflow::new(config.model_params()?))),
        other => Err(CoreError::UnknownModel(other.to_string())),
    }
}

/// Canonical input resolution for families that only operate at one size.
///
/// Returns `None` for families that accept any resolution.
pub fn fixed_input_size(model_name: &str) -> Option<u32> {
    match model_name {
        patchcore::NAME => Some(patchcore::CANONICAL_INPUT_SIZE),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_builds_every_family() {
        for name in ["padim", "patchcore", "fastflow"] {
            let config = Config::for_model(name).unwrap();
            let model = build_model(&config).unwrap();
            assert_eq!(model.name(), name);
        }
    }

    #[test]
    fn registry_rejects_unknown_families() {
        let mut config = Config::for_model("padim").unwrap();
        config
            .set_by_path("model.name", serde_yaml::Value::String("draem".into()))
            .unwrap();
        let err = build_model(&config).unwrap_err();
        assert!(matches!(err, CoreError::UnknownModel(name) if name == "draem"));
    }

    #[test]
    fn only_patchcore_is_resolution_locked() {
        assert_eq!(fixed_input_size("patchcore"), Some(224));
        assert_eq!(fixed_input_size("padim"), None);
        assert_eq!(fixed_input_size("fastflow"), None);
    }
}

//! Fit/test engine.
//!
//! Drives a model through its epoch loop and evaluation the way the trainer
//! section asks for, reporting every scalar test metric by name. All
//! progress goes through `tracing`, so callers that wrap the engine in an
//! output-capture scope see the full story on failure and silence on
//! success.

use std::collections::BTreeMap;

use tracing::{debug, info};

use crate::config::{EarlyStoppingConfig, TrainerConfig};
use crate::data::DataModule;
use crate::error::CoreError;
use crate::metrics;
use crate::models::AnomalyModel;

/// Runs fit and test loops for one merged configuration.
pub struct Engine {
    trainer: TrainerConfig,
}

impl Engine {
    pub fn new(trainer: TrainerConfig) -> Self {
        Self { trainer }
    }

    /// Trains the model to completion.
    ///
    /// Runs up to `max_epochs` epochs, stopping early when the configured
    /// early-stopping monitor sees no improvement for `patience` epochs.
    pub fn fit(&self, model: &mut dyn AnomalyModel, data: &DataModule) -> Result<(), CoreError> {
        info!(
            model = model.name(),
            accelerator = %self.trainer.accelerator,
            devices = ?self.trainer.devices,
            max_epochs = self.trainer.max_epochs,
            "starting fit"
        );
        let mut stopper = self.trainer.early_stopping.as_ref().map(EarlyStopper::new);
        for epoch in 0..self.trainer.max_epochs {
            let loss = model.train_epoch(data)?;
            debug!(epoch, loss, "epoch complete");
            if let Some(stopper) = stopper.as_mut() {
                if stopper.should_stop(loss) {
                    info!(epoch, loss, "early stopping triggered");
                    break;
                }
            }
        }
        info!(model = model.name(), "fit complete");
        Ok(())
    }

    /// Evaluates the model over the test split.
    ///
    /// Returns every scalar test metric as a name-to-value mapping.
    pub fn test(
        &self,
        model: &dyn AnomalyModel,
        data: &DataModule,
    ) -> Result<BTreeMap<String, f64>, CoreError> {
        let scores = model.score(data.test.view())?;
        let scores = scores
            .as_slice()
            .ok_or_else(|| CoreError::model("non-contiguous score vector"))?;
        let auroc = metrics::auroc(scores, &data.test_labels);
        let (f1, threshold) = metrics::optimal_f1(scores, &data.test_labels);
        info!(model = model.name(), auroc, f1, "test complete");

        let mut results = BTreeMap::new();
        results.insert("image_AUROC".to_string(), auroc);
        results.insert("image_F1Score".to_string(), f1);
        results.insert("image_threshold".to_string(), threshold);
        Ok(results)
    }
}

/// Patience-based early stopping on the epoch loss.
struct EarlyStopper {
    patience: usize,
    minimize: bool,
    best: Option<f64>,
    stale: usize,
}

impl EarlyStopper {
    fn new(cfg: &EarlyStoppingConfig) -> Self {
        Self {
            patience: cfg.patience,
            minimize: cfg.mode != "max",
            best: None,
            stale: 0,
        }
    }

    fn should_stop(&mut self, value: f64) -> bool {
        let improved = match self.best {
            None => true,
            Some(best) => {
                if self.minimize {
                    value < best
                } else {
                    value > best
                }
            }
        };
        if improved {
            self.best = Some(value);
            self.stale = 0;
        } else {
            self.stale += 1;
        }
        self.stale >= self.patience
    }
}

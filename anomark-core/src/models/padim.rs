//! Padim: per-dimension gaussian modeling over a random feature subset.
//!
//! Fitting estimates mean and variance of a seeded random subset of feature
//! dimensions from the normal-only train split; scoring is the diagonal
//! mahalanobis distance to that distribution.

use ndarray::{Array1, ArrayView2};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Deserialize;

use crate::data::DataModule;
use crate::error::CoreError;
use crate::export::PortableModel;
use crate::models::AnomalyModel;

pub const NAME: &str = "padim";

const VAR_EPS: f32 = 1e-6;

/// Model section parameters for the padim family.
#[derive(Debug, Clone, Deserialize)]
pub struct PadimParams {
    /// Number of feature dimensions kept (clamped to the sample dimension).
    #[serde(default = "default_n_features")]
    pub n_features: usize,
}

fn default_n_features() -> usize {
    100
}

pub struct Padim {
    params: PadimParams,
    seed: u64,
    selected: Vec<usize>,
    mean: Vec<f32>,
    inv_var: Vec<f32>,
    fitted: bool,
}

impl Padim {
    pub fn new(params: PadimParams, seed: u64) -> Self {
        Self {
            params,
            seed,
            selected: Vec::new(),
            mean: Vec::new(),
            inv_var: Vec::new(),
            fitted: false,
        }
    }
}

impl AnomalyModel for Padim {
    fn name(&self) -> &'static str {
        NAME
    }

    fn train_epoch(&mut self, data: &DataModule) -> Result<f64, CoreError> {
        let dim = data.feature_dim();
        let keep = self.params.n_features.clamp(1, dim);
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut selected = rand::seq::index::sample(&mut rng, dim, keep).into_vec();
        selected.sort_unstable();

        let n = data.train.nrows() as f32;
        let mut mean = Vec::with_capacity(keep);
        let mut inv_var = Vec::with_capacity(keep);
        for &d in &selected {
            let column = data.train.column(d);
            let m: f32 = column.sum() / n;
            let var: f32 = column.iter().map(|v| (v - m) * (v - m)).sum::<f32>() / n + VAR_EPS;
            mean.push(m);
            inv_var.push(1.0 / var);
        }

        self.selected = selected;
        self.mean = mean;
        self.inv_var = inv_var;
        self.fitted = true;

        let train_scores =
            gaussian_score(&self.selected, &self.mean, &self.inv_var, data.train.view())?;
        let loss = f64::from(train_scores.sum()) / data.train.nrows() as f64;
        tracing::debug!(kept = keep, loss, "padim gaussian statistics fitted");
        Ok(loss)
    }

    fn score(&self, samples: ArrayView2<'_, f32>) -> Result<Array1<f32>, CoreError> {
        if !self.fitted {
            return Err(CoreError::model("padim has not been fitted"));
        }
        gaussian_score(&self.selected, &self.mean, &self.inv_var, samples)
    }

    fn to_portable(&self) -> Result<PortableModel, CoreError> {
        if !self.fitted {
            return Err(CoreError::export("padim has not been fitted"));
        }
        Ok(PortableModel::Gaussian {
            selected: self.selected.clone(),
            mean: self.mean.clone(),
            inv_var: self.inv_var.clone(),
        })
    }
}

/// Diagonal mahalanobis distance over the selected dimensions.
///
/// Shared between the native model and the portable runtime so exported
/// artifacts score identically.
pub(crate) fn gaussian_score(
    selected: &[usize],
    mean: &[f32],
    inv_var: &[f32],
    samples: ArrayView2<'_, f32>,
) -> Result<Array1<f32>, CoreError> {
    if selected.len() != mean.len() || mean.len() != inv_var.len() {
        return Err(CoreError::model("inconsistent gaussian statistics"));
    }
    let dim = samples.ncols();
    if selected.iter().any(|&d| d >= dim) {
        return Err(CoreError::model(format!(
            "selected feature index out of range for dimension {dim}"
        )));
    }
    let k = selected.len() as f32;
    let scores = samples
        .rows()
        .into_iter()
        .map(|row| {
            let acc: f32 = selected
                .iter()
                .zip(mean)
                .zip(inv_var)
                .map(|((&d, &m), &iv)| {
                    let delta = row[d] - m;
                    delta * delta * iv
                })
                .sum();
            (acc / k).sqrt()
        })
        .collect();
    Ok(scores)
}

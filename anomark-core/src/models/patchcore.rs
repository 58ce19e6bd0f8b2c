//! Patchcore: coreset memory bank with nearest-neighbor scoring.
//!
//! Fitting subsamples the train split into a memory bank; a test sample's
//! score is its mean distance to the nearest bank entries. The family is
//! locked to one canonical resolution, and the raw bank has no portable
//! representation.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Deserialize;

use crate::data::DataModule;
use crate::error::CoreError;
use crate::export::PortableModel;
use crate::models::AnomalyModel;

pub const NAME: &str = "patchcore";

/// The only input resolution the family's distance statistics are tuned for.
pub const CANONICAL_INPUT_SIZE: u32 = 224;

/// Model section parameters for the patchcore family.
#[derive(Debug, Clone, Deserialize)]
pub struct PatchcoreParams {
    /// Fraction of the train split kept in the memory bank.
    #[serde(default = "default_coreset_ratio")]
    pub coreset_ratio: f64,
    /// Neighbors averaged per score.
    #[serde(default = "default_num_neighbors")]
    pub num_neighbors: usize,
}

fn default_coreset_ratio() -> f64 {
    0.1
}

fn default_num_neighbors() -> usize {
    2
}

pub struct Patchcore {
    params: PatchcoreParams,
    seed: u64,
    bank: Option<Array2<f32>>,
}

impl Patchcore {
    pub fn new(params: PatchcoreParams, seed: u64) -> Self {
        Self {
            params,
            seed,
            bank: None,
        }
    }

    /// Number of entries currently in the memory bank.
    pub fn bank_size(&self) -> usize {
        self.bank.as_ref().map_or(0, Array2::nrows)
    }
}

impl AnomalyModel for Patchcore {
    fn name(&self) -> &'static str {
        NAME
    }

    fn train_epoch(&mut self, data: &DataModule) -> Result<f64, CoreError> {
        if !(0.0..=1.0).contains(&self.params.coreset_ratio) {
            return Err(CoreError::model("coreset_ratio must be within [0, 1]"));
        }
        let n = data.train.nrows();
        let keep = ((n as f64 * self.params.coreset_ratio).ceil() as usize).clamp(1, n);
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut indices = rand::seq::index::sample(&mut rng, n, keep).into_vec();
        indices.sort_unstable();
        let bank = data.train.select(Axis(0), &indices);

        // coreset spread: mean nearest-other distance within the bank
        let mut spread = 0.0f64;
        if keep > 1 {
            for (i, row) in bank.rows().into_iter().enumerate() {
                let nearest = bank
                    .rows()
                    .into_iter()
                    .enumerate()
                    .filter(|(j, _)| *j != i)
                    .map(|(_, other)| euclidean(row, other))
                    .fold(f32::INFINITY, f32::min);
                spread += f64::from(nearest);
            }
            spread /= keep as f64;
        }

        self.bank = Some(bank);
        tracing::debug!(bank_size = keep, spread, "patchcore memory bank built");
        Ok(spread)
    }

    fn score(&self, samples: ArrayView2<'_, f32>) -> Result<Array1<f32>, CoreError> {
        let bank = self
            .bank
            .as_ref()
            .ok_or_else(|| CoreError::model("patchcore has not been fitted"))?;
        if bank.ncols() != samples.ncols() {
            return Err(CoreError::model(format!(
                "sample dimension {} does not match bank dimension {}",
                samples.ncols(),
                bank.ncols()
            )));
        }
        let neighbors = self.params.num_neighbors.clamp(1, bank.nrows());
        let scores = samples
            .rows()
            .into_iter()
            .map(|row| {
                let mut distances: Vec<f32> = bank
                    .rows()
                    .into_iter()
                    .map(|entry| euclidean(row, entry))
                    .collect();
                distances.sort_by(f32::total_cmp);
                distances[..neighbors].iter().sum::<f32>() / neighbors as f32
            })
            .collect();
        Ok(scores)
    }

    fn to_portable(&self) -> Result<PortableModel, CoreError> {
        Err(CoreError::export(
            "nearest-neighbor memory banks are not representable in the portable artifact format",
        ))
    }
}

fn euclidean(a: ArrayView1<'_, f32>, b: ArrayView1<'_, f32>) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

//! Sweep configuration and run-config generation.
//!
//! The grid-search mapping is a nested YAML tree flattened into dotted
//! parameter paths. A leaf sequence is a candidate set, a leaf scalar a
//! fixed value carried into every run. Generation walks the cartesian
//! product in declaration order with the last-declared dimension varying
//! fastest, so repeated enumerations of one spec always agree — lane
//! splitting depends on that.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};

use crate::error::BenchError;
use crate::writer::WriterKind;

/// Grid dimension that names the model family; mandatory in every sweep.
pub const MODEL_NAME_KEY: &str = "model_name";

/// Declarative input for one benchmark sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepConfig {
    pub seed: u64,
    /// Also measure exported-artifact throughput for every run.
    #[serde(default)]
    pub compute_portable: bool,
    pub hardware: Vec<HardwareTarget>,
    pub writer: Vec<WriterKind>,
    pub grid_search: Mapping,
}

impl SweepConfig {
    /// Loads a sweep configuration from a YAML file.
    pub fn load(path: &Path) -> Result<Self, BenchError> {
        let raw = fs::read_to_string(path).map_err(|e| {
            BenchError::config(format!("cannot read sweep config {}: {e}", path.display()))
        })?;
        Ok(serde_yaml::from_str(&raw)?)
    }

    /// Builds the run-config generator for this sweep's grid.
    pub fn run_configs(&self) -> Result<RunConfigGenerator, BenchError> {
        RunConfigGenerator::new(&self.grid_search)
    }
}

/// Device classes a sweep may target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HardwareTarget {
    Cpu,
    Gpu,
}

/// One concrete point in the grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub model_name: String,
    /// Dotted parameter paths and their concrete values, in grid
    /// declaration order; `model_name` is carried separately.
    pub params: Vec<(String, Value)>,
}

impl RunConfig {
    /// Dataset category for this run, when the grid pins one.
    pub fn category(&self) -> Option<&str> {
        self.params
            .iter()
            .find(|(path, _)| path == "dataset.category")
            .and_then(|(_, value)| value.as_str())
    }
}

/// Lazy, restartable enumeration of a grid's cartesian product.
pub struct RunConfigGenerator {
    dims: Vec<(String, Vec<Value>)>,
    cursor: Vec<usize>,
    remaining: usize,
}

impl RunConfigGenerator {
    fn new(grid: &Mapping) -> Result<Self, BenchError> {
        let mut dims = Vec::new();
        flatten("", grid, &mut dims)?;

        let model_dim = dims
            .iter()
            .find(|(path, _)| path == MODEL_NAME_KEY)
            .ok_or_else(|| BenchError::config("grid_search must declare `model_name`"))?;
        if model_dim.1.iter().any(|v| v.as_str().is_none()) {
            return Err(BenchError::config(
                "`model_name` candidates must all be strings",
            ));
        }
        if let Some((path, _)) = dims.iter().find(|(_, candidates)| candidates.is_empty()) {
            return Err(BenchError::config(format!(
                "empty candidate set for `{path}`"
            )));
        }

        let remaining = dims.iter().map(|(_, candidates)| candidates.len()).product();
        let cursor = vec![0; dims.len()];
        Ok(Self {
            dims,
            cursor,
            remaining,
        })
    }
}

impl Iterator for RunConfigGenerator {
    type Item = RunConfig;

    fn next(&mut self) -> Option<RunConfig> {
        if self.remaining == 0 {
            return None;
        }

        let mut model_name = String::new();
        let mut params = Vec::with_capacity(self.dims.len().saturating_sub(1));
        for ((path, candidates), &slot) in self.dims.iter().zip(&self.cursor) {
            let value = candidates[slot].clone();
            if path == MODEL_NAME_KEY {
                model_name = value.as_str().unwrap_or_default().to_string();
            } else {
                params.push((path.clone(), value));
            }
        }

        // odometer increment, last dimension fastest
        for slot in (0..self.dims.len()).rev() {
            self.cursor[slot] += 1;
            if self.cursor[slot] < self.dims[slot].1.len() {
                break;
            }
            self.cursor[slot] = 0;
        }
        self.remaining -= 1;

        Some(RunConfig { model_name, params })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for RunConfigGenerator {}

/// Flattens a nested grid mapping into dotted-path dimensions, preserving
/// declaration order.
fn flatten(
    prefix: &str,
    mapping: &Mapping,
    out: &mut Vec<(String, Vec<Value>)>,
) -> Result<(), BenchError> {
    for (key, value) in mapping {
        let key = key
            .as_str()
            .ok_or_else(|| BenchError::config("grid_search keys must be strings"))?;
        let path = if prefix.is_empty() {
            key.to_string()
        } else {
            format!("{prefix}.{key}")
        };
        match value {
            Value::Mapping(nested) => flatten(&path, nested, out)?,
            Value::Sequence(candidates) => out.push((path, candidates.clone())),
            scalar => out.push((path, vec![scalar.clone()])),
        }
    }
    Ok(())
}

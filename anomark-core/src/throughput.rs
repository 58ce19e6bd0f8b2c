//! Inference throughput measurement.
//!
//! Replays the test split in batches outside the fit/test loops and reports
//! frames per second, for both the native model and a portable artifact.

use std::path::Path;
use std::time::Instant;

use ndarray::Axis;
use tracing::info;

use crate::data::DataModule;
use crate::error::CoreError;
use crate::export::PortableArtifact;
use crate::models::AnomalyModel;

const BATCH_SIZE: usize = 32;

/// Frames per second of the trained model on the test split.
pub fn native_throughput(model: &dyn AnomalyModel, data: &DataModule) -> Result<f64, CoreError> {
    let start = Instant::now();
    for batch in data.test.axis_chunks_iter(Axis(0), BATCH_SIZE) {
        model.score(batch)?;
    }
    let fps = frames_per_second(data.num_test(), start);
    info!(model = model.name(), fps, "native throughput measured");
    Ok(fps)
}

/// Frames per second of an exported artifact on the test split.
pub fn portable_throughput(artifact_dir: &Path, data: &DataModule) -> Result<f64, CoreError> {
    let artifact = PortableArtifact::load(artifact_dir)?;
    let start = Instant::now();
    for batch in data.test.axis_chunks_iter(Axis(0), BATCH_SIZE) {
        artifact.model.score(batch)?;
    }
    let fps = frames_per_second(data.num_test(), start);
    info!(model = %artifact.model_name, fps, "portable throughput measured");
    Ok(fps)
}

fn frames_per_second(frames: usize, start: Instant) -> f64 {
    let elapsed = start.elapsed().as_secs_f64().max(f64::EPSILON);
    frames as f64 / elapsed
}

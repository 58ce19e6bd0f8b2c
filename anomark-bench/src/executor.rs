//! End-to-end execution of one merged run configuration.

use std::fs;
use std::time::Instant;

use anomark_core::{build_model, export, throughput, Config, DataModule, Engine};

use crate::capture::captured;
use crate::error::BenchError;
use crate::writer::MetricsRecord;

const EXPORT_SUBDIR: &str = "exported_models";

/// Trains, tests, and measures one configuration, returning its metrics.
///
/// The whole cycle runs inside an output-capture scope: framework noise is
/// invisible on success and becomes the error message on failure. All run
/// artifacts live in an ephemeral working directory that is removed on
/// every exit path.
pub fn model_metrics(config: &Config, compute_portable: bool) -> Result<MetricsRecord, BenchError> {
    captured(|| {
        let workdir = tempfile::tempdir()?;
        let mut config = config.clone();
        config.set_project_path(workdir.path())?;

        let dataset = config.dataset()?;
        let project = config.project()?;
        let data = DataModule::new(&dataset, project.seed)?;
        let mut model = build_model(&config)?;
        let engine = Engine::new(config.trainer()?);

        let started = Instant::now();
        engine.fit(model.as_mut(), &data)?;
        let training_time = started.elapsed().as_secs_f64();

        let started = Instant::now();
        let test_results = engine.test(model.as_ref(), &data)?;
        let testing_time = started.elapsed().as_secs_f64();

        let fps = throughput::native_throughput(model.as_ref(), &data)?;

        let portable_fps = if compute_portable {
            let export_dir = project.path.join(EXPORT_SUBDIR);
            fs::create_dir_all(&export_dir)?;
            export::export_model(model.as_ref(), &config, &export_dir)?;
            throughput::portable_throughput(&export_dir, &data)?
        } else {
            f64::NAN
        };

        let mut record = MetricsRecord::default();
        record.insert("training_time_s", training_time);
        record.insert("testing_time_s", testing_time);
        record.insert("inference_throughput_fps", fps);
        record.insert("portable_inference_throughput_fps", portable_fps);
        for (name, value) in test_results {
            record.insert(name, value);
        }
        Ok(record)
    })
}

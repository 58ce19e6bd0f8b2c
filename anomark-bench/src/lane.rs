//! Device lanes: sequential execution of a run-config slice on one device.

use std::io::Read;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::info;

use anomark_core::{fixed_input_size, Config};

use crate::device::Device;
use crate::error::BenchError;
use crate::executor;
use crate::sweep::RunConfig;
use crate::writer::{write_metrics, MetricValue, MetricsRecord, WriterKind};

/// Everything one lane worker needs: its device identity, seed, sink list,
/// and the private slice of run configurations it owns. Serialized to the
/// worker process over stdin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaneSpec {
    pub device: Device,
    pub seed: u64,
    pub compute_portable: bool,
    pub writers: Vec<WriterKind>,
    pub results_dir: PathBuf,
    pub run_configs: Vec<RunConfig>,
}

impl LaneSpec {
    pub fn lane_name(&self) -> String {
        self.device.lane_name()
    }
}

/// Executes every run in the lane's slice, in order, forwarding each record
/// to the sinks as soon as it exists. A failing run aborts the lane; runs
/// already written stay written.
pub fn run_lane(spec: &LaneSpec) -> Result<(), BenchError> {
    info!(
        lane = %spec.lane_name(),
        runs = spec.run_configs.len(),
        "lane started"
    );
    for run in &spec.run_configs {
        let record = sweep_single(run, spec.device, spec.seed, spec.compute_portable)?;
        write_metrics(&record, &spec.writers, &spec.results_dir)?;
    }
    info!(lane = %spec.lane_name(), "lane finished");
    Ok(())
}

/// Resolves and executes one run configuration on `device`.
///
/// Families locked to a canonical resolution never measure portable
/// throughput, and at any other resolution the run is skipped outright:
/// the returned record is empty and the executor is never invoked.
pub fn sweep_single(
    run: &RunConfig,
    device: Device,
    seed: u64,
    compute_portable: bool,
) -> Result<MetricsRecord, BenchError> {
    let mut config = Config::for_model(&run.model_name)?;
    for (path, value) in &run.params {
        config.set_by_path(path, value.clone())?;
    }
    config.sync_input_size()?;
    config.apply_device(device.label(), device.index())?;
    config.set_seed(seed)?;

    let mut compute_portable = compute_portable;
    if let Some(canonical) = fixed_input_size(&run.model_name) {
        compute_portable = false;
        let size = config.dataset()?.image_size;
        if size != canonical {
            info!(
                model = %run.model_name,
                size,
                canonical,
                "skipping run: family requires its canonical resolution"
            );
            return Ok(MetricsRecord::default());
        }
    }

    let mut record = executor::model_metrics(&config, compute_portable)?;
    info!(
        model = %run.model_name,
        category = run.category().unwrap_or("-"),
        device = device.label(),
        "sweep run complete"
    );

    for (path, value) in &run.params {
        record.insert(path.clone(), MetricValue::from_yaml(value));
    }
    record.insert("device", device.label());
    record.insert("model_name", run.model_name.as_str());
    Ok(record)
}

/// Worker-process entry point: reads a [`LaneSpec`] from `input` and runs it.
pub fn run_worker<R: Read>(input: R) -> Result<(), BenchError> {
    let spec: LaneSpec = serde_json::from_reader(input)?;
    run_lane(&spec)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_yaml::Value;

    fn small_run(model: &str, category: &str) -> RunConfig {
        RunConfig {
            model_name: model.to_string(),
            params: vec![
                (
                    "dataset.category".to_string(),
                    Value::String(category.to_string()),
                ),
                ("dataset.image_size".to_string(), Value::Number(16u64.into())),
                ("dataset.num_train".to_string(), Value::Number(32u64.into())),
                ("dataset.num_test".to_string(), Value::Number(20u64.into())),
                ("trainer.max_epochs".to_string(), Value::Number(2u64.into())),
            ],
        }
    }

    #[test]
    fn record_carries_grid_params_device_and_model_name() {
        let run = small_run("padim", "bottle");
        let record = sweep_single(&run, Device::Cpu, 42, false).unwrap();
        assert_eq!(record.get("device").unwrap().as_str(), Some("cpu"));
        assert_eq!(record.get("model_name").unwrap().as_str(), Some("padim"));
        assert_eq!(
            record.get("dataset.category").unwrap().as_str(),
            Some("bottle")
        );
        assert_eq!(
            record.get("dataset.image_size").unwrap().as_f64(),
            Some(16.0)
        );
        assert!(record.get("image_AUROC").is_some());
    }

    #[test]
    fn unknown_grid_path_fails_loudly() {
        let mut run = small_run("padim", "bottle");
        run.params
            .push(("model.bogus_knob".to_string(), Value::Number(1u64.into())));
        let err = sweep_single(&run, Device::Cpu, 42, false).unwrap_err();
        assert!(err.to_string().contains("model.bogus_knob"));
    }

    #[test]
    fn resolution_locked_family_is_skipped_off_canonical() {
        // patchcore at a non-canonical resolution: empty record, and the
        // export step is unreachable even though portable metrics were on.
        let run = small_run("patchcore", "bottle");
        let record = sweep_single(&run, Device::Cpu, 42, true).unwrap();
        assert!(record.is_empty());
    }

    #[test]
    fn resolution_locked_family_never_measures_portable_throughput() {
        let mut run = small_run("patchcore", "bottle");
        for (path, value) in run.params.iter_mut() {
            match path.as_str() {
                "dataset.image_size" => *value = Value::Number(224u64.into()),
                "dataset.num_train" => *value = Value::Number(16u64.into()),
                _ => {}
            }
        }
        let record = sweep_single(&run, Device::Cpu, 42, true).unwrap();
        assert!(!record.is_empty());
        let portable = record
            .get("portable_inference_throughput_fps")
            .and_then(MetricValue::as_f64)
            .unwrap();
        assert!(portable.is_nan());
    }

    #[test]
    fn lane_spec_round_trips_through_json() {
        let spec = LaneSpec {
            device: Device::Gpu(1),
            seed: 7,
            compute_portable: true,
            writers: vec![WriterKind::Csv, WriterKind::Dashboard],
            results_dir: PathBuf::from("runs"),
            run_configs: vec![small_run("fastflow", "cable")],
        };
        let raw = serde_json::to_string(&spec).unwrap();
        let back: LaneSpec = serde_json::from_str(&raw).unwrap();
        assert_eq!(back.device, spec.device);
        assert_eq!(back.run_configs, spec.run_configs);
        assert_eq!(back.lane_name(), "gpu1");
    }
}

//! Lane scheduling and worker-process management.
//!
//! CPU-only sweeps run serially in the calling process. As soon as GPUs are
//! involved, every lane becomes a freshly spawned worker process (the
//! current executable re-invoked with the hidden `worker` subcommand), so
//! device-context state can never leak between lanes and a crash in one
//! lane cannot take down another. Lane assignments travel over the child's
//! stdin; its diagnostics land in a per-lane log file.

use std::env;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};

use tracing::{info, warn};

use crate::device::{Device, Resources};
use crate::error::BenchError;
use crate::lane::{run_lane, LaneSpec};
use crate::sweep::{HardwareTarget, RunConfig, SweepConfig};
use crate::writer::{publish_dashboard, WriterKind};

const LOG_SUBDIR: &str = "logs";
const LOG_TAIL_LINES: usize = 40;

/// Expands the sweep's grid and runs every configuration on the requested
/// hardware, then performs the final dashboard publish when one was asked
/// for.
pub fn distribute(
    config: &SweepConfig,
    resources: &Resources,
    results_dir: &Path,
) -> Result<(), BenchError> {
    let run_configs: Vec<RunConfig> = config.run_configs()?.collect();
    let wants_cpu = config.hardware.contains(&HardwareTarget::Cpu);
    let wants_gpu = config.hardware.contains(&HardwareTarget::Gpu);

    if run_configs.is_empty() {
        warn!("grid search produced no run configurations");
    } else if wants_gpu && resources.gpu_count == 0 {
        // best-effort: warn and schedule nothing rather than fail the sweep
        warn!("sweep config requested gpu benchmarking but no gpu devices were detected");
    } else if wants_cpu && wants_gpu {
        let mut workers = vec![spawn_worker(&cpu_lane(config, &run_configs, results_dir))?];
        for spec in gpu_lanes(config, &run_configs, resources.gpu_count, results_dir) {
            workers.push(spawn_worker(&spec)?);
        }
        join_workers(workers)?;
    } else if wants_cpu {
        run_lane(&cpu_lane(config, &run_configs, results_dir))?;
    } else if wants_gpu {
        let mut workers = Vec::new();
        for spec in gpu_lanes(config, &run_configs, resources.gpu_count, results_dir) {
            workers.push(spawn_worker(&spec)?);
        }
        join_workers(workers)?;
    }

    if config.writer.contains(&WriterKind::Dashboard) {
        publish_dashboard(results_dir)?;
    }
    Ok(())
}

/// Splits `items` into contiguous ceiling-division chunks, at most `lanes`
/// of them. Concatenating the chunks in order reproduces `items` exactly.
pub fn partition<T: Clone>(items: &[T], lanes: usize) -> Vec<Vec<T>> {
    if items.is_empty() || lanes == 0 {
        return Vec::new();
    }
    let chunk = items.len().div_ceil(lanes);
    items.chunks(chunk).map(<[T]>::to_vec).collect()
}

fn cpu_lane(config: &SweepConfig, run_configs: &[RunConfig], results_dir: &Path) -> LaneSpec {
    LaneSpec {
        device: Device::Cpu,
        seed: config.seed,
        compute_portable: config.compute_portable,
        writers: config.writer.clone(),
        results_dir: results_dir.to_path_buf(),
        run_configs: run_configs.to_vec(),
    }
}

fn gpu_lanes(
    config: &SweepConfig,
    run_configs: &[RunConfig],
    gpu_count: usize,
    results_dir: &Path,
) -> Vec<LaneSpec> {
    partition(run_configs, gpu_count)
        .into_iter()
        .enumerate()
        .map(|(index, slice)| LaneSpec {
            device: Device::Gpu(index),
            seed: config.seed,
            compute_portable: config.compute_portable,
            writers: config.writer.clone(),
            results_dir: results_dir.to_path_buf(),
            run_configs: slice,
        })
        .collect()
}

struct WorkerHandle {
    lane: String,
    child: Child,
    log_path: PathBuf,
}

/// Spawns one lane as a fresh worker process and hands it its assignment.
fn spawn_worker(spec: &LaneSpec) -> Result<WorkerHandle, BenchError> {
    let lane = spec.lane_name();
    let log_dir = spec.results_dir.join(LOG_SUBDIR);
    fs::create_dir_all(&log_dir)?;
    let log_path = log_dir.join(format!("{lane}.log"));
    let log_file = File::create(&log_path)?;

    info!(
        lane = %lane,
        runs = spec.run_configs.len(),
        "launching lane worker process"
    );
    let mut child = Command::new(env::current_exe()?)
        .arg("worker")
        .stdin(Stdio::piped())
        .stdout(Stdio::from(log_file.try_clone()?))
        .stderr(Stdio::from(log_file))
        .spawn()?;

    let mut stdin = child.stdin.take().ok_or_else(|| BenchError::Lane {
        lane: lane.clone(),
        detail: "stdin pipe unavailable".to_string(),
    })?;
    serde_json::to_writer(&mut stdin, spec)?;
    drop(stdin);

    Ok(WorkerHandle {
        lane,
        child,
        log_path,
    })
}

/// Awaits workers in launch order.
///
/// A failing worker surfaces immediately with the tail of its log; workers
/// launched after it are left running and keep flushing their records to
/// the sinks.
fn join_workers(handles: Vec<WorkerHandle>) -> Result<(), BenchError> {
    for mut handle in handles {
        let status = handle.child.wait()?;
        if !status.success() {
            return Err(BenchError::Lane {
                lane: handle.lane,
                detail: format!(
                    "worker exited with {status}; last output:\n{}",
                    log_tail(&handle.log_path, LOG_TAIL_LINES)
                ),
            });
        }
        info!(lane = %handle.lane, "lane worker completed");
    }
    Ok(())
}

fn log_tail(path: &Path, max_lines: usize) -> String {
    match fs::read_to_string(path) {
        Ok(content) => {
            let lines: Vec<&str> = content.lines().collect();
            let start = lines.len().saturating_sub(max_lines);
            lines[start..].join("\n")
        }
        Err(_) => "<worker log unavailable>".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn seven_items_over_three_lanes_split_3_3_1() {
        let items: Vec<u32> = (0..7).collect();
        let chunks = partition(&items, 3);
        let sizes: Vec<usize> = chunks.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![3, 3, 1]);
    }

    #[test]
    fn concatenated_chunks_reproduce_the_sequence() {
        for (total, lanes) in [(7usize, 3usize), (8, 4), (5, 5), (3, 8), (1, 1)] {
            let items: Vec<usize> = (0..total).collect();
            let chunks = partition(&items, lanes);
            assert!(chunks.len() <= lanes);
            assert!(chunks.iter().all(|chunk| !chunk.is_empty()));
            let rejoined: Vec<usize> = chunks.into_iter().flatten().collect();
            assert_eq!(rejoined, items);
        }
    }

    #[test]
    fn empty_input_yields_no_lanes() {
        assert!(partition(&[0u8; 0], 3).is_empty());
        assert!(partition(&[1u8], 0).is_empty());
    }

    #[test]
    fn gpu_lanes_get_contiguous_slices_in_device_order() {
        let config: SweepConfig = serde_yaml::from_str(
            "seed: 42\nhardware: [gpu]\nwriter: [csv]\n\
             grid_search:\n  model_name: [padim]\n  dataset:\n    category: [a, b, c, d, e, f, g]",
        )
        .unwrap();
        let run_configs: Vec<RunConfig> = config.run_configs().unwrap().collect();
        let lanes = gpu_lanes(&config, &run_configs, 3, Path::new("runs"));
        assert_eq!(lanes.len(), 3);
        assert_eq!(lanes[0].device, Device::Gpu(0));
        assert_eq!(lanes[2].device, Device::Gpu(2));
        assert_eq!(lanes[0].run_configs.len(), 3);
        assert_eq!(lanes[1].run_configs.len(), 3);
        assert_eq!(lanes[2].run_configs.len(), 1);
        let rejoined: Vec<RunConfig> = lanes
            .into_iter()
            .flat_map(|lane| lane.run_configs)
            .collect();
        assert_eq!(rejoined, run_configs);
    }

    #[test]
    fn gpu_request_without_gpus_warns_and_schedules_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let config: SweepConfig = serde_yaml::from_str(
            "seed: 42\nhardware: [gpu]\nwriter: [csv]\n\
             grid_search:\n  model_name: [padim]",
        )
        .unwrap();
        distribute(&config, &Resources { gpu_count: 0 }, dir.path()).unwrap();
        assert!(fs::read_dir(dir.path()).unwrap().next().is_none());
    }
}

//! Device identities and resource detection.

use std::env;
use std::fmt;
use std::process::Command;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Environment override for the detected GPU count; used by deployments
/// that hide devices from the driver probe.
pub const GPU_COUNT_ENV: &str = "ANOMARK_GPU_COUNT";

/// Identity of one scheduling lane's device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Device {
    Cpu,
    Gpu(usize),
}

impl Device {
    /// Device class label recorded in metrics and set as the trainer
    /// accelerator.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Cpu => "cpu",
            Self::Gpu(_) => "gpu",
        }
    }

    /// GPU index, when this is a GPU lane.
    pub fn index(&self) -> Option<usize> {
        match self {
            Self::Cpu => None,
            Self::Gpu(index) => Some(*index),
        }
    }

    /// Unique lane name, used for worker log files and error reports.
    pub fn lane_name(&self) -> String {
        match self {
            Self::Cpu => "cpu".to_string(),
            Self::Gpu(index) => format!("gpu{index}"),
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.lane_name())
    }
}

/// Compute resources available to the distributor.
#[derive(Debug, Clone, Copy)]
pub struct Resources {
    pub gpu_count: usize,
}

impl Resources {
    /// Detects available GPUs: env override first, then the driver probe.
    pub fn detect() -> Self {
        if let Ok(raw) = env::var(GPU_COUNT_ENV) {
            match raw.trim().parse() {
                Ok(gpu_count) => return Self { gpu_count },
                Err(_) => warn!("ignoring invalid {GPU_COUNT_ENV}={raw}"),
            }
        }
        Self {
            gpu_count: probe_gpu_count(),
        }
    }
}

fn probe_gpu_count() -> usize {
    match Command::new("nvidia-smi").arg("--list-gpus").output() {
        Ok(output) if output.status.success() => String::from_utf8_lossy(&output.stdout)
            .lines()
            .filter(|line| !line.trim().is_empty())
            .count(),
        _ => {
            debug!("gpu driver probe found no usable devices");
            0
        }
    }
}

//! # anomark-bench
//!
//! Benchmark sweep orchestrator. Expands a declarative grid of experiment
//! variants, schedules them across device lanes (one CPU lane, N GPU lanes,
//! each lane an isolated worker process), executes every variant's
//! train/test/export/measure cycle, and streams the per-run metrics records
//! to the configured sinks.

pub mod capture;
pub mod device;
pub mod distribute;
pub mod error;
pub mod executor;
pub mod lane;
pub mod sweep;
pub mod writer;

pub use device::{Device, Resources};
pub use distribute::distribute;
pub use error::BenchError;
pub use lane::{run_worker, LaneSpec};
pub use sweep::{RunConfig, RunConfigGenerator, SweepConfig};
pub use writer::{MetricValue, MetricsRecord, WriterKind};

//! # anomark-core
//!
//! Model zoo, data module, training engine, export, and throughput
//! measurement for Anomark. This crate knows nothing about sweeps or
//! device scheduling; `anomark-bench` drives it one merged configuration
//! at a time.

pub mod config;
pub mod data;
pub mod engine;
pub mod error;
pub mod export;
pub mod metrics;
pub mod models;
pub mod throughput;

pub use config::{Config, DatasetConfig, EarlyStoppingConfig, ProjectConfig, TrainerConfig};
pub use data::DataModule;
pub use engine::Engine;
pub use error::CoreError;
pub use export::{PortableArtifact, PortableModel};
pub use models::{build_model, fixed_input_size, AnomalyModel};

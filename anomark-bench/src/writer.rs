//! Metrics records and sinks.
//!
//! Every run produces one flat record. Sinks write each record as an
//! independent, complete unit the moment it arrives; nothing is batched, so
//! partial progress survives a later failure in the same lane. The
//! dashboard sink additionally supports a final cross-run aggregate publish.

use std::collections::BTreeMap;
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::BenchError;

const DASHBOARD_DIR: &str = "dashboard";
const DASHBOARD_RECORDS: &str = "records.jsonl";
const DASHBOARD_SUMMARY: &str = "summary.json";

/// Metrics sink identifiers a sweep may request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriterKind {
    /// Per-model CSV files, one row per run.
    Csv,
    /// JSON-lines staging area with a final aggregate publish.
    Dashboard,
}

/// A single metric value: numeric, or a short label.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricValue {
    Num(f64),
    Text(String),
}

impl MetricValue {
    /// Converts a grid parameter value into a metric value.
    pub fn from_yaml(value: &serde_yaml::Value) -> Self {
        match value {
            serde_yaml::Value::Number(n) => match n.as_f64() {
                Some(v) => Self::Num(v),
                None => Self::Text(n.to_string()),
            },
            serde_yaml::Value::Bool(b) => Self::Text(b.to_string()),
            serde_yaml::Value::String(s) => Self::Text(s.clone()),
            serde_yaml::Value::Null => Self::Text("null".to_string()),
            other => Self::Text(
                serde_yaml::to_string(other)
                    .map(|s| s.trim().to_string())
                    .unwrap_or_default(),
            ),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Num(v) => Some(*v),
            Self::Text(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Num(_) => None,
            Self::Text(s) => Some(s),
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Num(v) => write!(f, "{v}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<f64> for MetricValue {
    fn from(value: f64) -> Self {
        Self::Num(value)
    }
}

impl From<&str> for MetricValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for MetricValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl Serialize for MetricValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            // non-finite sentinels survive JSON as strings
            Self::Num(v) if v.is_finite() => serializer.serialize_f64(*v),
            Self::Num(v) => serializer.serialize_str(&v.to_string()),
            Self::Text(s) => serializer.serialize_str(s),
        }
    }
}

impl<'de> Deserialize<'de> for MetricValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ValueVisitor;

        impl<'de> de::Visitor<'de> for ValueVisitor {
            type Value = MetricValue;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a number or a string")
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<MetricValue, E> {
                Ok(MetricValue::Num(v as f64))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<MetricValue, E> {
                Ok(MetricValue::Num(v as f64))
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<MetricValue, E> {
                Ok(MetricValue::Num(v))
            }

            fn visit_bool<E: de::Error>(self, v: bool) -> Result<MetricValue, E> {
                Ok(MetricValue::Text(v.to_string()))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<MetricValue, E> {
                Ok(MetricValue::Text(v.to_string()))
            }
        }

        deserializer.deserialize_any(ValueVisitor)
    }
}

/// Flat result payload of one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetricsRecord {
    values: BTreeMap<String, MetricValue>,
}

impl MetricsRecord {
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<MetricValue>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&MetricValue> {
        self.values.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &MetricValue)> {
        self.values.iter()
    }
}

/// Forwards one record to every requested sink.
///
/// Empty records mark defensively skipped runs and are not persisted.
pub fn write_metrics(
    record: &MetricsRecord,
    writers: &[WriterKind],
    results_dir: &Path,
) -> Result<(), BenchError> {
    if record.is_empty() {
        debug!("skipping empty metrics record");
        return Ok(());
    }
    for writer in writers {
        match writer {
            WriterKind::Csv => write_csv(record, results_dir)?,
            WriterKind::Dashboard => write_dashboard_line(record, results_dir)?,
        }
    }
    Ok(())
}

fn write_csv(record: &MetricsRecord, results_dir: &Path) -> Result<(), BenchError> {
    let model_name = record
        .get("model_name")
        .and_then(MetricValue::as_str)
        .ok_or_else(|| BenchError::config("metrics record is missing `model_name`"))?;
    fs::create_dir_all(results_dir)?;
    let path = results_dir.join(format!("{model_name}.csv"));
    let write_header = !path.exists();
    let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
    if write_header {
        let header: Vec<&str> = record.iter().map(|(name, _)| name.as_str()).collect();
        writeln!(file, "{}", header.join(","))?;
    }
    let row: Vec<String> = record.iter().map(|(_, value)| value.to_string()).collect();
    writeln!(file, "{}", row.join(","))?;
    Ok(())
}

fn write_dashboard_line(record: &MetricsRecord, results_dir: &Path) -> Result<(), BenchError> {
    let dir = results_dir.join(DASHBOARD_DIR);
    fs::create_dir_all(&dir)?;
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join(DASHBOARD_RECORDS))?;
    writeln!(file, "{}", serde_json::to_string(record)?)?;
    Ok(())
}

/// Aggregate of all staged dashboard records.
#[derive(Debug, Serialize, Deserialize)]
pub struct DashboardSummary {
    pub generated_at: DateTime<Utc>,
    pub total_runs: usize,
    pub models: BTreeMap<String, ModelSummary>,
}

/// Per-model aggregate in the dashboard summary.
#[derive(Debug, Serialize, Deserialize)]
pub struct ModelSummary {
    pub runs: usize,
    /// Mean of every finite numeric metric across the model's runs.
    pub metric_means: BTreeMap<String, f64>,
}

/// Final cross-run publish: folds every staged record into one summary.
pub fn publish_dashboard(results_dir: &Path) -> Result<(), BenchError> {
    let dir = results_dir.join(DASHBOARD_DIR);
    let records_path = dir.join(DASHBOARD_RECORDS);
    if !records_path.exists() {
        info!("no dashboard records to publish");
        return Ok(());
    }

    let raw = fs::read_to_string(&records_path)?;
    let mut total_runs = 0;
    let mut models: BTreeMap<String, (usize, BTreeMap<String, (f64, usize)>)> = BTreeMap::new();
    for line in raw.lines().filter(|line| !line.trim().is_empty()) {
        let record: MetricsRecord = serde_json::from_str(line)?;
        let model_name = record
            .get("model_name")
            .and_then(MetricValue::as_str)
            .unwrap_or("unknown")
            .to_string();
        total_runs += 1;
        let entry = models.entry(model_name).or_default();
        entry.0 += 1;
        for (name, value) in record.iter() {
            if let Some(v) = value.as_f64().filter(|v| v.is_finite()) {
                let slot = entry.1.entry(name.clone()).or_insert((0.0, 0));
                slot.0 += v;
                slot.1 += 1;
            }
        }
    }

    let models = models
        .into_iter()
        .map(|(name, (runs, sums))| {
            let metric_means = sums
                .into_iter()
                .map(|(metric, (sum, count))| (metric, sum / count as f64))
                .collect();
            (name, ModelSummary { runs, metric_means })
        })
        .collect();
    let summary = DashboardSummary {
        generated_at: Utc::now(),
        total_runs,
        models,
    };

    let path = dir.join(DASHBOARD_SUMMARY);
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, serde_json::to_string_pretty(&summary)?)?;
    fs::rename(&tmp, &path)?;
    info!(total_runs, "dashboard summary published");
    Ok(())
}

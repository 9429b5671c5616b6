//! Decision mapper: reading to activation flag and metric target.
//!
//! Pure functions: nothing here performs I/O or keeps state.

use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

use crate::error::ConfigError;
use crate::metadata::TriggerMetadata;

/// Prefix added to every external metric name produced by this scaler.
const METRIC_PREFIX: &str = "loki";

/// How the controller interprets the target value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum MetricTargetType {
    /// Target is divided across replicas.
    #[default]
    AverageValue,
    /// Target is compared against the raw value.
    Value,
}

impl FromStr for MetricTargetType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "AverageValue" => Ok(MetricTargetType::AverageValue),
            "Value" => Ok(MetricTargetType::Value),
            "Utilization" => Err(ConfigError::UnsupportedMetricType(s.to_string())),
            other => Err(ConfigError::Invalid {
                field: "metricType",
                reason: format!("unknown metric target type {other:?}"),
            }),
        }
    }
}

/// Target half of an external metric descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricTarget {
    #[serde(rename = "type")]
    pub target_type: MetricTargetType,
    pub target_milli_value: i64,
}

/// External metric descriptor handed to the controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExternalMetricSpec {
    pub name: String,
    pub target: MetricTarget,
}

/// A single observed metric value in milli-units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalMetricValue {
    pub name: String,
    pub milli_value: i64,
    /// Seconds since the Unix epoch at which the value was produced.
    pub timestamp: u64,
}

/// Output of one evaluation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScaleDecision {
    pub reading: f64,
    pub active: bool,
    pub metric: ExternalMetricSpec,
}

/// Map a reading onto the activation flag and metric descriptor.
pub fn decide(
    reading: f64,
    metadata: &TriggerMetadata,
    target_type: MetricTargetType,
) -> ScaleDecision {
    ScaleDecision {
        reading,
        active: is_active(reading, metadata.activation_threshold),
        metric: metric_spec(metadata, target_type),
    }
}

/// Strictly greater than: a reading equal to the threshold stays inactive.
pub fn is_active(reading: f64, activation_threshold: f64) -> bool {
    reading > activation_threshold
}

/// Build the external metric descriptor for a trigger.
pub fn metric_spec(metadata: &TriggerMetadata, target_type: MetricTargetType) -> ExternalMetricSpec {
    ExternalMetricSpec {
        name: metric_name(metadata.scaler_index, &metadata.metric_name),
        target: MetricTarget {
            target_type,
            target_milli_value: to_milli(metadata.threshold),
        },
    }
}

/// Wrap a reading as an external metric value stamped with the current time.
pub fn metric_value(name: &str, reading: f64) -> ExternalMetricValue {
    ExternalMetricValue {
        name: name.to_string(),
        milli_value: to_milli(reading),
        timestamp: epoch_secs(),
    }
}

/// Fixed-point milli-unit encoding, rounded to the nearest integer.
pub fn to_milli(value: f64) -> i64 {
    (value * 1000.0).round() as i64
}

/// `s{index}-loki-{normalized name}`.
pub fn metric_name(scaler_index: usize, metric_name: &str) -> String {
    let normalized = normalize_metric_name(&format!("{METRIC_PREFIX}-{metric_name}"));
    format!("s{scaler_index}-{normalized}")
}

/// Replace characters the metrics API rejects in names with `-`.
pub fn normalize_metric_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '.' | ':' | '%' | '(' | ')' | '"' | ' ' | '<' | '>' | '*' | '|' | '?' => '-',
            c => c,
        })
        .collect()
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

//! Query response wire types and reading extraction.

use lokiscale_core::TriggerMetadata;
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::QueryError;

/// Body of an instant query response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryResult {
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub data: QueryData,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryData {
    #[serde(rename = "resultType", default, deserialize_with = "null_as_default")]
    pub result_type: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub result: Vec<Series>,
}

/// One series of a vector result.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Series {
    #[serde(default, deserialize_with = "null_as_default")]
    pub metric: Map<String, Value>,
    /// `[timestamp, "value"]`; elements are kept untyped and checked
    /// explicitly in [`QueryResult::reading`].
    #[serde(default, deserialize_with = "null_as_default")]
    pub value: Vec<Value>,
}

/// Backends send `null` where they mean an empty list or object.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl QueryResult {
    /// Reduce the response to a single reading.
    ///
    /// An empty result or empty value pair honors `ignoreNullValues`; a
    /// value pair whose second element is `null` always reads as zero.
    pub fn reading(&self, metadata: &TriggerMetadata) -> Result<f64, QueryError> {
        let series = match self.data.result.as_slice() {
            [] => return null_reading(metadata, "result"),
            [series] => series,
            many => {
                warn!(query = %metadata.query, count = many.len(), "query returned multiple series");
                return Err(QueryError::Cardinality {
                    query: metadata.query.clone(),
                    count: many.len(),
                });
            }
        };

        match series.value.as_slice() {
            [] => null_reading(metadata, "value list"),
            [_] => Err(QueryError::InsufficientValues {
                query: metadata.query.clone(),
            }),
            [_, sample, ..] => parse_sample(sample),
        }
    }
}

fn null_reading(metadata: &TriggerMetadata, what: &'static str) -> Result<f64, QueryError> {
    if metadata.ignore_null_values {
        debug!(metric = %metadata.metric_name, what, "empty query response treated as zero");
        return Ok(0.0);
    }
    Err(QueryError::NullData {
        metric: metadata.metric_name.clone(),
        what,
    })
}

fn parse_sample(sample: &Value) -> Result<f64, QueryError> {
    let raw = match sample {
        Value::Null => return Ok(0.0),
        Value::String(s) => s,
        other => {
            return Err(QueryError::Parse(format!(
                "sample value must be a string, got {other}"
            )));
        }
    };

    raw.parse::<f64>().map_err(|e| {
        warn!(value = %raw, error = %e, "error converting sample value");
        QueryError::Parse(format!("sample value {raw:?}: {e}"))
    })
}

//! Trigger metadata parser.
//!
//! Validates the string-keyed trigger configuration and produces an
//! immutable [`TriggerMetadata`]. Fields are checked in a fixed order and
//! the first failure is reported.

use std::collections::HashMap;

use tracing::debug;
use url::Url;

use crate::auth::AuthMeta;
use crate::error::{ConfigError, ConfigResult};

pub const SERVER_ADDRESS: &str = "serverAddress";
pub const QUERY: &str = "query";
pub const METRIC_NAME: &str = "metricName";
pub const THRESHOLD: &str = "threshold";
pub const ACTIVATION_THRESHOLD: &str = "activationThreshold";
pub const TENANT_ID: &str = "tenantID";
pub const IGNORE_NULL_VALUES: &str = "ignoreNullValues";
pub const ALLOW_INSECURE_TLS: &str = "allowInsecureTLS";

const DEFAULT_IGNORE_NULL_VALUES: bool = true;

/// Typed trigger configuration, fixed for the lifetime of a scaler.
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerMetadata {
    /// Base address of the query endpoint (http or https).
    pub server_address: Url,
    /// Query expression, passed through untouched.
    pub query: String,
    /// User-facing metric name, used to build the external metric name.
    pub metric_name: String,
    /// Per-replica target value.
    pub threshold: f64,
    /// Reading must be strictly above this to mark the trigger active.
    pub activation_threshold: f64,
    /// Tenant scoping header value for multi-tenant backends.
    pub tenant_id: Option<String>,
    /// Treat an empty result as a zero reading instead of an error.
    pub ignore_null_values: bool,
    /// Skip certificate verification for https endpoints.
    pub allow_insecure_tls: bool,
    /// Credentials attached to each query.
    pub auth: Option<AuthMeta>,
    /// Position of the trigger within its scaled object.
    pub scaler_index: usize,
}

impl TriggerMetadata {
    /// Parse trigger metadata.
    ///
    /// `auth_params` carries credential material already resolved by the
    /// secret subsystem; it is only consulted when `authModes` is set.
    pub fn parse(
        trigger: &HashMap<String, String>,
        auth_params: &HashMap<String, String>,
        scaler_index: usize,
    ) -> ConfigResult<Self> {
        let server_address = parse_server_address(required(trigger, SERVER_ADDRESS)?)?;
        let query = required(trigger, QUERY)?.to_string();
        let metric_name = required(trigger, METRIC_NAME)?.to_string();
        let threshold = parse_float(THRESHOLD, required(trigger, THRESHOLD)?)?;

        // Parsed whenever the key is present, even if empty.
        let activation_threshold = match trigger.get(ACTIVATION_THRESHOLD) {
            Some(raw) => parse_float(ACTIVATION_THRESHOLD, raw)?,
            None => 0.0,
        };

        let tenant_id = optional(trigger, TENANT_ID).map(str::to_string);

        let ignore_null_values = match optional(trigger, IGNORE_NULL_VALUES) {
            Some(raw) => parse_bool(IGNORE_NULL_VALUES, raw)?,
            None => DEFAULT_IGNORE_NULL_VALUES,
        };

        let allow_insecure_tls = match optional(trigger, ALLOW_INSECURE_TLS) {
            Some(raw) => parse_bool(ALLOW_INSECURE_TLS, raw)?,
            None => false,
        };

        let auth = AuthMeta::parse(trigger, auth_params)?;

        debug!(
            server = %server_address,
            metric = %metric_name,
            threshold,
            activation_threshold,
            ignore_null_values,
            "parsed trigger metadata"
        );

        Ok(Self {
            server_address,
            query,
            metric_name,
            threshold,
            activation_threshold,
            tenant_id,
            ignore_null_values,
            allow_insecure_tls,
            auth,
            scaler_index,
        })
    }
}

/// A required key: absent and empty values are both rejected.
fn required<'a>(trigger: &'a HashMap<String, String>, key: &'static str) -> ConfigResult<&'a str> {
    optional(trigger, key).ok_or(ConfigError::Missing(key))
}

fn optional<'a>(trigger: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    trigger
        .get(key)
        .map(String::as_str)
        .filter(|v| !v.is_empty())
}

fn parse_server_address(raw: &str) -> ConfigResult<Url> {
    let url = Url::parse(raw).map_err(|e| ConfigError::invalid(SERVER_ADDRESS, e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::invalid(
            SERVER_ADDRESS,
            format!("unsupported scheme {}", url.scheme()),
        ));
    }
    if url.host_str().is_none() {
        return Err(ConfigError::invalid(SERVER_ADDRESS, "missing host"));
    }
    // Credentials belong in authModes and the auth params.
    if !url.username().is_empty() || url.password().is_some() {
        return Err(ConfigError::invalid(
            SERVER_ADDRESS,
            "credentials in the address are not supported",
        ));
    }
    Ok(url)
}

/// Base-10 float that must be finite.
fn parse_float(field: &'static str, raw: &str) -> ConfigResult<f64> {
    let value = raw
        .parse::<f64>()
        .map_err(|e| ConfigError::invalid(field, format!("{raw:?}: {e}")))?;
    if !value.is_finite() {
        return Err(ConfigError::invalid(field, format!("{raw:?} is not a finite number")));
    }
    Ok(value)
}

/// Only the lowercase literals are accepted.
fn parse_bool(field: &'static str, raw: &str) -> ConfigResult<bool> {
    match raw {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(ConfigError::invalid(
            field,
            format!("{other:?}, please use true or false"),
        )),
    }
}

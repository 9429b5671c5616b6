//! lokiscale-core — trigger metadata and scaling decisions.
//!
//! Turns the raw string-keyed trigger configuration into a typed
//! [`TriggerMetadata`] and maps a numeric reading onto the two outputs the
//! autoscaling controller consumes: an activation flag and an external
//! metric target.
//!
//! # Decision rule
//!
//! ```text
//! active            = reading > activation_threshold   (strict)
//! target_milli      = round(threshold * 1000)
//! metric name       = s{index}-loki-{normalized metricName}
//! ```
//!
//! Milli-unit encoding matches the controller's external metric protocol,
//! which compares quantities in thousandths.

pub mod auth;
pub mod decision;
pub mod error;
pub mod metadata;

pub use auth::{AuthMeta, AuthMode};
pub use decision::{
    decide, ExternalMetricSpec, ExternalMetricValue, MetricTarget, MetricTargetType,
    ScaleDecision,
};
pub use error::{ConfigError, ConfigResult};
pub use metadata::TriggerMetadata;

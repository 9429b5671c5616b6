//! Query-driven scaling signal for one trigger.

use std::collections::HashMap;

use lokiscale_core::decision::{metric_spec, metric_value};
use lokiscale_core::{
    decide, ExternalMetricSpec, ExternalMetricValue, MetricTargetType, ScaleDecision,
    TriggerMetadata,
};
use lokiscale_query::QueryExecutor;
use lokiscale_secrets::{resolve_auth_params, SecretManagerHandler};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::{ScalerError, ScalerResult};

/// Everything needed to build a scaler for one trigger.
#[derive(Debug, Clone, Default)]
pub struct ScalerConfig {
    /// Raw trigger metadata (`serverAddress`, `query`, ...).
    pub trigger_metadata: HashMap<String, String>,
    /// Credential material referenced by `authModes`.
    pub auth_params: HashMap<String, String>,
    /// Position of this trigger within its scaled object.
    pub scaler_index: usize,
    /// Namespace the trigger belongs to; scopes secret lookups.
    pub namespace: String,
    pub metric_type: MetricTargetType,
}

/// Scaler for a Loki-compatible query endpoint.
pub struct LokiScaler {
    metadata: TriggerMetadata,
    metric_type: MetricTargetType,
    executor: QueryExecutor,
    /// Kept for the scaler's lifetime once used to resolve auth params.
    secrets: Option<SecretManagerHandler>,
}

impl LokiScaler {
    /// Build a scaler from static configuration.
    pub fn new(config: &ScalerConfig) -> ScalerResult<Self> {
        let metadata = TriggerMetadata::parse(
            &config.trigger_metadata,
            &config.auth_params,
            config.scaler_index,
        )?;
        let executor = QueryExecutor::new(&metadata)?;

        info!(
            metric = %metadata.metric_name,
            server = %metadata.server_address,
            index = metadata.scaler_index,
            namespace = %config.namespace,
            "loki scaler created"
        );

        Ok(Self {
            metadata,
            metric_type: config.metric_type,
            executor,
            secrets: None,
        })
    }

    /// Build a scaler whose auth params are read from the secret store.
    ///
    /// Values read from the store override same-named static params.
    pub async fn with_secret_manager(
        mut config: ScalerConfig,
        handler: SecretManagerHandler,
        cancel: &CancellationToken,
    ) -> ScalerResult<Self> {
        let resolved = resolve_auth_params(&handler, cancel).await?;
        debug!(params = resolved.len(), "auth params resolved from secret manager");
        config.auth_params.extend(resolved);

        let mut scaler = Self::new(&config)?;
        scaler.secrets = Some(handler);
        Ok(scaler)
    }

    pub fn metadata(&self) -> &TriggerMetadata {
        &self.metadata
    }

    pub fn secret_manager(&self) -> Option<&SecretManagerHandler> {
        self.secrets.as_ref()
    }

    /// The external metric this scaler exposes.
    pub fn metric_spec(&self) -> Vec<ExternalMetricSpec> {
        vec![metric_spec(&self.metadata, self.metric_type)]
    }

    /// Run the query once and return the raw reading.
    pub async fn query(&self, cancel: &CancellationToken) -> ScalerResult<f64> {
        self.executor
            .execute(&self.metadata, cancel)
            .await
            .inspect_err(|e| {
                error!(metric = %self.metadata.metric_name, error = %e, "error executing loki query")
            })
            .map_err(ScalerError::from)
    }

    /// Whether the reading is strictly above the activation threshold.
    pub async fn is_active(&self, cancel: &CancellationToken) -> ScalerResult<bool> {
        Ok(self.evaluate(cancel).await?.active)
    }

    /// Current value of `metric_name`, in milli-units.
    pub async fn get_metrics(
        &self,
        metric_name: &str,
        cancel: &CancellationToken,
    ) -> ScalerResult<Vec<ExternalMetricValue>> {
        let reading = self.query(cancel).await?;
        Ok(vec![metric_value(metric_name, reading)])
    }

    /// One query, both controller outputs.
    pub async fn evaluate(&self, cancel: &CancellationToken) -> ScalerResult<ScaleDecision> {
        let reading = self.query(cancel).await?;
        let decision = decide(reading, &self.metadata, self.metric_type);
        debug!(
            metric = %decision.metric.name,
            reading,
            active = decision.active,
            "trigger evaluated"
        );
        Ok(decision)
    }

    /// Nothing to release: clients are dropped with the scaler.
    pub async fn close(&self) -> ScalerResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lokiscale_core::ConfigError;

    fn config() -> ScalerConfig {
        ScalerConfig {
            trigger_metadata: [
                ("serverAddress", "http://loki:3100"),
                ("query", "sum(rate({app=\"api\"}[1m]))"),
                ("metricName", "api/errors"),
                ("threshold", "2.5"),
            ]
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
            scaler_index: 1,
            ..Default::default()
        }
    }

    #[test]
    fn metric_spec_uses_index_and_milli_target() {
        let scaler = LokiScaler::new(&config()).unwrap();
        let specs = scaler.metric_spec();
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].name, "s1-loki-api-errors");
        assert_eq!(specs[0].target.target_milli_value, 2500);
        assert_eq!(specs[0].target.target_type, MetricTargetType::AverageValue);
    }

    #[test]
    fn config_errors_surface() {
        let mut cfg = config();
        cfg.trigger_metadata.remove("threshold");
        match LokiScaler::new(&cfg) {
            Err(ScalerError::Config(ConfigError::Missing(field))) => assert_eq!(field, "threshold"),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("expected an error"),
        }
    }

    #[tokio::test]
    async fn close_is_a_noop() {
        let scaler = LokiScaler::new(&config()).unwrap();
        assert!(scaler.close().await.is_ok());
        assert!(scaler.secret_manager().is_none());
    }
}

//! `check` and `watch` commands.

use std::sync::Arc;
use std::time::Duration;

use lokiscale_core::ScaleDecision;
use lokiscale_scaler::{LokiScaler, ScalerResult};
use lokiscale_secrets::{
    DirSecretLookup, MemorySecretLookup, RestClientFactory, SecretLookup, SecretManagerHandler,
};
use serde::Serialize;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::{DaemonConfig, TriggerConfig};

/// One line of `check` output.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum CheckLine {
    #[serde(rename_all = "camelCase")]
    Ok {
        trigger: String,
        metric: String,
        active: bool,
        reading: f64,
        target_milli_value: i64,
    },
    Failed {
        trigger: String,
        error: String,
    },
}

impl CheckLine {
    pub fn is_failure(&self) -> bool {
        matches!(self, CheckLine::Failed { .. })
    }
}

/// Shared collaborators for building scalers.
struct Environment {
    lookup: Arc<dyn SecretLookup>,
    factory: Arc<RestClientFactory>,
}

impl Environment {
    fn new(config: &DaemonConfig) -> Self {
        let lookup: Arc<dyn SecretLookup> = match &config.secrets_dir {
            Some(dir) => Arc::new(DirSecretLookup::new(dir.clone())),
            None => Arc::new(MemorySecretLookup::new()),
        };
        let mut factory =
            RestClientFactory::new().with_insecure_tls(config.secret_manager_insecure_tls);
        if let Some(endpoint) = &config.secret_manager_endpoint {
            factory = factory.with_endpoint(endpoint.clone());
        }
        Self {
            lookup,
            factory: Arc::new(factory),
        }
    }
}

async fn build_scaler(
    env: &Environment,
    namespace: &str,
    index: usize,
    trigger: &TriggerConfig,
    cancel: &CancellationToken,
) -> anyhow::Result<LokiScaler> {
    let scaler_config = trigger.scaler_config(index, namespace)?;
    let scaler = match &trigger.secret_manager {
        Some(spec) => {
            let handler = SecretManagerHandler::new(
                spec.clone(),
                namespace,
                env.lookup.clone(),
                env.factory.clone(),
            );
            LokiScaler::with_secret_manager(scaler_config, handler, cancel).await?
        }
        None => LokiScaler::new(&scaler_config)?,
    };
    Ok(scaler)
}

/// Build every trigger, keeping failures alongside their names.
async fn build_all(
    config: &DaemonConfig,
    cancel: &CancellationToken,
) -> Vec<(String, anyhow::Result<LokiScaler>)> {
    let env = Environment::new(config);
    let mut built = Vec::with_capacity(config.triggers.len());
    for (index, trigger) in config.triggers.iter().enumerate() {
        let result = build_scaler(&env, &config.namespace, index, trigger, cancel).await;
        if let Err(e) = &result {
            error!(trigger = %trigger.name, error = %e, "failed to build trigger");
        }
        built.push((trigger.name.clone(), result));
    }
    built
}

/// Build and evaluate every trigger once.
pub async fn check(config: &DaemonConfig, cancel: &CancellationToken) -> Vec<CheckLine> {
    let mut lines = Vec::with_capacity(config.triggers.len());
    for (trigger, built) in build_all(config, cancel).await {
        let line = match built {
            Ok(scaler) => {
                let outcome = scaler.evaluate(cancel).await;
                let _ = scaler.close().await;
                match outcome {
                    Ok(decision) => CheckLine::Ok {
                        trigger,
                        metric: decision.metric.name,
                        active: decision.active,
                        reading: decision.reading,
                        target_milli_value: decision.metric.target.target_milli_value,
                    },
                    Err(e) => CheckLine::Failed {
                        trigger,
                        error: e.to_string(),
                    },
                }
            }
            Err(e) => CheckLine::Failed {
                trigger,
                error: format!("{e:#}"),
            },
        };
        lines.push(line);
    }
    lines
}

/// Evaluate every trigger each `interval` until `shutdown` fires.
///
/// A trigger evaluation that outlives the interval is cancelled; a failed
/// evaluation leaves the metric unavailable for that tick and the loop
/// carries on.
pub async fn watch(
    config: &DaemonConfig,
    interval: Duration,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let mut scalers = Vec::new();
    for (name, built) in build_all(config, &shutdown).await {
        if let Ok(scaler) = built {
            scalers.push((name, scaler));
        }
    }
    if scalers.is_empty() {
        anyhow::bail!("no trigger could be built");
    }

    info!(
        triggers = scalers.len(),
        interval_secs = interval.as_secs(),
        "watch started"
    );

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("watch shutting down");
                break;
            }
            _ = ticker.tick() => {
                poll(&scalers, interval, &shutdown).await;
            }
        }
    }

    for (_, scaler) in &scalers {
        let _ = scaler.close().await;
    }
    Ok(())
}

async fn poll(scalers: &[(String, LokiScaler)], deadline: Duration, shutdown: &CancellationToken) {
    for (trigger, scaler) in scalers {
        match evaluate_with_deadline(scaler, deadline, shutdown).await {
            Ok(decision) => info!(
                trigger = %trigger,
                metric = %decision.metric.name,
                reading = decision.reading,
                active = decision.active,
                "poll"
            ),
            Err(e) if e.is_cancelled() && shutdown.is_cancelled() => break,
            Err(e) => warn!(trigger = %trigger, error = %e, "metric unavailable"),
        }
    }
}

/// One evaluation under its own deadline, cancelled early by `shutdown`.
async fn evaluate_with_deadline(
    scaler: &LokiScaler,
    deadline: Duration,
    shutdown: &CancellationToken,
) -> ScalerResult<ScaleDecision> {
    let cancel = shutdown.child_token();
    let timer = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            tokio::time::sleep(deadline).await;
            cancel.cancel();
        }
    });

    let outcome = scaler.evaluate(&cancel).await;
    timer.abort();
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::net::SocketAddr;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    /// Answers every request with `body`.
    async fn mock_query_server(body: &'static str) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut buf = [0u8; 4096];
                    let _ = stream.read(&mut buf).await;
                    let response = format!(
                        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                        body.len()
                    );
                    let _ = stream.write_all(response.as_bytes()).await;
                    let _ = stream.shutdown().await;
                });
            }
        });
        addr
    }

    /// Accepts connections and never answers.
    async fn stalled_server() -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });
        addr
    }

    fn trigger(name: &str, addr: SocketAddr, threshold: &str) -> TriggerConfig {
        let metadata: HashMap<String, String> = [
            ("serverAddress", format!("http://{addr}")),
            ("query", "sum(rate({app=\"api\"}[1m]))".to_string()),
            ("metricName", name.to_string()),
            ("threshold", threshold.to_string()),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
        TriggerConfig {
            name: name.to_string(),
            metric_type: None,
            metadata,
            auth_params: HashMap::new(),
            secret_manager: None,
        }
    }

    fn daemon_config(triggers: Vec<TriggerConfig>) -> DaemonConfig {
        DaemonConfig {
            namespace: "apps".into(),
            secrets_dir: None,
            secret_manager_endpoint: None,
            secret_manager_insecure_tls: false,
            triggers,
        }
    }

    const READING: &str = r#"{"status":"success","data":{"resultType":"vector","result":[{"metric":{},"value":[1700000000,"3"]}]}}"#;

    #[tokio::test]
    async fn test_check_reports_each_trigger() {
        let addr = mock_query_server(READING).await;
        let mut broken = trigger("broken", addr, "5");
        broken.metadata.remove("query");
        let config = daemon_config(vec![trigger("api", addr, "2"), broken]);

        let lines = check(&config, &CancellationToken::new()).await;
        assert_eq!(lines.len(), 2);

        let ok = serde_json::to_value(&lines[0]).unwrap();
        assert_eq!(ok["trigger"], "api");
        assert_eq!(ok["metric"], "s0-loki-api");
        assert_eq!(ok["active"], true);
        assert_eq!(ok["reading"], 3.0);
        assert_eq!(ok["targetMilliValue"], 2000);
        assert!(!lines[0].is_failure());

        assert!(lines[1].is_failure());
        let failed = serde_json::to_value(&lines[1]).unwrap();
        assert_eq!(failed["trigger"], "broken");
        assert!(failed["error"].as_str().unwrap().contains("query"));
    }

    #[tokio::test]
    async fn test_missing_static_credentials_fail_the_trigger() {
        let addr = mock_query_server(READING).await;
        let mut t = trigger("api", addr, "2");
        t.secret_manager = Some(lokiscale_secrets::SecretManagerSpec {
            credentials: Some(lokiscale_secrets::SecretKeyRef {
                name: "gcp-key".into(),
                key: "creds.json".into(),
            }),
            secrets: vec![lokiscale_secrets::SecretTarget {
                parameter: "bearerToken".into(),
                id: "loki-token".into(),
                version: "latest".into(),
            }],
            ..Default::default()
        });

        let lines = check(&daemon_config(vec![t]), &CancellationToken::new()).await;
        assert!(lines[0].is_failure());
    }

    #[test]
    fn test_environment_carries_secret_manager_tls_flag() {
        let mut config = daemon_config(Vec::new());
        assert!(!Environment::new(&config).factory.allows_insecure_tls());

        config.secret_manager_insecure_tls = true;
        assert!(Environment::new(&config).factory.allows_insecure_tls());
    }

    #[tokio::test]
    async fn test_stalled_trigger_does_not_starve_the_next() {
        let stalled = trigger("stalled", stalled_server().await, "2")
            .scaler_config(0, "apps")
            .unwrap();
        let healthy = trigger("api", mock_query_server(READING).await, "2")
            .scaler_config(1, "apps")
            .unwrap();
        let stalled = LokiScaler::new(&stalled).unwrap();
        let healthy = LokiScaler::new(&healthy).unwrap();
        let shutdown = CancellationToken::new();
        let deadline = Duration::from_millis(100);

        let err = evaluate_with_deadline(&stalled, deadline, &shutdown)
            .await
            .unwrap_err();
        assert!(err.is_cancelled(), "{err}");
        assert!(!shutdown.is_cancelled());

        let decision = evaluate_with_deadline(&healthy, deadline, &shutdown)
            .await
            .unwrap();
        assert_eq!(decision.metric.name, "s1-loki-api");
        assert_eq!(decision.reading, 3.0);
    }

    #[tokio::test]
    async fn test_shutdown_cancels_evaluation_before_deadline() {
        let stalled = trigger("stalled", stalled_server().await, "2")
            .scaler_config(0, "apps")
            .unwrap();
        let stalled = LokiScaler::new(&stalled).unwrap();
        let shutdown = CancellationToken::new();

        let stop = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            stop.cancel();
        });

        let err = tokio::time::timeout(
            Duration::from_secs(5),
            evaluate_with_deadline(&stalled, Duration::from_secs(60), &shutdown),
        )
        .await
        .expect("shutdown should cancel the evaluation")
        .unwrap_err();
        assert!(err.is_cancelled(), "{err}");
    }

    #[tokio::test]
    async fn test_watch_stops_on_shutdown() {
        let addr = mock_query_server(READING).await;
        let config = daemon_config(vec![trigger("api", addr, "2")]);
        let shutdown = CancellationToken::new();

        let stop = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            stop.cancel();
        });

        tokio::time::timeout(
            Duration::from_secs(5),
            watch(&config, Duration::from_millis(20), shutdown),
        )
        .await
        .expect("watch should stop")
        .unwrap();
    }

    #[tokio::test]
    async fn test_watch_fails_without_buildable_triggers() {
        let mut t = trigger("api", "127.0.0.1:1".parse().unwrap(), "2");
        t.metadata.remove("threshold");
        let result = watch(&daemon_config(vec![t]), Duration::from_secs(1), CancellationToken::new()).await;
        assert!(result.is_err());
    }
}

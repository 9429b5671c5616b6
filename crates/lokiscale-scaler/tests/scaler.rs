//! LokiScaler end to end: mock query endpoint, optional fake secret store.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use lokiscale_core::MetricTargetType;
use lokiscale_query::QueryError;
use lokiscale_scaler::error::ScalerError;
use lokiscale_scaler::{LokiScaler, ScalerConfig};
use lokiscale_secrets::client::checksum;
use lokiscale_secrets::{
    ClientFactory, CredentialError, MemorySecretLookup, SecretManagerClient, SecretManagerHandler,
    SecretManagerSpec, SecretPayload, SecretTarget,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

// ── MockQueryServer ──────────────────────────────────────────────────

struct MockQueryServer {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<String>>>,
}

impl MockQueryServer {
    async fn start(body: &'static str) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let recorded = requests.clone();

        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let recorded = recorded.clone();
                tokio::spawn(async move {
                    let mut buf = Vec::new();
                    let mut chunk = [0u8; 1024];
                    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                        match stream.read(&mut chunk).await {
                            Ok(0) | Err(_) => break,
                            Ok(n) => buf.extend_from_slice(&chunk[..n]),
                        }
                    }
                    recorded
                        .lock()
                        .unwrap()
                        .push(String::from_utf8_lossy(&buf).into_owned());

                    let response = format!(
                        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                        body.len()
                    );
                    let _ = stream.write_all(response.as_bytes()).await;
                    let _ = stream.shutdown().await;
                });
            }
        });

        Self { addr, requests }
    }

    fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn last_request(&self) -> String {
        self.requests.lock().unwrap().last().cloned().unwrap_or_default()
    }
}

fn config_for(addr: SocketAddr, extra: &[(&str, &str)]) -> ScalerConfig {
    let mut trigger_metadata: HashMap<String, String> = [
        ("serverAddress", format!("http://{addr}")),
        ("query", r#"sum(count_over_time({app="api"} |= "error" [1m]))"#.to_string()),
        ("metricName", "api-errors".to_string()),
        ("threshold", "1".to_string()),
        ("activationThreshold", "1".to_string()),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect();
    for (k, v) in extra {
        trigger_metadata.insert(k.to_string(), v.to_string());
    }
    ScalerConfig {
        trigger_metadata,
        ..Default::default()
    }
}

const READING_1_5: &str = r#"{"status":"success","data":{"resultType":"vector","result":[{"metric":{},"value":[1700000000,"1.5"]}]}}"#;
const EMPTY: &str = r#"{"status":"success","data":{"resultType":"vector","result":[]}}"#;
const TWO_SERIES: &str = r#"{"status":"success","data":{"resultType":"vector","result":[{"metric":{"a":"1"},"value":[1,"1"]},{"metric":{"a":"2"},"value":[1,"2"]}]}}"#;
const NULL_VALUE: &str = r#"{"status":"success","data":{"resultType":"vector","result":[{"metric":{},"value":[1700000000,null]}]}}"#;

// ── Fake secret store ────────────────────────────────────────────────

struct FakeStore {
    values: HashMap<String, String>,
}

#[async_trait]
impl SecretManagerClient for FakeStore {
    async fn access_secret_version(
        &self,
        name: &str,
        _cancel: &CancellationToken,
    ) -> Result<SecretPayload, CredentialError> {
        let value = self.values.get(name).ok_or_else(|| CredentialError::Access {
            name: name.to_string(),
            reason: "not found".into(),
        })?;
        Ok(SecretPayload {
            data: value.as_bytes().to_vec(),
            data_crc32c: Some(checksum(value.as_bytes())),
        })
    }
}

struct FakeFactory {
    client: Arc<FakeStore>,
}

#[async_trait]
impl ClientFactory for FakeFactory {
    async fn from_credentials_json(
        &self,
        _json: &[u8],
    ) -> Result<Arc<dyn SecretManagerClient>, CredentialError> {
        Err(CredentialError::Config("static keys not used here".into()))
    }

    async fn ambient(&self) -> Result<Arc<dyn SecretManagerClient>, CredentialError> {
        Ok(self.client.clone())
    }
}

fn secret_handler(values: &[(&str, &str)], targets: Vec<SecretTarget>) -> SecretManagerHandler {
    let spec = SecretManagerSpec {
        identity_provider: Some("gcp".into()),
        project_id: Some("acme".into()),
        secrets: targets,
        ..Default::default()
    };
    let client = Arc::new(FakeStore {
        values: values
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    });
    SecretManagerHandler::new(
        spec,
        "apps",
        Arc::new(MemorySecretLookup::new()),
        Arc::new(FakeFactory { client }),
    )
}

// ── Tests ────────────────────────────────────────────────────────────

#[tokio::test]
async fn reading_above_activation_is_active_with_milli_target() {
    let server = MockQueryServer::start(READING_1_5).await;
    let scaler = LokiScaler::new(&config_for(server.addr, &[])).unwrap();
    let cancel = CancellationToken::new();

    let decision = scaler.evaluate(&cancel).await.unwrap();
    assert_eq!(decision.reading, 1.5);
    assert!(decision.active);
    assert_eq!(decision.metric.name, "s0-loki-api-errors");
    assert_eq!(decision.metric.target.target_milli_value, 1000);

    assert!(scaler.is_active(&cancel).await.unwrap());

    let values = scaler.get_metrics("s0-loki-api-errors", &cancel).await.unwrap();
    assert_eq!(values.len(), 1);
    assert_eq!(values[0].name, "s0-loki-api-errors");
    assert_eq!(values[0].milli_value, 1500);
}

#[tokio::test]
async fn empty_result_is_zero_and_inactive_by_default() {
    let server = MockQueryServer::start(EMPTY).await;
    let scaler = LokiScaler::new(&config_for(server.addr, &[])).unwrap();

    let decision = scaler.evaluate(&CancellationToken::new()).await.unwrap();
    assert_eq!(decision.reading, 0.0);
    assert!(!decision.active);
}

#[tokio::test]
async fn multiple_series_is_cardinality_error() {
    let server = MockQueryServer::start(TWO_SERIES).await;
    let scaler = LokiScaler::new(&config_for(server.addr, &[])).unwrap();

    let err = scaler.evaluate(&CancellationToken::new()).await.unwrap_err();
    assert!(
        matches!(err, ScalerError::Query(QueryError::Cardinality { count: 2, .. })),
        "{err}"
    );
}

#[tokio::test]
async fn null_value_element_reads_as_zero() {
    let server = MockQueryServer::start(NULL_VALUE).await;
    let scaler = LokiScaler::new(&config_for(server.addr, &[])).unwrap();

    let values = scaler
        .get_metrics("s0-loki-api-errors", &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(values[0].milli_value, 0);
}

#[tokio::test]
async fn metric_spec_does_not_query() {
    let server = MockQueryServer::start(READING_1_5).await;
    let mut config = config_for(server.addr, &[("threshold", "0.25")]);
    config.metric_type = MetricTargetType::Value;
    config.scaler_index = 3;
    let scaler = LokiScaler::new(&config).unwrap();

    let specs = scaler.metric_spec();
    assert_eq!(specs[0].name, "s3-loki-api-errors");
    assert_eq!(specs[0].target.target_milli_value, 250);
    assert_eq!(specs[0].target.target_type, MetricTargetType::Value);
    assert_eq!(server.request_count(), 0);
}

#[tokio::test]
async fn auth_params_come_from_secret_store() {
    let server = MockQueryServer::start(READING_1_5).await;
    let mut config = config_for(server.addr, &[("authModes", "bearer")]);
    config.auth_params.insert("bearerToken".into(), "stale".into());

    let handler = secret_handler(
        &[("projects/acme/secrets/loki-token/versions/latest", "fresh-token")],
        vec![SecretTarget {
            parameter: "bearerToken".into(),
            id: "loki-token".into(),
            version: "latest".into(),
        }],
    );

    let scaler = LokiScaler::with_secret_manager(config, handler, &CancellationToken::new())
        .await
        .unwrap();
    assert!(scaler.secret_manager().is_some_and(|h| h.is_initialized()));

    scaler.evaluate(&CancellationToken::new()).await.unwrap();
    let head = server.last_request().to_ascii_lowercase();
    assert!(head.contains("authorization: bearer fresh-token"), "{head}");
}

#[tokio::test]
async fn missing_secret_fails_construction() {
    let server = MockQueryServer::start(READING_1_5).await;
    let config = config_for(server.addr, &[("authModes", "bearer")]);
    let handler = secret_handler(
        &[],
        vec![SecretTarget {
            parameter: "bearerToken".into(),
            id: "loki-token".into(),
            version: "latest".into(),
        }],
    );

    let err = LokiScaler::with_secret_manager(config, handler, &CancellationToken::new())
        .await
        .err()
        .expect("construction should fail");
    assert!(
        matches!(err, ScalerError::Credential(CredentialError::Access { .. })),
        "{err}"
    );
}

//! Metric query executor.

use lokiscale_core::TriggerMetadata;
use lokiscale_http::HttpClient;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};
use url::Url;

use crate::error::QueryError;
use crate::response::QueryResult;

/// Instant query path appended to the configured server address.
pub const QUERY_PATH: &str = "/loki/api/v1/query";

/// Header carrying the tenant for multi-tenant backends.
pub const TENANT_HEADER: &str = "X-Scope-OrgID";

/// Runs the configured query; owned by a single scaler.
#[derive(Clone)]
pub struct QueryExecutor {
    client: HttpClient,
}

impl QueryExecutor {
    /// Build an executor whose TLS settings follow the trigger metadata.
    pub fn new(metadata: &TriggerMetadata) -> Result<Self, QueryError> {
        Ok(Self {
            client: HttpClient::new(metadata.allow_insecure_tls)?,
        })
    }

    /// Perform one query attempt and return the reading.
    pub async fn execute(
        &self,
        metadata: &TriggerMetadata,
        cancel: &CancellationToken,
    ) -> Result<f64, QueryError> {
        let url = query_url(metadata);

        let mut headers = Vec::with_capacity(2);
        if let Some(auth) = &metadata.auth {
            headers.push(("authorization", auth.authorization_header()));
        }
        if let Some(tenant) = &metadata.tenant_id {
            headers.push((TENANT_HEADER, tenant.clone()));
        }

        let response = self
            .client
            .get(url.as_str(), &headers, cancel)
            .await
            .inspect_err(|e| warn!(metric = %metadata.metric_name, error = %e, "query request failed"))?;

        if !response.is_success() {
            let err = QueryError::Response {
                status: response.status.as_u16(),
                body: response.body_text(),
            };
            error!(metric = %metadata.metric_name, status = response.status.as_u16(), "query api returned error");
            return Err(err);
        }

        let result: QueryResult = serde_json::from_slice(&response.body).map_err(|e| {
            error!(metric = %metadata.metric_name, error = %e, "failed to decode query response");
            QueryError::Parse(e.to_string())
        })?;

        let reading = result.reading(metadata)?;
        debug!(metric = %metadata.metric_name, reading, "query executed");
        Ok(reading)
    }
}

/// Query endpoint for a trigger: server address + [`QUERY_PATH`] with the
/// query expression as the only query-string parameter.
pub fn query_url(metadata: &TriggerMetadata) -> Url {
    let mut url = metadata.server_address.clone();
    let base = url.path().trim_end_matches('/').to_string();
    url.set_path(&format!("{base}{QUERY_PATH}"));
    url.set_query(None);
    url.set_fragment(None);
    url.query_pairs_mut().append_pair("query", &metadata.query);
    url
}

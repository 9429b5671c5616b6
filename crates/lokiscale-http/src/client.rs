//! Single-shot HTTP client.

use bytes::Bytes;
use http::header::{HOST, USER_AGENT};
use http::{HeaderValue, Request, StatusCode, Uri};
use http_body_util::{BodyExt, Full};
use hyper_util::rt::TokioIo;
use rustls::pki_types::ServerName;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{TransportError, TransportResult};
use crate::tls::TlsConfig;

const CLIENT_USER_AGENT: &str = concat!("lokiscale/", env!("CARGO_PKG_VERSION"));

/// A fully collected HTTP response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub body: Bytes,
}

impl HttpResponse {
    /// Status in the inclusive 200–299 range.
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Body decoded as UTF-8, replacing invalid sequences.
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// HTTP client owned by one scaler or secret-store client.
#[derive(Clone)]
pub struct HttpClient {
    tls: TlsConfig,
}

impl HttpClient {
    /// Create a client; `allow_insecure_tls` disables certificate checks.
    pub fn new(allow_insecure_tls: bool) -> TransportResult<Self> {
        Ok(Self {
            tls: TlsConfig::for_insecure_flag(allow_insecure_tls)?,
        })
    }

    /// Issue a GET request with the given extra headers.
    pub async fn get(
        &self,
        uri: &str,
        headers: &[(&str, String)],
        cancel: &CancellationToken,
    ) -> TransportResult<HttpResponse> {
        let mut builder = Request::get(uri);
        for (name, value) in headers {
            builder = builder.header(*name, value.as_str());
        }
        let request = builder
            .body(Full::new(Bytes::new()))
            .map_err(|e| TransportError::InvalidUri(format!("{uri}: {e}")))?;
        self.send(request, cancel).await
    }

    /// Issue a POST request carrying `body` as `content_type`.
    pub async fn post(
        &self,
        uri: &str,
        content_type: &str,
        body: impl Into<Bytes>,
        cancel: &CancellationToken,
    ) -> TransportResult<HttpResponse> {
        let request = Request::post(uri)
            .header(http::header::CONTENT_TYPE, content_type)
            .body(Full::new(body.into()))
            .map_err(|e| TransportError::InvalidUri(format!("{uri}: {e}")))?;
        self.send(request, cancel).await
    }

    /// Perform one request/response exchange.
    ///
    /// Returns [`TransportError::Cancelled`] as soon as `cancel` fires; the
    /// in-flight connection is dropped.
    pub async fn send(
        &self,
        request: Request<Full<Bytes>>,
        cancel: &CancellationToken,
    ) -> TransportResult<HttpResponse> {
        let log_uri = request_uri_for_log(&request);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(uri = %log_uri, "request cancelled");
                Err(TransportError::Cancelled)
            }
            result = self.execute(request) => result,
        }
    }

    async fn execute(&self, mut request: Request<Full<Bytes>>) -> TransportResult<HttpResponse> {
        let uri = request.uri().clone();
        let https = match uri.scheme_str() {
            Some("https") => true,
            Some("http") => false,
            _ => return Err(TransportError::InvalidUri(uri.to_string())),
        };
        let authority = uri
            .authority()
            .ok_or_else(|| TransportError::InvalidUri(uri.to_string()))?
            .clone();
        let host = authority
            .host()
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_string();
        let port = authority.port_u16().unwrap_or(if https { 443 } else { 80 });

        // HTTP/1.1 requests go out in origin form.
        let origin: Uri = uri
            .path_and_query()
            .map(|p| p.as_str())
            .unwrap_or("/")
            .parse()
            .map_err(|e| TransportError::InvalidUri(format!("{uri}: {e}")))?;
        *request.uri_mut() = origin;

        let headers = request.headers_mut();
        if !headers.contains_key(HOST) {
            let value = HeaderValue::from_str(&host_header(&host, authority.port_u16()))
                .map_err(|e| TransportError::InvalidUri(format!("{uri}: {e}")))?;
            headers.insert(HOST, value);
        }
        headers
            .entry(USER_AGENT)
            .or_insert(HeaderValue::from_static(CLIENT_USER_AGENT));

        let stream = TcpStream::connect((host.as_str(), port))
            .await
            .map_err(|e| TransportError::Connect {
                addr: format!("{host}:{port}"),
                reason: e.to_string(),
            })?;

        if https {
            let server_name = ServerName::try_from(host.clone()).map_err(|e| TransportError::Tls {
                host: host.clone(),
                reason: e.to_string(),
            })?;
            let connector = TlsConnector::from(self.tls.client_config.clone());
            let tls_stream = connector
                .connect(server_name, stream)
                .await
                .map_err(|e| TransportError::Tls {
                    host: host.clone(),
                    reason: e.to_string(),
                })?;
            exchange(TokioIo::new(tls_stream), request, &uri).await
        } else {
            exchange(TokioIo::new(stream), request, &uri).await
        }
    }
}

async fn exchange<I>(
    io: I,
    request: Request<Full<Bytes>>,
    uri: &Uri,
) -> TransportResult<HttpResponse>
where
    I: hyper::rt::Read + hyper::rt::Write + Unpin + Send + 'static,
{
    let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
        .await
        .map_err(|e| TransportError::Http(format!("handshake: {e}")))?;

    // Drive the connection in the background.
    tokio::spawn(async move {
        if let Err(e) = conn.await {
            debug!(error = %e, "connection closed with error");
        }
    });

    let response = sender
        .send_request(request)
        .await
        .map_err(|e| TransportError::Http(e.to_string()))?;

    let status = response.status();
    let body = response
        .into_body()
        .collect()
        .await
        .map_err(|e| TransportError::Http(format!("reading body: {e}")))?
        .to_bytes();

    debug!(%uri, %status, bytes = body.len(), "http exchange complete");
    Ok(HttpResponse { status, body })
}

/// `host[:port]` without userinfo; IPv6 literals keep their brackets.
fn host_header(host: &str, port: Option<u16>) -> String {
    let host = if host.contains(':') {
        format!("[{host}]")
    } else {
        host.to_string()
    };
    match port {
        Some(port) => format!("{host}:{port}"),
        None => host,
    }
}

fn request_uri_for_log(request: &Request<Full<Bytes>>) -> String {
    // Query strings and userinfo may carry credentials; log only host and path.
    let uri = request.uri();
    let host = uri
        .host()
        .map(|h| host_header(h.trim_start_matches('[').trim_end_matches(']'), uri.port_u16()))
        .unwrap_or_default();
    format!("{}://{host}{}", uri.scheme_str().unwrap_or("http"), uri.path())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rejects_non_http_scheme() {
        let client = HttpClient::new(false).unwrap();
        let err = client
            .get("ftp://example.com/file", &[], &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::InvalidUri(_)));
    }

    #[tokio::test]
    async fn already_cancelled_token_short_circuits() {
        let client = HttpClient::new(false).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = client
            .get("http://127.0.0.1:9/never", &[], &cancel)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }

    #[test]
    fn host_header_is_host_and_port_only() {
        assert_eq!(host_header("loki", Some(3100)), "loki:3100");
        assert_eq!(host_header("loki.example.com", None), "loki.example.com");
        assert_eq!(host_header("::1", Some(3100)), "[::1]:3100");
        assert_eq!(host_header("2001:db8::1", None), "[2001:db8::1]");
    }

    #[test]
    fn log_uri_drops_query() {
        let request = Request::get("http://loki:3100/loki/api/v1/query?query=secret")
            .body(Full::new(Bytes::new()))
            .unwrap();
        assert_eq!(request_uri_for_log(&request), "http://loki:3100/loki/api/v1/query");

        let request = Request::get("http://reader:pw@loki:3100/ready")
            .body(Full::new(Bytes::new()))
            .unwrap();
        assert_eq!(request_uri_for_log(&request), "http://loki:3100/ready");
    }

    #[test]
    fn response_success_range() {
        let ok = HttpResponse {
            status: StatusCode::NO_CONTENT,
            body: Bytes::new(),
        };
        let bad = HttpResponse {
            status: StatusCode::BAD_GATEWAY,
            body: Bytes::from_static(b"upstream \xffdown"),
        };
        assert!(ok.is_success());
        assert!(!bad.is_success());
        assert!(bad.body_text().starts_with("upstream"));
    }
}

//! lokiscale-http — the transport used for metric queries and secret reads.
//!
//! Every request opens its own connection, performs one HTTP/1.1 exchange,
//! and collects the full body. There is no pooling, retry, or internal
//! timeout: the caller's [`CancellationToken`](tokio_util::sync::CancellationToken)
//! is the only way a request ends early, and cancellation surfaces as
//! [`TransportError::Cancelled`].
//!
//! ```text
//! HttpClient::send(request, cancel)
//!   ├── TcpStream::connect(host:port)
//!   ├── [https] tokio-rustls handshake (verified or insecure TlsConfig)
//!   ├── hyper http1 handshake + send_request
//!   └── collect body → HttpResponse { status, body }
//! ```

pub mod client;
pub mod error;
pub mod tls;

pub use client::{HttpClient, HttpResponse};
pub use error::{TransportError, TransportResult};
pub use tls::TlsConfig;

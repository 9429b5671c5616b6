//! lokiscale-scaler — one trigger, one scaler.
//!
//! A [`LokiScaler`] is built once from string-keyed trigger configuration
//! and polled by an external loop. Each poll runs exactly one query and maps
//! the reading onto the controller's outputs:
//!
//! ```text
//! ScalerConfig ──parse──▶ TriggerMetadata (immutable)
//!       │                        │
//!       └─ secret targets ─▶ auth params (resolved once at build)
//!
//! poll: QueryExecutor::execute ─▶ reading ─▶ decide() ─▶ ScaleDecision
//! ```
//!
//! Scalers share nothing with each other; each owns its HTTP client and,
//! when configured, its secret-store handler.

pub mod error;
pub mod scaler;

pub use error::{ScalerError, ScalerResult};
pub use scaler::{LokiScaler, ScalerConfig};

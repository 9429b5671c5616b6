//! lokiscale-query — metric query executor.
//!
//! Issues one instant query per poll and reduces the response to a single
//! reading. No retries: a failed attempt is returned to the caller, who
//! decides whether to poll again.
//!
//! # Result shape rules
//!
//! ```text
//! 0 series                      → 0 if ignoreNullValues, else NullData
//! >1 series                     → Cardinality (always)
//! 1 series, empty value pair    → 0 if ignoreNullValues, else NullData
//! 1 series, one element         → InsufficientValues (always)
//! 1 series, value[1] == null    → 0 (always)
//! 1 series, value[1] == "1.5"   → 1.5, unparsable string → Parse
//! ```

pub mod error;
pub mod executor;
pub mod response;

pub use error::QueryError;
pub use executor::{query_url, QueryExecutor, QUERY_PATH, TENANT_HEADER};
pub use response::{QueryData, QueryResult, Series};

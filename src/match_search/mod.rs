//! Candidate search on the secondary streaming service.

pub(crate) mod api_types;
mod client;
mod client_id;
mod models;
mod retry_policy;

pub use client::{MatchSearcher, SoundCloudSearchClient};
pub use client_id::{
    resolver_from_settings, ClientIdResolver, FixedClientIdResolver, WebBundleClientIdResolver,
};
pub use models::{MatchCandidate, SearchOutcome};
pub use retry_policy::RetryPolicy;

use thiserror::Error;

/// Failure of a single search attempt.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("could not resolve client id: {0}")]
    ClientId(String),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("search service returned status {0}")]
    Status(u16),

    #[error("invalid search response: {0}")]
    InvalidResponse(String),
}

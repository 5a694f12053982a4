//! Keyword search against the secondary service, with retries.

use super::api_types::SearchResponse;
use super::client_id::resolver_from_settings;
use super::{ClientIdResolver, MatchCandidate, RetryPolicy, SearchError, SearchOutcome};
use crate::config::SearchSettings;
use crate::server::metrics;
use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use tracing::{debug, warn};

#[async_trait]
pub trait MatchSearcher: Send + Sync {
    /// Search for tracks matching `title` and `artist`. Never fails: running out
    /// of attempts is reported as [`SearchOutcome::Exhausted`].
    async fn search(&self, title: &str, artist: &str, limit: usize) -> SearchOutcome;
}

pub struct SoundCloudSearchClient {
    client: Client,
    api_base_url: String,
    resolver: Arc<dyn ClientIdResolver>,
    retry_policy: RetryPolicy,
}

impl SoundCloudSearchClient {
    pub fn new(
        client: Client,
        api_base_url: impl Into<String>,
        resolver: Arc<dyn ClientIdResolver>,
        retry_policy: RetryPolicy,
    ) -> Self {
        Self {
            client,
            api_base_url: api_base_url.into(),
            resolver,
            retry_policy,
        }
    }

    pub fn from_settings(settings: &SearchSettings) -> Result<Self> {
        let client = Client::builder().timeout(settings.timeout).build()?;
        let resolver = resolver_from_settings(&client, settings);
        Ok(Self::new(
            client,
            settings.api_base_url.clone(),
            resolver,
            RetryPolicy::new(settings),
        ))
    }

    async fn attempt(
        &self,
        title: &str,
        artist: &str,
        limit: usize,
    ) -> Result<Vec<MatchCandidate>, SearchError> {
        let client_id = self.resolver.resolve().await?;
        let url = format!("{}/search/tracks", self.api_base_url);
        let query = format!("{} {}", title, artist);
        let limit = limit.to_string();

        let response = self
            .client
            .get(&url)
            .query(&[
                ("q", query.as_str()),
                ("client_id", client_id.as_str()),
                ("limit", limit.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SearchError::Status(response.status().as_u16()));
        }

        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| SearchError::InvalidResponse(e.to_string()))?;
        Ok(body.collection.into_iter().map(MatchCandidate::from).collect())
    }
}

#[async_trait]
impl MatchSearcher for SoundCloudSearchClient {
    async fn search(&self, title: &str, artist: &str, limit: usize) -> SearchOutcome {
        let max_attempts = self.retry_policy.max_attempts;
        let mut last_error = String::new();

        for attempt in 0..max_attempts {
            match self.attempt(title, artist, limit).await {
                Ok(candidates) => {
                    metrics::record_search_attempt(true);
                    debug!(
                        "Search for '{} {}' returned {} candidate(s)",
                        title,
                        artist,
                        candidates.len()
                    );
                    return SearchOutcome::Matches(candidates);
                }
                Err(e) => {
                    metrics::record_search_attempt(false);
                    last_error = e.to_string();
                    if self.retry_policy.has_next(attempt) {
                        let delay = self.retry_policy.delay_after(attempt);
                        warn!(
                            "Search attempt {}/{} failed: {}. Retrying in {:?}",
                            attempt + 1,
                            max_attempts,
                            e,
                            delay
                        );
                        tokio::time::sleep(delay).await;
                    } else {
                        warn!(
                            "Search attempt {}/{} failed: {}. Giving up",
                            attempt + 1,
                            max_attempts,
                            e
                        );
                    }
                }
            }
        }

        SearchOutcome::Exhausted {
            attempts: max_attempts,
            last_error,
        }
    }
}

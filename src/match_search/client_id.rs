//! Resolution of the short-lived client identifier the search API requires.

use super::SearchError;
use crate::config::SearchSettings;
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use reqwest::Client;
use std::sync::Arc;
use tracing::debug;

lazy_static! {
    static ref DEFAULT_SCRIPT_PATTERN: Regex =
        Regex::new(r#"src="(https://a-v2\.sndcdn\.com/assets/[^"]+\.js)""#).unwrap();
    static ref CLIENT_ID_PATTERN: Regex = Regex::new(r#"client_id:"([a-zA-Z0-9]+)""#).unwrap();
}

#[async_trait]
pub trait ClientIdResolver: Send + Sync {
    async fn resolve(&self) -> Result<String, SearchError>;
}

/// A configured client id skips bundle scraping.
pub fn resolver_from_settings(client: &Client, settings: &SearchSettings) -> Arc<dyn ClientIdResolver> {
    match &settings.client_id {
        Some(client_id) => Arc::new(FixedClientIdResolver::new(client_id.clone())),
        None => Arc::new(WebBundleClientIdResolver::new(
            client.clone(),
            settings.web_base_url.clone(),
        )),
    }
}

/// Always answers with the same identifier.
pub struct FixedClientIdResolver {
    client_id: String,
}

impl FixedClientIdResolver {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
        }
    }
}

#[async_trait]
impl ClientIdResolver for FixedClientIdResolver {
    async fn resolve(&self) -> Result<String, SearchError> {
        Ok(self.client_id.clone())
    }
}

/// Scrapes the identifier out of the JavaScript bundles linked from the web app.
pub struct WebBundleClientIdResolver {
    client: Client,
    web_base_url: String,
    script_pattern: Regex,
}

impl WebBundleClientIdResolver {
    pub fn new(client: Client, web_base_url: impl Into<String>) -> Self {
        Self {
            client,
            web_base_url: web_base_url.into(),
            script_pattern: DEFAULT_SCRIPT_PATTERN.clone(),
        }
    }

    /// Replace the pattern used to find bundle URLs. Capture group 1 is the URL.
    pub fn with_script_pattern(mut self, pattern: &str) -> Result<Self, regex::Error> {
        self.script_pattern = Regex::new(pattern)?;
        Ok(self)
    }

    async fn fetch_text(&self, url: &str) -> Result<String, SearchError> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(SearchError::Status(response.status().as_u16()));
        }
        Ok(response.text().await?)
    }
}

#[async_trait]
impl ClientIdResolver for WebBundleClientIdResolver {
    async fn resolve(&self) -> Result<String, SearchError> {
        let homepage = self.fetch_text(&self.web_base_url).await?;
        let scripts: Vec<String> = self
            .script_pattern
            .captures_iter(&homepage)
            .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
            .collect();

        for script_url in &scripts {
            let code = match self.fetch_text(script_url).await {
                Ok(code) => code,
                Err(e) => {
                    debug!("Skipping bundle {}: {}", script_url, e);
                    continue;
                }
            };
            if let Some(caps) = CLIENT_ID_PATTERN.captures(&code) {
                return Ok(caps[1].to_string());
            }
        }

        Err(SearchError::ClientId(format!(
            "no client_id found in {} bundle(s)",
            scripts.len()
        )))
    }
}

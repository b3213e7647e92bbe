// src/fetch.rs

//! Fetch collaborator: text-in, text-out document retrieval.
//!
//! The planner only depends on the [`Fetch`] trait; the default
//! implementation is a plain reqwest client. Rendering or anti-bot proxy
//! layers slot in behind the same trait. Configuration is passed in
//! explicitly, never read from ambient state.

use std::time::Duration;

use async_trait::async_trait;
use log::info;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::Plan;

/// Retrieves the raw text of a document at a URL.
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn get(&self, url: &str) -> Result<String>;
}

/// HTTP client settings for the default fetcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Proxy endpoint, only used when a plan enables `useProxy`
    #[serde(default)]
    pub proxy_url: Option<String>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            proxy_url: None,
        }
    }
}

impl FetchConfig {
    /// Apply a plan's fetch toggles to this configuration. `headless` is a
    /// collaborator concern and is only surfaced in the log here.
    pub fn for_plan(mut self, plan: &Plan) -> Self {
        if plan.headless {
            info!("[plan] headless rendering requested, delegating to the rendering collaborator");
        }
        if !plan.use_proxy {
            self.proxy_url = None;
        } else if self.proxy_url.is_some() {
            info!("[plan] proxy session enabled");
        }
        self
    }
}

mod defaults {
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; folio/0.1)".into()
    }
    pub fn timeout() -> u64 {
        30
    }
}

/// Default fetcher: a configured asynchronous reqwest client.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Build a client from the given configuration.
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_secs));
        if let Some(proxy_url) = &config.proxy_url {
            builder = builder.proxy(reqwest::Proxy::all(proxy_url)?);
        }
        Ok(Self {
            client: builder.build()?,
        })
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn get(&self, url: &str) -> Result<String> {
        let text = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_usable() {
        let config = FetchConfig::default();
        assert!(!config.user_agent.trim().is_empty());
        assert!(config.timeout_secs > 0);
        assert!(HttpFetcher::new(&config).is_ok());
    }

    #[test]
    fn for_plan_drops_proxy_when_disabled() {
        let plan = Plan::from_toml_str(
            r#"
            version = "1.0.0"
            target = "https://example.com"
            [filter]
            select = "a"
            linkFrom = "text"
            "#,
        )
        .unwrap();
        let config = FetchConfig {
            proxy_url: Some("http://localhost:8191".to_string()),
            ..FetchConfig::default()
        };
        assert!(config.for_plan(&plan).proxy_url.is_none());
    }
}

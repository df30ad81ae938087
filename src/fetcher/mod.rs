//! Search endpoint client.
//!
//! One POST per round. The response body is not parsed structurally: the
//! configured pattern is scanned over it and every match is read as an
//! identifier, in order of appearance.

use crate::models::Identifier;
use regex::Regex;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Errors raised while fetching a round.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("endpoint {url} answered {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("invalid identifier pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
}

/// Anything that can produce one round of ranked identifiers.
#[allow(async_fn_in_trait)]
pub trait RoundSource {
    /// Human-readable name of the source, for logs and reports.
    fn describe(&self) -> String;

    /// Fetch one round. An empty vector means nothing matched.
    async fn next_round(&mut self) -> Result<Vec<Identifier>, FetchError>;
}

/// Configuration for the fetcher.
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    pub url: String,
    /// Form fields sent with every request.
    pub params: BTreeMap<String, String>,
    /// Pattern whose first capture group is the identifier.
    pub pattern: String,
    pub timeout_seconds: u64,
    pub user_agent: String,
}

/// HTTP client for the randomized search endpoint.
pub struct Fetcher {
    config: FetcherConfig,
    http_client: reqwest::Client,
    pattern: Regex,
}

impl Fetcher {
    /// Create a fetcher with its own HTTP client.
    pub fn new(config: FetcherConfig) -> Result<Self, FetchError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|source| FetchError::Http {
                url: config.url.clone(),
                source,
            })?;

        Self::with_client(config, http_client)
    }

    /// Create a fetcher around an existing HTTP client.
    pub fn with_client(config: FetcherConfig, http_client: reqwest::Client) -> Result<Self, FetchError> {
        let pattern = Regex::new(&config.pattern)?;

        Ok(Self {
            config,
            http_client,
            pattern,
        })
    }

    /// Send one request and return the identifiers in server order.
    pub async fn fetch(&self) -> Result<Vec<Identifier>, FetchError> {
        let url = &self.config.url;

        let response = self
            .http_client
            .post(url)
            .form(&self.config.params)
            .send()
            .await
            .map_err(|source| FetchError::Http {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.clone(),
                status,
            });
        }

        let body = response.text().await.map_err(|source| FetchError::Http {
            url: url.clone(),
            source,
        })?;

        let ids = extract_identifiers(&body, &self.pattern);
        debug!("Fetched {} bytes, {} identifiers", body.len(), ids.len());

        Ok(ids)
    }
}

impl RoundSource for Fetcher {
    fn describe(&self) -> String {
        self.config.url.clone()
    }

    async fn next_round(&mut self) -> Result<Vec<Identifier>, FetchError> {
        self.fetch().await
    }
}

/// Every match of `pattern` in `body`, parsed as an identifier.
///
/// Uses the first capture group when the pattern has one, the whole match
/// otherwise. Matches that do not fit an `i64` are skipped.
pub fn extract_identifiers(body: &str, pattern: &Regex) -> Vec<Identifier> {
    pattern
        .captures_iter(body)
        .filter_map(|caps| {
            let text = caps.get(1).or_else(|| caps.get(0))?.as_str();
            match text.parse::<Identifier>() {
                Ok(id) => Some(id),
                Err(e) => {
                    debug!("Skipping unparsable match '{}': {}", text, e);
                    None
                }
            }
        })
        .collect()
}

//! HTTP client for the Marketing API.
//!
//! Every call is sequential: callers await one request before issuing the
//! next, and the client sleeps a configured delay between calls of the same
//! kind so one rule run never bursts the account's shared quota. Usage
//! headers of every response feed the injected [`UsageTracker`].

mod insights;
mod mutations;
mod objects;

use std::sync::Arc;
use std::time::Duration;

use adpilot_core::AppConfig;
use reqwest::{Client, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::MetaError;
use crate::pagination::{next_page_url, Page, MAX_PAGES};
use crate::types::Credentials;
use crate::usage::{CallKind, UsageTracker};

pub use insights::INSIGHTS_BATCH_SIZE;

const DEFAULT_BASE_URL: &str = "https://graph.facebook.com/v21.0";

/// Longest error body kept in [`MetaError::UnexpectedStatus`].
const MAX_ERROR_BODY: usize = 500;

/// Error codes the platform uses for throttling.
const RATE_LIMIT_CODES: [i64; 5] = [4, 17, 32, 613, 80_004];
const RATE_LIMIT_SUBCODES: [i64; 1] = [2_446_079];

/// Timeouts and pacing for each call kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    pub base_url: String,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub insights_timeout: Duration,
    pub read_delay: Duration,
    pub write_delay: Duration,
    pub insights_delay: Duration,
    pub page_delay: Duration,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            read_timeout: Duration::from_secs(30),
            write_timeout: Duration::from_secs(45),
            insights_timeout: Duration::from_secs(60),
            read_delay: Duration::from_millis(300),
            write_delay: Duration::from_millis(700),
            insights_delay: Duration::from_millis(1000),
            page_delay: Duration::from_millis(500),
        }
    }
}

impl ClientSettings {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            base_url: config.meta_base_url.clone(),
            read_timeout: Duration::from_secs(config.meta_read_timeout_secs),
            write_timeout: Duration::from_secs(config.meta_write_timeout_secs),
            insights_timeout: Duration::from_secs(config.meta_insights_timeout_secs),
            read_delay: Duration::from_millis(config.meta_read_delay_ms),
            write_delay: Duration::from_millis(config.meta_write_delay_ms),
            insights_delay: Duration::from_millis(config.meta_insights_delay_ms),
            page_delay: Duration::from_millis(config.meta_page_delay_ms),
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.to_string();
        self
    }

    /// Zero every inter-call delay. Used by tests against a mock server.
    #[must_use]
    pub fn without_delays(mut self) -> Self {
        self.read_delay = Duration::ZERO;
        self.write_delay = Duration::ZERO;
        self.insights_delay = Duration::ZERO;
        self.page_delay = Duration::ZERO;
        self
    }

    fn timeout(&self, kind: CallKind) -> Duration {
        match kind {
            CallKind::Read => self.read_timeout,
            CallKind::Write => self.write_timeout,
            CallKind::Insights => self.insights_timeout,
        }
    }

    /// Pause between two sequential calls of `kind`.
    #[must_use]
    pub fn delay(&self, kind: CallKind) -> Duration {
        match kind {
            CallKind::Read => self.read_delay,
            CallKind::Write => self.write_delay,
            CallKind::Insights => self.insights_delay,
        }
    }
}

/// Client for one platform API version. Credentials are per call, so a
/// single client serves every ad account.
pub struct MetaClient {
    client: Client,
    base_url: Url,
    settings: ClientSettings,
    usage: Arc<UsageTracker>,
}

impl MetaClient {
    /// # Errors
    ///
    /// Returns [`MetaError::Http`] if the underlying `reqwest::Client` cannot
    /// be constructed, or [`MetaError::InvalidBaseUrl`] if the configured base
    /// URL does not parse.
    pub fn new(settings: ClientSettings, usage: Arc<UsageTracker>) -> Result<Self, MetaError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .user_agent("adpilot/0.1 (campaign-automation)")
            .build()?;

        // A trailing slash makes `Url::join` append to the version segment
        // rather than replace it.
        let normalised = format!("{}/", settings.base_url.trim_end_matches('/'));
        let base_url = Url::parse(&normalised).map_err(|e| MetaError::InvalidBaseUrl {
            base_url: settings.base_url.clone(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            client,
            base_url,
            settings,
            usage,
        })
    }

    #[must_use]
    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    #[must_use]
    pub fn usage(&self) -> &Arc<UsageTracker> {
        &self.usage
    }

    /// Sleeps the configured delay for `kind`.
    pub async fn pause(&self, kind: CallKind) {
        sleep_nonzero(self.settings.delay(kind)).await;
    }

    fn endpoint(&self, path: &str, query: &[(&str, &str)]) -> Result<Url, MetaError> {
        let mut url = self
            .base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| MetaError::InvalidBaseUrl {
                base_url: self.base_url.to_string(),
                reason: format!("cannot join path {path}: {e}"),
            })?;
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in query {
                pairs.append_pair(k, v);
            }
        }
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        creds: &Credentials,
        kind: CallKind,
        url: Url,
        context: &str,
    ) -> Result<T, MetaError> {
        let request = self.client.get(url);
        self.send_json(creds, kind, request, context).await
    }

    async fn post_form<T: DeserializeOwned>(
        &self,
        creds: &Credentials,
        url: Url,
        form: &[(&str, &str)],
        context: &str,
    ) -> Result<T, MetaError> {
        let request = self.client.post(url).form(form);
        self.send_json(creds, CallKind::Write, request, context).await
    }

    /// Sends the request, records usage, and parses the body.
    ///
    /// The token travels in the `Authorization` header and transport errors
    /// are stripped of their URL before they reach logs.
    async fn send_json<T: DeserializeOwned>(
        &self,
        creds: &Credentials,
        kind: CallKind,
        request: RequestBuilder,
        context: &str,
    ) -> Result<T, MetaError> {
        let response = request
            .bearer_auth(creds.access_token())
            .timeout(self.settings.timeout(kind))
            .send()
            .await
            .map_err(reqwest::Error::without_url)?;

        self.usage
            .observe(creds.account_id(), kind, response.headers());

        let status = response.status();
        let body = response.text().await.map_err(reqwest::Error::without_url)?;

        if !status.is_success() {
            let err = classify_error(status.as_u16(), &body, context);
            tracing::warn!(
                account = creds.account_id(),
                call = kind.as_str(),
                context,
                status = status.as_u16(),
                error = %err,
                "platform request failed"
            );
            return Err(err);
        }

        serde_json::from_str(&body).map_err(|e| MetaError::Deserialize {
            context: context.to_string(),
            source: e,
        })
    }

    /// Follows `paging.next` until exhausted, re-attaching `filtering` to each
    /// cursor URL and waiting the page delay between pages.
    ///
    /// # Errors
    ///
    /// Propagates the first failed page and returns
    /// [`MetaError::PaginationLimit`] after [`MAX_PAGES`] pages.
    async fn paginate(
        &self,
        creds: &Credentials,
        kind: CallKind,
        first: Url,
        filtering: Option<&str>,
        context: &str,
    ) -> Result<Vec<serde_json::Value>, MetaError> {
        let mut items = Vec::new();
        let mut next = Some(first);
        let mut pages = 0usize;

        while let Some(url) = next.take() {
            if pages >= MAX_PAGES {
                return Err(MetaError::PaginationLimit {
                    context: context.to_string(),
                    max_pages: MAX_PAGES,
                });
            }
            if pages > 0 {
                sleep_nonzero(self.settings.page_delay).await;
            }
            pages += 1;

            let page: Page = self.get_json(creds, kind, url, context).await?;
            tracing::debug!(
                account = creds.account_id(),
                context,
                page = pages,
                items = page.data.len(),
                "fetched page"
            );
            next = next_page_url(&page, filtering);
            items.extend(page.data);
        }

        Ok(items)
    }
}

async fn sleep_nonzero(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    error_subcode: Option<i64>,
}

fn mentions_rate_limit(text: &str) -> bool {
    let lower = text.to_lowercase();
    lower.contains("too many") || lower.contains("rate limit")
}

fn truncate(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// Maps a non-2xx response to a typed error.
pub(crate) fn classify_error(status: u16, body: &str, context: &str) -> MetaError {
    let detail = serde_json::from_str::<ErrorEnvelope>(body)
        .ok()
        .map(|e| e.error);

    let rate_limited = status == 429
        || detail.as_ref().is_some_and(|d| {
            d.code.is_some_and(|c| RATE_LIMIT_CODES.contains(&c))
                || d.error_subcode
                    .is_some_and(|c| RATE_LIMIT_SUBCODES.contains(&c))
                || d.message.as_deref().is_some_and(mentions_rate_limit)
        })
        || (detail.is_none() && mentions_rate_limit(body));

    if rate_limited {
        let message = detail
            .as_ref()
            .and_then(|d| d.message.clone())
            .unwrap_or_else(|| format!("HTTP {status} from {context}"));
        return MetaError::RateLimited { message };
    }

    match detail {
        Some(d) => MetaError::Api {
            status,
            code: d.code,
            subcode: d.error_subcode,
            message: d.message.unwrap_or_else(|| "unknown error".to_string()),
        },
        None => MetaError::UnexpectedStatus {
            status,
            context: context.to_string(),
            body: truncate(body, MAX_ERROR_BODY),
        },
    }
}

#[cfg(test)]
#[path = "../client_test.rs"]
mod tests;

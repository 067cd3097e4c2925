// SPDX-License-Identifier: GPL-3.0-or-later

use crate::error::{Result, ScrobbleError};
use crate::models::{ApiErrorBody, PlayedTrack, RecentTracksEnvelope, RecentTracksPage};
use crate::rate_limiter::RateLimiter;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, trace, warn};

const AUDIOSCROBBLER_API_BASE: &str = "https://ws.audioscrobbler.com/2.0/";
const USER_AGENT: &str = concat!("Tunelog/", env!("CARGO_PKG_VERSION"));

/// API error code used by the service for throttled clients.
const API_CODE_RATE_LIMITED: i64 = 29;

/// Play-history source client with rate limiting and a capped page loop.
#[derive(Debug, Clone)]
pub struct ScrobbleClient {
    client: Client,
    base_url: String,
    api_key: String,
    page_size: u32,
    max_pages: u32,
    rate_limiter: RateLimiter,
}

impl ScrobbleClient {
    /// Create a client builder for custom configuration.
    pub fn builder(api_key: impl Into<String>) -> ScrobbleClientBuilder {
        ScrobbleClientBuilder::new(api_key)
    }

    /// Fetch one page of a user's recent tracks.
    ///
    /// `from`/`to` bound the window as unix seconds; pages are 1-based.
    pub async fn recent_tracks_page(
        &self,
        user: &str,
        from: Option<i64>,
        to: Option<i64>,
        page: u32,
    ) -> Result<RecentTracksPage> {
        let page_s = page.to_string();
        let limit_s = self.page_size.to_string();
        let mut params = vec![
            ("method", "user.getrecenttracks".to_string()),
            ("user", user.to_string()),
            ("api_key", self.api_key.clone()),
            ("format", "json".to_string()),
            ("limit", limit_s),
            ("page", page_s),
        ];
        if let Some(from) = from {
            params.push(("from", from.to_string()));
        }
        if let Some(to) = to {
            params.push(("to", to.to_string()));
        }

        let envelope = self.get(&params).await?;
        let attr = &envelope.recenttracks.attr;
        let page = attr
            .page_number()
            .ok_or_else(|| ScrobbleError::InvalidResponse("page attribute not numeric".into()))?;
        let total_pages = attr.total_page_count().ok_or_else(|| {
            ScrobbleError::InvalidResponse("totalPages attribute not numeric".into())
        })?;

        Ok(RecentTracksPage {
            tracks: envelope.recenttracks.track,
            page,
            total_pages,
        })
    }

    /// Fetch every page of the user's history in the given window.
    ///
    /// The loop is bounded by the configured safety cap; any transport or
    /// API error aborts the whole fetch so no partial batch is reconciled.
    pub async fn fetch_all_plays(
        &self,
        user: &str,
        from: Option<i64>,
        to: Option<i64>,
    ) -> Result<Vec<PlayedTrack>> {
        let mut plays = Vec::new();
        let mut page = 1u32;

        loop {
            let fetched = self.recent_tracks_page(user, from, to, page).await?;
            debug!(
                target: "scrobble",
                user,
                page = fetched.page,
                total_pages = fetched.total_pages,
                tracks = fetched.tracks.len(),
                "fetched recent-tracks page"
            );
            plays.extend(fetched.tracks);

            if page >= fetched.total_pages {
                break;
            }
            if page >= self.max_pages {
                warn!(
                    target: "scrobble",
                    user,
                    max_pages = self.max_pages,
                    total_pages = fetched.total_pages,
                    "stopping at page cap before source exhausted"
                );
                break;
            }
            page += 1;
        }

        Ok(plays)
    }

    /// Internal method to perform rate-limited GET requests.
    async fn get(&self, params: &[(&str, String)]) -> Result<RecentTracksEnvelope> {
        self.rate_limiter.acquire().await;

        trace!(target: "scrobble", "GET {}", self.base_url);

        let response = self
            .client
            .get(&self.base_url)
            .header("User-Agent", USER_AGENT)
            .query(params)
            .send()
            .await?;

        let status = response.status();
        debug!(target: "scrobble", "response status: {}", status);

        if status == 429 || status == 503 {
            return Err(ScrobbleError::RateLimitExceeded);
        }

        let body = response.text().await?;

        if !status.is_success() {
            return Err(ScrobbleError::HttpError {
                status: status.as_u16(),
                message: body,
            });
        }

        // API-level failures come back as HTTP 200 with an error envelope.
        if let Ok(api_error) = serde_json::from_str::<ApiErrorBody>(&body) {
            if api_error.error == API_CODE_RATE_LIMITED {
                return Err(ScrobbleError::RateLimitExceeded);
            }
            return Err(ScrobbleError::ApiError {
                code: api_error.error,
                message: api_error.message,
            });
        }

        serde_json::from_str(&body).map_err(|e| {
            ScrobbleError::InvalidResponse(format!("Failed to parse response: {}", e))
        })
    }
}

/// Builder for configuring a scrobble client.
#[derive(Debug)]
pub struct ScrobbleClientBuilder {
    api_key: String,
    base_url: String,
    timeout: Duration,
    rate_limit_interval: Duration,
    page_size: u32,
    max_pages: u32,
}

impl ScrobbleClientBuilder {
    fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: AUDIOSCROBBLER_API_BASE.to_string(),
            timeout: Duration::from_secs(30),
            rate_limit_interval: Duration::from_secs(1),
            page_size: 200,
            max_pages: 50,
        }
    }

    /// Set a custom base URL (useful for testing with mock servers).
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set request timeout duration.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set rate limit interval between requests.
    pub fn rate_limit_interval(mut self, interval: Duration) -> Self {
        self.rate_limit_interval = interval;
        self
    }

    /// Set the number of tracks requested per page.
    pub fn page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    /// Set the safety cap on the pagination loop.
    pub fn max_pages(mut self, max_pages: u32) -> Self {
        self.max_pages = max_pages;
        self
    }

    /// Build the scrobble client.
    pub fn build(self) -> Result<ScrobbleClient> {
        let client = Client::builder()
            .timeout(self.timeout)
            .user_agent(USER_AGENT)
            .build()?;

        let rate_limiter = RateLimiter::new(self.rate_limit_interval);

        Ok(ScrobbleClient {
            client,
            base_url: self.base_url,
            api_key: self.api_key,
            page_size: self.page_size,
            max_pages: self.max_pages,
            rate_limiter,
        })
    }
}

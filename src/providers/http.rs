use reqwest::header::HeaderMap;
use reqwest::{RequestBuilder, StatusCode};
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

use crate::error::ProviderError;
use crate::settings::HttpSettings;

const BASE_DELAY: Duration = Duration::from_secs(2);
const MAX_DELAY: Duration = Duration::from_secs(20);

/// One client per process; every request inherits the connect and total timeouts so
/// a stalled provider surfaces as `ProviderError::Timeout` and the chain moves on.
pub fn build_client(settings: &HttpSettings) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(settings.connect_timeout_secs))
        .timeout(Duration::from_secs(settings.timeout_secs))
        .build()
}

/// Bounded retry for rate-limited responses only.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: usize,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: usize) -> Self {
        Self {
            max_retries,
            base_delay: BASE_DELAY,
        }
    }

    pub fn none() -> Self {
        Self::new(0)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(2)
    }
}

pub(crate) struct HttpReply {
    pub status: StatusCode,
    pub body: String,
}

impl HttpReply {
    pub fn into_success(self, provider: &'static str) -> Result<String, ProviderError> {
        if self.status.is_success() {
            Ok(self.body)
        } else {
            Err(ProviderError::Status {
                provider,
                status: self.status.as_u16(),
                body: truncate(&self.body, 300),
            })
        }
    }
}

/// Sends the request built by `build`, retrying while the response looks rate
/// limited. Any other response, successful or not, is returned to the caller.
pub(crate) async fn send_with_retry<F>(
    provider: &'static str,
    policy: RetryPolicy,
    build: F,
) -> Result<HttpReply, ProviderError>
where
    F: Fn() -> RequestBuilder,
{
    let mut attempt = 0usize;
    let mut delay = policy.base_delay;
    loop {
        let response = build()
            .send()
            .await
            .map_err(|err| ProviderError::from_reqwest(provider, err))?;
        let status = response.status();
        let wait_hint = retry_after(response.headers());
        let body = response
            .text()
            .await
            .map_err(|err| ProviderError::from_reqwest(provider, err))?;
        if !status.is_success() && is_rate_limited(status, &body) && attempt < policy.max_retries {
            attempt += 1;
            let wait = wait_hint.filter(|hint| *hint > delay).unwrap_or(delay).min(MAX_DELAY);
            warn!(
                provider,
                attempt,
                wait_secs = wait.as_secs_f32(),
                "rate limited; retrying"
            );
            sleep(wait).await;
            delay = next_delay(delay);
            continue;
        }
        return Ok(HttpReply { status, body });
    }
}

pub(crate) fn is_rate_limited(status: StatusCode, body: &str) -> bool {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return true;
    }
    let code = status.as_u16();
    if code == 529 || code == 503 {
        return true;
    }
    let lower = body.to_lowercase();
    lower.contains("rate limit")
        || lower.contains("rate_limit")
        || lower.contains("too many requests")
        || lower.contains("resource_exhausted")
        || lower.contains("quota")
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get("retry-after")?.to_str().ok()?.trim();
    value.parse::<u64>().ok().map(Duration::from_secs)
}

fn next_delay(current: Duration) -> Duration {
    current.saturating_mul(2).clamp(BASE_DELAY, MAX_DELAY)
}

fn truncate(body: &str, max_chars: usize) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() <= max_chars {
        return trimmed.to_string();
    }
    let mut out = trimmed.chars().take(max_chars).collect::<String>();
    out.push('…');
    out
}

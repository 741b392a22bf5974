//! Authenticated JSON requests with timeout, retry, backoff and rate-limit handling.

use std::time::Duration;

use rand::Rng;
use reqwest::header::{HeaderMap, ACCEPT, RETRY_AFTER};
use reqwest::{Client, Method, StatusCode, Url};
use serde_json::Value;
use triage_vitals::parse_loose_number;

/// Header carrying the caller's credential.
pub const API_KEY_HEADER: &str = "x-api-key";

const RETRY_HINT_KEYS: [&str; 4] = [
    "retry_after",
    "retryAfter",
    "retry_after_seconds",
    "retryAfterSeconds",
];

/// Longest server-supplied wait honoured before retrying a 429.
pub const MAX_RETRY_HINT: Duration = Duration::from_secs(60);

const JITTER_MIN: f64 = 0.85;
const JITTER_MAX: f64 = 1.15;

/// Retry and timeout settings for a [`Transport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportConfig {
    pub timeout: Duration,
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_retries: 4,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
        }
    }
}

impl TransportConfig {
    /// Bound every knob to a safe range.
    pub fn clamped(self) -> Self {
        let initial_backoff = self
            .initial_backoff
            .clamp(Duration::from_millis(1), Duration::from_secs(30));
        Self {
            timeout: self
                .timeout
                .clamp(Duration::from_secs(1), Duration::from_secs(120)),
            max_retries: self.max_retries.min(10),
            initial_backoff,
            max_backoff: self
                .max_backoff
                .clamp(initial_backoff, Duration::from_secs(60)),
        }
    }
}

/// Response body: parsed JSON when possible, raw text otherwise.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Json(Value),
    Text(String),
}

impl ResponseBody {
    pub fn from_text(text: String) -> Self {
        match serde_json::from_str(&text) {
            Ok(value) => Self::Json(value),
            Err(_) => Self::Text(text),
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) => Some(value),
            Self::Text(_) => None,
        }
    }

    /// Convert into a `Value`; raw text becomes a JSON string.
    pub fn into_json(self) -> Value {
        match self {
            Self::Json(value) => value,
            Self::Text(text) => Value::String(text),
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::Json(value) => value.to_string(),
            Self::Text(text) => text.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: ResponseBody,
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("rate limited (status {status}) after exhausting retries, retry hint {retry_after:?}")]
    RateLimited {
        status: u16,
        retry_after: Option<Duration>,
    },
    #[error("server error (status {status}) after exhausting retries: {body}")]
    Server { status: u16, body: String },
    #[error("request failed with status {status} {status_text}: {body}")]
    Status {
        status: u16,
        status_text: String,
        body: String,
    },
    #[error("request failed: {0}")]
    Network(#[source] reqwest::Error),
    #[error("invalid base url: {0}")]
    Url(String),
    #[error("could not build http client: {0}")]
    Client(#[source] reqwest::Error),
}

impl TransportError {
    /// HTTP status carried by the error, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::RateLimited { status, .. }
            | Self::Server { status, .. }
            | Self::Status { status, .. } => Some(*status),
            Self::Network(err) => err.status().map(|status| status.as_u16()),
            Self::Url(_) | Self::Client(_) => None,
        }
    }
}

/// Exponential backoff state threaded through one request's retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Backoff {
    attempt: u32,
    current: Duration,
    max: Duration,
    max_retries: u32,
}

impl Backoff {
    pub(crate) fn new(config: &TransportConfig) -> Self {
        Self {
            attempt: 0,
            current: config.initial_backoff,
            max: config.max_backoff,
            max_retries: config.max_retries,
        }
    }

    pub(crate) fn exhausted(&self) -> bool {
        self.attempt >= self.max_retries
    }

    pub(crate) fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Jittered delay for the next retry; advances the attempt count and doubles the base.
    pub(crate) fn advance(&mut self, multiplier: f64) -> Duration {
        let delay = self.current.mul_f64(multiplier);
        self.attempt += 1;
        self.current = self.current.saturating_mul(2).min(self.max);
        delay
    }
}

/// Uniform multiplier in [0.85, 1.15].
pub(crate) fn jitter_multiplier() -> f64 {
    rand::thread_rng().gen_range(JITTER_MIN..=JITTER_MAX)
}

/// Server-supplied wait hint: the `retry-after` header, else a body field.
///
/// Hints longer than [`MAX_RETRY_HINT`] are capped to it.
pub fn retry_hint(headers: &HeaderMap, body: &ResponseBody) -> Option<Duration> {
    let from_header = headers
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|text| text.trim().parse::<f64>().ok());

    let from_body = || {
        let json = body.as_json()?;
        [Some(json), json.get("error")]
            .into_iter()
            .flatten()
            .flat_map(|scope| RETRY_HINT_KEYS.iter().map(move |key| scope.get(*key)))
            .find_map(parse_loose_number)
    };

    from_header
        .or_else(from_body)
        .filter(|seconds| seconds.is_finite() && *seconds >= 0.0)
        .map(|seconds| {
            Duration::try_from_secs_f64(seconds)
                .map_or(MAX_RETRY_HINT, |hint| hint.min(MAX_RETRY_HINT))
        })
}

/// Wait at least as long as the hint and never shorter than the backoff delay.
pub(crate) fn rate_limit_wait(hint: Option<Duration>, backoff_delay: Duration) -> Duration {
    hint.map_or(backoff_delay, |hint| hint.max(backoff_delay))
}

/// Thin `reqwest` wrapper that attaches credentials and retries transient failures.
#[derive(Debug, Clone)]
pub struct Transport {
    client: Client,
    base_url: String,
    api_key: String,
    config: TransportConfig,
}

impl Transport {
    pub fn new(
        base_url: &str,
        api_key: &str,
        config: TransportConfig,
    ) -> Result<Self, TransportError> {
        let base_url = base_url.trim_end_matches('/').to_string();
        Url::parse(&base_url).map_err(|err| TransportError::Url(format!("{base_url}: {err}")))?;

        let config = config.clamped();
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(TransportError::Client)?;

        Ok(Self {
            client,
            base_url,
            api_key: api_key.to_string(),
            config,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Issue a request, retrying 429, 500, 503 and transport failures.
    ///
    /// Any other non-success status fails at once without consuming a retry.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        json: Option<&Value>,
    ) -> Result<HttpResponse, TransportError> {
        let url = self.url(path);
        let mut backoff = Backoff::new(&self.config);

        loop {
            let mut builder = self
                .client
                .request(method.clone(), &url)
                .header(API_KEY_HEADER, &self.api_key)
                .header(ACCEPT, "application/json")
                .query(query);
            if let Some(json) = json {
                builder = builder.json(json);
            }

            let outcome = match builder.send().await {
                Ok(response) => {
                    let status = response.status();
                    let headers = response.headers().clone();
                    response.text().await.map(|text| HttpResponse {
                        status,
                        headers,
                        body: ResponseBody::from_text(text),
                    })
                }
                Err(err) => Err(err),
            };

            let response = match outcome {
                Ok(response) => response,
                Err(err) => {
                    if backoff.exhausted() {
                        tracing::error!(%url, attempts = backoff.attempt() + 1, error = %err, "request failed");
                        return Err(TransportError::Network(err));
                    }
                    let wait = backoff.advance(jitter_multiplier());
                    tracing::warn!(%url, attempt = backoff.attempt(), ?wait, error = %err, "transport failure, retrying");
                    tokio::time::sleep(wait).await;
                    continue;
                }
            };

            let status = response.status;
            if status.is_success() {
                return Ok(response);
            }

            match status {
                StatusCode::TOO_MANY_REQUESTS => {
                    let hint = retry_hint(&response.headers, &response.body);
                    if backoff.exhausted() {
                        return Err(TransportError::RateLimited {
                            status: status.as_u16(),
                            retry_after: hint,
                        });
                    }
                    let wait = rate_limit_wait(hint, backoff.advance(jitter_multiplier()));
                    tracing::warn!(%url, attempt = backoff.attempt(), ?hint, ?wait, "rate limited, waiting");
                    tokio::time::sleep(wait).await;
                }
                StatusCode::INTERNAL_SERVER_ERROR | StatusCode::SERVICE_UNAVAILABLE => {
                    if backoff.exhausted() {
                        return Err(TransportError::Server {
                            status: status.as_u16(),
                            body: response.body.describe(),
                        });
                    }
                    let wait = backoff.advance(jitter_multiplier());
                    tracing::warn!(%url, %status, attempt = backoff.attempt(), ?wait, "server error, retrying");
                    tokio::time::sleep(wait).await;
                }
                _ => {
                    return Err(TransportError::Status {
                        status: status.as_u16(),
                        status_text: status.canonical_reason().unwrap_or_default().to_string(),
                        body: response.body.describe(),
                    });
                }
            }
        }
    }
}

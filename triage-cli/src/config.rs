//! Runtime configuration, resolved once at startup.
//!
//! Precedence: command-line flags, then environment (including `.env`), then defaults.

use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context};
use triage_client::{FetchOptions, TransportConfig};

pub const DEFAULT_BASE_URL: &str = "https://assessment.ksensetech.com/api";

pub const ENV_API_KEY: &str = "TRIAGE_API_KEY";
pub const ENV_BASE_URL: &str = "TRIAGE_BASE_URL";
pub const ENV_PAGE_SIZE: &str = "TRIAGE_PAGE_SIZE";
pub const ENV_TIMEOUT_SECS: &str = "TRIAGE_TIMEOUT_SECS";
pub const ENV_MAX_RETRIES: &str = "TRIAGE_MAX_RETRIES";
pub const ENV_MAX_PAGES: &str = "TRIAGE_MAX_PAGES";

/// Values supplied on the command line; `None` defers to the environment.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub page_size: Option<u32>,
    pub timeout_secs: Option<u64>,
    pub max_retries: Option<u32>,
    pub max_pages: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    base_url: String,
    api_key: String,
    fetch: FetchOptions,
    transport: TransportConfig,
}

impl AppConfig {
    pub fn new(
        base_url: String,
        api_key: String,
        fetch: FetchOptions,
        transport: TransportConfig,
    ) -> anyhow::Result<Self> {
        if api_key.trim().is_empty() {
            bail!("Thiếu API key: đặt {ENV_API_KEY} hoặc dùng --api-key");
        }
        if base_url.trim().is_empty() {
            bail!("Base URL không được để trống");
        }

        Ok(Self {
            base_url: base_url.trim().to_string(),
            api_key: api_key.trim().to_string(),
            fetch: fetch.clamped(),
            transport: transport.clamped(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn fetch(&self) -> FetchOptions {
        self.fetch
    }

    pub fn transport(&self) -> TransportConfig {
        self.transport
    }
}

/// Resolve configuration from flags and an environment lookup.
pub fn resolve<F>(overrides: Overrides, env: F) -> anyhow::Result<AppConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let base_url = overrides
        .base_url
        .or_else(|| env(ENV_BASE_URL))
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
    let api_key = overrides
        .api_key
        .or_else(|| env(ENV_API_KEY))
        .unwrap_or_default();

    let mut fetch = FetchOptions::default();
    if let Some(page_size) = pick(overrides.page_size, &env, ENV_PAGE_SIZE)? {
        fetch.page_size = page_size;
    }
    if let Some(max_pages) = pick(overrides.max_pages, &env, ENV_MAX_PAGES)? {
        fetch.max_total_pages = max_pages;
    }

    let mut transport = TransportConfig::default();
    if let Some(secs) = pick(overrides.timeout_secs, &env, ENV_TIMEOUT_SECS)? {
        transport.timeout = Duration::from_secs(secs);
    }
    if let Some(retries) = pick(overrides.max_retries, &env, ENV_MAX_RETRIES)? {
        transport.max_retries = retries;
    }

    AppConfig::new(base_url, api_key, fetch, transport)
}

fn pick<T, F>(flag: Option<T>, env: &F, key: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    if flag.is_some() {
        return Ok(flag);
    }
    env(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .with_context(|| format!("Giá trị {key}={raw:?} không hợp lệ"))
        })
        .transpose()
}

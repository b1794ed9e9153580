use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use collector_logging::collector_warn;
use futures_util::StreamExt;
use reqwest::header::{CONTENT_TYPE, REFERER};

use crate::{Address, Content, FailureKind, FetchError};

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 6.1; WOW64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/63.0.3239.132 Safari/537.36";

#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub redirect_limit: usize,
    pub max_bytes: u64,
    pub user_agent: String,
    /// Proxy URLs, used in turn. Empty means direct connections.
    pub proxies: Vec<String>,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(4),
            redirect_limit: 5,
            max_bytes: 5 * 1024 * 1024,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            proxies: Vec::new(),
        }
    }
}

/// Turns an [`Address`] into [`Content`].
///
/// Implementations are called from many concurrent fetch units at once and
/// must bound their own run time; the engine does not time the call out.
#[async_trait::async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, address: &Address) -> Result<Content, FetchError>;
}

#[derive(Debug)]
pub struct ReqwestFetcher {
    settings: FetchSettings,
    next_proxy: AtomicUsize,
}

impl ReqwestFetcher {
    pub fn new(settings: FetchSettings) -> Self {
        Self {
            settings,
            next_proxy: AtomicUsize::new(0),
        }
    }

    /// Round-robin pick; `None` when no proxies are configured.
    fn pick_proxy(&self) -> Option<&str> {
        if self.settings.proxies.is_empty() {
            return None;
        }
        let index = self.next_proxy.fetch_add(1, Ordering::Relaxed) % self.settings.proxies.len();
        Some(self.settings.proxies[index].as_str())
    }

    fn build_client(&self) -> Result<reqwest::Client, FetchError> {
        let redirect_limit = self.settings.redirect_limit;
        let policy = reqwest::redirect::Policy::custom(move |attempt| {
            if attempt.previous().len() >= redirect_limit {
                attempt.error("redirect limit exceeded")
            } else {
                attempt.follow()
            }
        });

        let mut builder = reqwest::Client::builder()
            .connect_timeout(self.settings.connect_timeout)
            .timeout(self.settings.request_timeout)
            .user_agent(self.settings.user_agent.as_str())
            .redirect(policy);

        if let Some(proxy_url) = self.pick_proxy() {
            match reqwest::Proxy::all(proxy_url) {
                Ok(proxy) => builder = builder.proxy(proxy),
                Err(err) => {
                    collector_warn!("Ignoring unusable proxy {}: {}", proxy_url, err);
                }
            }
        }

        builder
            .build()
            .map_err(|err| FetchError::new(FailureKind::Network, err.to_string()))
    }
}

#[async_trait::async_trait]
impl Fetcher for ReqwestFetcher {
    async fn fetch(&self, address: &Address) -> Result<Content, FetchError> {
        let parsed = reqwest::Url::parse(&address.location)
            .map_err(|err| FetchError::new(FailureKind::InvalidUrl, err.to_string()))?;
        let client = self.build_client()?;

        let response = client
            .get(parsed)
            .header(REFERER, address.location.as_str())
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::new(
                FailureKind::HttpStatus(status.as_u16()),
                status.to_string(),
            ));
        }

        if let Some(content_len) = response.content_length() {
            if content_len > self.settings.max_bytes {
                return Err(FetchError::new(
                    FailureKind::TooLarge {
                        max_bytes: self.settings.max_bytes,
                        actual: Some(content_len),
                    },
                    "response too large",
                ));
            }
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string())
            .ok_or_else(|| {
                FetchError::new(FailureKind::MissingContentType, "response has no content type")
            })?;
        let kind = content_kind(&content_type).ok_or_else(|| {
            FetchError::new(
                FailureKind::UnsupportedContentType {
                    content_type: content_type.clone(),
                },
                "unknown response data type",
            )
        })?;
        let name = resource_name(response.url());

        let mut payload = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(map_reqwest_error)?;
            let next_len = payload.len() as u64 + chunk.len() as u64;
            if next_len > self.settings.max_bytes {
                return Err(FetchError::new(
                    FailureKind::TooLarge {
                        max_bytes: self.settings.max_bytes,
                        actual: Some(next_len),
                    },
                    "response too large",
                ));
            }
            payload.extend_from_slice(&chunk);
        }

        Ok(Content {
            kind: kind.to_string(),
            name,
            payload,
            depth: address.depth,
        })
    }
}

/// Maps a `Content-Type` header value to the short kind tag carried by [`Content`].
pub fn content_kind(content_type: &str) -> Option<&'static str> {
    let media_type = content_type
        .split(';')
        .next()
        .unwrap_or(content_type)
        .trim()
        .to_ascii_lowercase();
    match media_type.as_str() {
        "text/html" | "application/xhtml+xml" => Some("html"),
        "image/jpeg" | "image/jpg" | "image/pjpeg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/gif" => Some("gif"),
        _ => None,
    }
}

/// Last segment of the URL path; empty for directory-like paths.
fn resource_name(url: &reqwest::Url) -> String {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or_default()
        .to_string()
}

fn map_reqwest_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        return FetchError::new(FailureKind::Timeout, err.to_string());
    }
    if err.is_redirect() {
        return FetchError::new(FailureKind::RedirectLimitExceeded, err.to_string());
    }
    FetchError::new(FailureKind::Network, err.to_string())
}

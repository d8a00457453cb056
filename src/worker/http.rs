//! HTTP client for direct-link sources

use crate::config::HttpSettings;
use crate::storage::BoxReader;
use crate::transfer::naming;
use futures_util::TryStreamExt;
use reqwest::Client;
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_LENGTH, HeaderMap};
use std::io;
use std::time::Duration;
use thiserror::Error;
use tokio_util::io::StreamReader;
use tracing::debug;

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Connection timeout")]
    Timeout,

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Too many redirects")]
    TooManyRedirects,

    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },
}

pub type Result<T> = std::result::Result<T, DownloadError>;

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub connect_timeout: Duration,
    /// Whole-request deadline; `None` lets long bodies stream indefinitely
    pub request_timeout: Option<Duration>,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: None,
            user_agent: concat!("ferry/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl From<&HttpSettings> for HttpConfig {
    fn from(settings: &HttpSettings) -> Self {
        Self {
            connect_timeout: Duration::from_secs(settings.connect_timeout_secs),
            request_timeout: (settings.request_timeout_secs > 0)
                .then(|| Duration::from_secs(settings.request_timeout_secs)),
            user_agent: settings.user_agent.clone(),
        }
    }
}

/// What a HEAD request revealed about a link
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Probe {
    pub size: Option<u64>,
    pub filename: Option<String>,
}

pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    pub fn new(config: HttpConfig) -> Result<Self> {
        let mut builder = Client::builder()
            .connect_timeout(config.connect_timeout)
            .user_agent(&config.user_agent)
            .redirect(reqwest::redirect::Policy::limited(10));

        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }

        let client = builder
            .build()
            .map_err(|e| DownloadError::RequestFailed(e.to_string()))?;

        Ok(Self { client })
    }

    /// Learn size and file name with a HEAD request
    ///
    /// The name comes from `Content-Disposition` when present, otherwise
    /// from the last segment of the URL path.
    pub async fn probe(&self, url: &str) -> Result<Probe> {
        let response = self.client.head(url).send().await.map_err(map_request_error)?;
        check_status(url, response.status())?;

        let headers = response.headers();
        let probe = Probe {
            size: content_length(headers),
            filename: headers
                .get(CONTENT_DISPOSITION)
                .and_then(|v| v.to_str().ok())
                .and_then(naming::filename_from_disposition)
                .or_else(|| naming::filename_from_url(url)),
        };

        debug!(url, size = ?probe.size, filename = ?probe.filename, "Probed link");
        Ok(probe)
    }

    /// Start a GET and return the body as a reader plus its advertised length
    pub async fn open(&self, url: &str) -> Result<(BoxReader, Option<u64>)> {
        debug!(url, "Starting download");

        let response = self.client.get(url).send().await.map_err(map_request_error)?;
        check_status(url, response.status())?;

        let size = content_length(response.headers());
        let body = Box::pin(response.bytes_stream().map_err(io::Error::other));
        Ok((Box::new(StreamReader::new(body)), size))
    }
}

fn map_request_error(e: reqwest::Error) -> DownloadError {
    if e.is_timeout() {
        DownloadError::Timeout
    } else if e.is_redirect() {
        DownloadError::TooManyRedirects
    } else if e.is_builder() {
        DownloadError::InvalidUrl(e.to_string())
    } else {
        DownloadError::RequestFailed(e.to_string())
    }
}

fn check_status(url: &str, status: reqwest::StatusCode) -> Result<()> {
    if status.is_success() {
        Ok(())
    } else {
        Err(DownloadError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        })
    }
}

/// Read the header directly; HEAD responses carry no body to size
fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}

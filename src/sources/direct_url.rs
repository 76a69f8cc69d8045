use futures::TryStreamExt;
use reqwest::{
    header::{ACCEPT, CONTENT_TYPE, LOCATION, USER_AGENT},
    redirect, Client,
};
use std::time::Duration;
use tokio_util::io::StreamReader;
use tracing::{debug, info, warn};
use url::Url;

use super::ByteStream;
use crate::error::{PlayerError, PlayerResult};

/// Some stations refuse requests that do not look like a browser.
const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

#[derive(Debug, Clone)]
pub struct FetchSettings {
    /// Covers TCP/TLS connect and the response head. The body has no timeout.
    pub connect_timeout: Duration,
    pub max_redirects: usize,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            max_redirects: 10,
        }
    }
}

/// An open direct stream.
pub struct DirectStream {
    pub body: ByteStream,
    pub content_type: Option<String>,
    pub final_url: Url,
}

/// HTTP client for continuous MP3/AAC stations.
pub struct DirectFetchClient {
    client: Client,
    settings: FetchSettings,
}

impl DirectFetchClient {
    pub fn new(settings: FetchSettings) -> PlayerResult<Self> {
        // Redirects are followed by hand so the hop count stays bounded and logged.
        let client = Client::builder()
            .redirect(redirect::Policy::none())
            .connect_timeout(settings.connect_timeout)
            .build()?;

        Ok(Self { client, settings })
    }

    pub fn is_valid_url(url: &str) -> bool {
        Url::parse(url)
            .map(|u| matches!(u.scheme(), "http" | "https"))
            .unwrap_or(false)
    }

    /// Opens the stream, following up to `max_redirects` redirects.
    pub async fn fetch(&self, endpoint: &str) -> PlayerResult<DirectStream> {
        let mut url = Url::parse(endpoint)?;

        for hop in 0..=self.settings.max_redirects {
            debug!("🌐 GET {} (hop {})", url, hop);

            let request = self
                .client
                .get(url.clone())
                .header(USER_AGENT, BROWSER_USER_AGENT)
                .header(ACCEPT, "*/*")
                .send();

            let response = tokio::time::timeout(self.settings.connect_timeout, request)
                .await
                .map_err(|_| PlayerError::ConnectTimeout(self.settings.connect_timeout))??;

            let status = response.status();

            if status.is_redirection() {
                let location = response
                    .headers()
                    .get(LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .ok_or(PlayerError::HttpStatus(status))?;

                let next = url.join(location)?;
                info!("↪️ Station redirected ({}) to {}", status.as_u16(), next);
                url = next;
                continue;
            }

            if !status.is_success() {
                warn!("❌ Station answered {} for {}", status, url);
                return Err(PlayerError::HttpStatus(status));
            }

            let content_type = response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);

            info!("✅ Connected to {} ({})", url, content_type.as_deref().unwrap_or("unknown type"));

            let body = StreamReader::new(
                response
                    .bytes_stream()
                    .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e)),
            );

            return Ok(DirectStream {
                body: Box::new(body),
                content_type,
                final_url: url,
            });
        }

        Err(PlayerError::TooManyRedirects(self.settings.max_redirects))
    }
}

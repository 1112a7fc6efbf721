//! HTTP transport seam between the source and the feature server

use crate::{Result, SourceError};
use async_trait::async_trait;
use url::Url;

/// Fetches raw response bodies; all service traffic goes through one of these
#[async_trait]
pub trait Transport: Send + Sync {
    /// GET `url`, returning the body of a successful response
    async fn get(&self, url: Url) -> Result<Vec<u8>>;
}

/// [`Transport`] backed by a shared `reqwest` client
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    /// Reuse an existing client (proxies, timeouts and TLS set by the caller)
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: Url) -> Result<Vec<u8>> {
        tracing::trace!("GET {url}");
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Transport(format!(
                "{} responded with {status}",
                response.url()
            )));
        }
        let body = response.bytes().await?;
        tracing::trace!("Received {} bytes", body.len());
        Ok(body.to_vec())
    }
}

//! Lightweight content fetch used by rules that match on response content.

use std::time::Duration;

use async_trait::async_trait;
use sweepr_common::{Error, Result};
use tracing::debug;

/// Upper bound on how much of a response body is kept for matching.
const MAX_BODY_BYTES: usize = 512 * 1024;

#[async_trait]
pub trait ContentProbe: Send + Sync {
    /// Returns the status line, headers and body of `url` as one text blob.
    async fn fetch(&self, url: &str) -> Result<String>;
}

pub struct HttpProbe {
    client: reqwest::Client,
}

impl HttpProbe {
    /// Certificates are not verified: targets are routinely self-signed.
    pub fn new(timeout: Duration, user_agent: Option<&str>) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(true)
            .redirect(reqwest::redirect::Policy::limited(5));
        if let Some(agent) = user_agent {
            builder = builder.user_agent(agent.to_string());
        }
        let client = builder
            .build()
            .map_err(|e| Error::config(format!("cannot build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ContentProbe for HttpProbe {
    async fn fetch(&self, url: &str) -> Result<String> {
        let failure = |detail: String| Error::ExecutionFailure {
            program: "http-probe".to_string(),
            status: url.to_string(),
            detail,
        };

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| failure(e.to_string()))?;

        let mut text = format!("{:?} {}\n", response.version(), response.status());
        for (name, value) in response.headers() {
            text.push_str(name.as_str());
            text.push_str(": ");
            text.push_str(&String::from_utf8_lossy(value.as_bytes()));
            text.push('\n');
        }
        text.push('\n');

        let body = response.bytes().await.map_err(|e| failure(e.to_string()))?;
        let keep = body.len().min(MAX_BODY_BYTES);
        text.push_str(&String::from_utf8_lossy(&body[..keep]));
        debug!(url, bytes = body.len(), "probe fetched");
        Ok(text)
    }
}

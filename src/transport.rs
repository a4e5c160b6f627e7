// Transport Module - Carries JSON request bodies and file uploads to the clock over HTTP
use std::future::Future;
use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use thiserror::Error;
use tracing::debug;

use crate::config::ClientConfig;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid device url '{0}' (expected http:// or https://)")]
    InvalidUrl(String),
    #[error("could not build http client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("device answered HTTP {status}: {body}")]
    Status { status: u16, body: String },
}

/// Request/response channel to a device.
///
/// A call suspends only the operation that issued it; there is no retry and no
/// cancellation.
pub trait Transport: Send + Sync {
    /// POST a serialized request to the JSON endpoint and return the raw answer
    fn call(&self, body: String) -> impl Future<Output = Result<String, TransportError>> + Send;

    /// POST raw bytes to the upload endpoint under `filename`
    fn upload(
        &self,
        filename: &str,
        bytes: Vec<u8>,
    ) -> impl Future<Output = Result<String, TransportError>> + Send;
}

fn join_url(base: &str, endpoint: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), endpoint.trim_start_matches('/'))
}

#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    json_url: String,
    upload_url: String,
}

impl HttpTransport {
    pub fn new(
        device_url: &str,
        json_endpoint: &str,
        upload_endpoint: &str,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let device_url = device_url.trim();
        if !(device_url.starts_with("http://") || device_url.starts_with("https://")) {
            return Err(TransportError::InvalidUrl(device_url.to_string()));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(TransportError::Client)?;

        let mut upload_url = join_url(device_url, upload_endpoint);
        if !upload_url.ends_with('/') {
            upload_url.push('/');
        }

        Ok(HttpTransport {
            client,
            json_url: join_url(device_url, json_endpoint),
            upload_url,
        })
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self, TransportError> {
        Self::new(
            &config.device_url,
            &config.json_endpoint,
            &config.upload_endpoint,
            Duration::from_millis(config.request_timeout_ms),
        )
    }

    pub fn json_url(&self) -> &str {
        &self.json_url
    }

    async fn finish(url: &str, response: reqwest::Response) -> Result<String, TransportError> {
        let status = response.status();
        let body = response.text().await.map_err(|source| TransportError::Http {
            url: url.to_string(),
            source,
        })?;
        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }
}

impl Transport for HttpTransport {
    async fn call(&self, body: String) -> Result<String, TransportError> {
        debug!(url = %self.json_url, bytes = body.len(), "json request");
        let response = self
            .client
            .post(&self.json_url)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|source| TransportError::Http {
                url: self.json_url.clone(),
                source,
            })?;
        Self::finish(&self.json_url, response).await
    }

    async fn upload(&self, filename: &str, bytes: Vec<u8>) -> Result<String, TransportError> {
        let url = format!("{}{}", self.upload_url, filename);
        debug!(url = %url, bytes = bytes.len(), "file upload");
        let response = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(bytes)
            .send()
            .await
            .map_err(|source| TransportError::Http {
                url: url.clone(),
                source,
            })?;
        Self::finish(&url, response).await
    }
}

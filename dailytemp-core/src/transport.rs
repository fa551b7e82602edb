use async_trait::async_trait;
use reqwest::{Client, Url};
use std::fmt::Debug;

use crate::error::{ConfigError, TransportError};

/// Status line and raw body of a completed HTTP exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Body as text, for diagnostics. Invalid UTF-8 is replaced.
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Performs one GET. Timeouts and connection limits are applied by the caller.
#[async_trait]
pub trait Transport: Send + Sync + Debug {
    async fn get(&self, url: Url) -> Result<HttpResponse, TransportError>;
}

/// Pooled HTTPS transport backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    http: Client,
}

impl ReqwestTransport {
    pub fn new(max_connections: usize) -> Result<Self, ConfigError> {
        let http = Client::builder()
            .pool_max_idle_per_host(max_connections)
            .build()
            .map_err(ConfigError::HttpClient)?;

        Ok(Self { http })
    }

    pub fn with_client(http: Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get(&self, url: Url) -> Result<HttpResponse, TransportError> {
        let res = self.http.get(url).send().await.map_err(send_error)?;

        let status = res.status().as_u16();
        let body = res.bytes().await?;

        Ok(HttpResponse {
            status,
            body: body.to_vec(),
        })
    }
}

fn send_error(err: reqwest::Error) -> TransportError {
    if err.is_connect() {
        TransportError::Connection(format!("{:#}", anyhow::Error::new(err)))
    } else {
        TransportError::Http(err)
    }
}

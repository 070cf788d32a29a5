use std::sync::Arc;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::error::ExplorerError;

/// `{success, result}` wrapper every portal action responds with.
#[derive(Debug, Deserialize)]
pub struct ApiEnvelope<T> {
    #[serde(default)]
    pub success: bool,
    pub result: Option<T>,
}

/// Status and body of one completed HTTP exchange.
#[derive(Debug, Clone)]
pub struct HttpReply {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_rate_limited(&self) -> bool {
        self.status == 429
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ExplorerError> {
        serde_json::from_slice(&self.body).map_err(|err| ExplorerError::Payload(err.to_string()))
    }
}

/// One GET against the portal. Errors are transport-level only: a reply with
/// any status code is `Ok`.
pub trait PortalTransport: Send + Sync {
    fn get(
        &self,
        url: &str,
        query: &[(&str, String)],
        timeout: Duration,
    ) -> Result<HttpReply, ExplorerError>;
}

impl<T: PortalTransport + ?Sized> PortalTransport for &T {
    fn get(
        &self,
        url: &str,
        query: &[(&str, String)],
        timeout: Duration,
    ) -> Result<HttpReply, ExplorerError> {
        (**self).get(url, query, timeout)
    }
}

impl<T: PortalTransport + ?Sized> PortalTransport for Arc<T> {
    fn get(
        &self,
        url: &str,
        query: &[(&str, String)],
        timeout: Duration,
    ) -> Result<HttpReply, ExplorerError> {
        (**self).get(url, query, timeout)
    }
}

#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, ExplorerError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("mtl-data/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| ExplorerError::Transport(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|err| ExplorerError::Transport(err.to_string()))?;
        Ok(Self { client })
    }
}

impl PortalTransport for HttpTransport {
    fn get(
        &self,
        url: &str,
        query: &[(&str, String)],
        timeout: Duration,
    ) -> Result<HttpReply, ExplorerError> {
        tracing::debug!(url, ?query, "portal.request");
        let response = self
            .client
            .get(url)
            .query(query)
            .timeout(timeout)
            .send()
            .map_err(|err| ExplorerError::Transport(describe(&err)))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .map_err(|err| ExplorerError::Transport(describe(&err)))?
            .to_vec();
        tracing::debug!(url, status, bytes = body.len(), "portal.response");
        Ok(HttpReply { status, body })
    }
}

fn describe(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        format!("timed out: {err}")
    } else if err.is_connect() {
        format!("connection failed: {err}")
    } else {
        err.to_string()
    }
}

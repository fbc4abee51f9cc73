//! HTTP plumbing between the client and the WM server.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::{Result, WmError};
use crate::model::LookupRequest;

/// Default connection timeout
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default total transfer timeout
pub const DEFAULT_TRANSFER_TIMEOUT: Duration = Duration::from_secs(60);

/// Version of this client API, reported in the outbound `User-Agent`
pub const CLIENT_API_VERSION: &str = env!("CARGO_PKG_VERSION");

/// `User-Agent` sent by the client, appended to any pass-through value
pub fn client_user_agent(passthrough: Option<&str>) -> String {
    format!(
        "{}rust-wmclient-api-{}",
        passthrough.unwrap_or_default(),
        CLIENT_API_VERSION
    )
}

/// Where the WM server lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    scheme: String,
    host: String,
    port: String,
    base_uri: String,
}

impl Endpoint {
    /// Validate and build an endpoint. An empty scheme means `http`.
    pub fn new(scheme: &str, host: &str, port: &str, base_uri: &str) -> Result<Self> {
        let scheme = match scheme.trim() {
            "" => "http".to_string(),
            s => s.to_ascii_lowercase(),
        };
        if scheme != "http" && scheme != "https" {
            return Err(WmError::InvalidConfig(format!(
                "unsupported protocol scheme \"{}\"",
                scheme
            )));
        }

        let host = host.trim();
        if host.is_empty() {
            return Err(WmError::InvalidConfig("no host in request URL".to_string()));
        }

        Ok(Self {
            scheme,
            host: host.to_string(),
            port: port.trim().to_string(),
            base_uri: base_uri.trim().trim_matches('/').to_string(),
        })
    }

    /// Full URL for an API path such as `/v2/getinfo/json`
    pub fn url(&self, path: &str) -> String {
        let mut url = format!("{}://{}", self.scheme, self.host);
        if !self.port.is_empty() {
            url.push(':');
            url.push_str(&self.port);
        }
        if !self.base_uri.is_empty() {
            url.push('/');
            url.push_str(&self.base_uri);
        }
        url.push_str(path);
        url
    }
}

/// Raw response from the server
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Decode the JSON body of a 2xx response. Any other status is an error,
    /// whatever the body holds.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        if !self.is_success() {
            return Err(self.status_error());
        }
        Ok(serde_json::from_slice(&self.body)?)
    }

    pub fn status_error(&self) -> WmError {
        WmError::Status {
            status: self.status,
            body: String::from_utf8_lossy(&self.body).into_owned(),
        }
    }
}

/// Request/response seam to the WM server
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, path: &str) -> Result<HttpResponse>;

    async fn post_json(&self, path: &str, body: &LookupRequest) -> Result<HttpResponse>;
}

/// [`Transport`] backed by a pooled `reqwest` client
#[derive(Debug, Clone)]
pub struct HttpTransport {
    endpoint: Endpoint,
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(endpoint: Endpoint, connect_timeout: Duration, transfer_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(transfer_timeout)
            .pool_max_idle_per_host(100)
            .user_agent(client_user_agent(None))
            .build()?;

        Ok(Self { endpoint, client })
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    async fn read(resp: reqwest::Response) -> Result<HttpResponse> {
        let status = resp.status().as_u16();
        let body = resp.bytes().await?.to_vec();
        Ok(HttpResponse { status, body })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, path: &str) -> Result<HttpResponse> {
        let url = self.endpoint.url(path);
        tracing::debug!("GET {}", url);
        let resp = self.client.get(&url).send().await?;
        Self::read(resp).await
    }

    async fn post_json(&self, path: &str, body: &LookupRequest) -> Result<HttpResponse> {
        let url = self.endpoint.url(path);
        tracing::debug!("POST {}", url);
        let resp = self.client.post(&url).json(body).send().await?;
        Self::read(resp).await
    }
}

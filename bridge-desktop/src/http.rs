//! `HttpClient` over reqwest.

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    http::{HttpClient, HttpMethod, HttpRequest, HttpResponse},
};
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Reqwest-backed client.
///
/// Makes a single attempt by default: an intercepted request that cannot
/// reach the server must fall back to the cache quickly. Hosts on flaky
/// links can allow a few transport-level retries for GET and HEAD with
/// [`with_transport_retries`](Self::with_transport_retries). Error statuses
/// are responses and are never retried.
pub struct ReqwestHttpClient {
    client: Client,
    transport_retries: u32,
    retry_delay: Duration,
}

impl ReqwestHttpClient {
    pub fn new() -> Result<Self> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(CONNECT_TIMEOUT.min(timeout))
            .user_agent(concat!("learnpath-offline/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| BridgeError::OperationFailed(format!("Cannot build HTTP client: {}", e)))?;

        Ok(Self::with_client(client))
    }

    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            transport_retries: 0,
            retry_delay: Duration::from_millis(200),
        }
    }

    pub fn with_transport_retries(mut self, retries: u32, delay: Duration) -> Self {
        self.transport_retries = retries;
        self.retry_delay = delay;
        self
    }

    fn method(method: HttpMethod) -> reqwest::Method {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Head => reqwest::Method::HEAD,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
        }
    }

    async fn send_once(&self, request: &HttpRequest) -> Result<HttpResponse> {
        let mut builder = self
            .client
            .request(Self::method(request.method), &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await.map_err(network_error)?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect();
        let body = response.bytes().await.map_err(network_error)?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

fn network_error(e: reqwest::Error) -> BridgeError {
    if e.is_timeout() {
        BridgeError::Network(format!("Request timed out: {}", e))
    } else {
        BridgeError::Network(e.to_string())
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        let attempts = if request.method.is_safe() {
            self.transport_retries + 1
        } else {
            1
        };

        let mut attempt = 1;
        loop {
            match self.send_once(&request).await {
                Ok(response) => {
                    debug!(method = %request.method, url = %request.url, status = response.status, "HTTP response");
                    return Ok(response);
                }
                Err(e) if attempt < attempts => {
                    warn!(url = %request.url, attempt, error = %e, "Transport failure, retrying");
                    tokio::time::sleep(self.retry_delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    debug!(method = %request.method, url = %request.url, error = %e, "Server unreachable");
                    return Err(e);
                }
            }
        }
    }
}

//! reqwest-backed implementation of the fetch primitive.

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info, trace};

use crate::{NetError, Network, Request, Response};

/// Transport configuration.
///
/// No request timeout is set here: a hung fetch stays open until the
/// transport itself gives up.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// User agent string.
    pub user_agent: String,
    /// Maximum redirects.
    pub max_redirects: usize,
    /// Enable cookies (session auth rides on them).
    pub cookies_enabled: bool,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("Kindred/{}", env!("CARGO_PKG_VERSION")),
            max_redirects: 10,
            cookies_enabled: true,
        }
    }
}

/// Real network transport.
pub struct HttpNetwork {
    client: Client,
}

impl HttpNetwork {
    /// Create a new transport.
    pub fn new(config: NetworkConfig) -> Result<Self, NetError> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .cookie_store(config.cookies_enabled)
            .build()
            .map_err(|e| NetError::RequestFailed(e.to_string()))?;

        info!(user_agent = %config.user_agent, "HttpNetwork initialized");

        Ok(Self { client })
    }
}

#[async_trait]
impl Network for HttpNetwork {
    async fn fetch(&self, request: Request) -> Result<Response, NetError> {
        debug!(url = %request.url, method = %request.method, mode = %request.mode, "Fetching from network");

        let mut req_builder = self
            .client
            .request(request.method.clone(), request.url.clone())
            .headers(request.headers.clone());

        if let Some(body) = request.body {
            req_builder = req_builder.body(body);
        }

        let response = req_builder.send().await?;

        let status = response.status();
        let headers = response.headers().clone();
        let url = response.url().clone();
        let body = response.bytes().await?;

        trace!(
            url = %url,
            status = %status,
            body_len = body.len(),
            "Response received"
        );

        Ok(Response::new(url, status, headers, body))
    }
}

//! Shared API client handed to remotes
//!
//! The bearer token is read from a getter on every request, so a token
//! refreshed in the host auth container is picked up by the next call
//! without anyone re-subscribing.

use crate::core::ApiConfig;
use portal_bridge_core::{AuthAdapter, Error, Result};
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Live bearer token getter
pub type TokenSource = Arc<dyn Fn() -> Option<String> + Send + Sync>;

/// HTTP client with a base URL, a timeout and live bearer auth
#[derive(Clone)]
pub struct SharedApiClient {
    http: reqwest::Client,
    base_url: String,
    token: TokenSource,
}

impl fmt::Debug for SharedApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedApiClient").field("base_url", &self.base_url).finish()
    }
}

impl SharedApiClient {
    /// Build a client reading its token from `token`
    pub fn new(config: &ApiConfig, token: TokenSource) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::http(None, format!("client setup: {}", e)))?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    /// Build a client reading its token from the host auth container
    pub fn from_auth(config: &ApiConfig, auth: Arc<dyn AuthAdapter>) -> Result<Self> {
        Self::new(config, Arc::new(move || auth.access_token()))
    }

    /// Base URL requests are joined onto
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL of `path`
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Request builder for `path` with the current bearer token attached
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.http.request(method, self.url(path));
        match (self.token)() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// GET `path` and decode the JSON body
    pub async fn get_json<R: DeserializeOwned>(&self, path: &str) -> Result<R> {
        let response = send(self.request(Method::GET, path)).await?;
        decode(response).await
    }

    /// POST `body` as JSON to `path` and decode the JSON reply
    pub async fn post_json<B, R>(&self, path: &str, body: &B) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let response = send(self.request(Method::POST, path).json(body)).await?;
        decode(response).await
    }
}

async fn send(builder: RequestBuilder) -> Result<Response> {
    let response = builder
        .send()
        .await
        .map_err(|e| Error::http(e.status().map(|s| s.as_u16()), e.to_string()))?;

    let status = response.status();
    debug!(status = status.as_u16(), url = %response.url(), "api response");
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(Error::http(Some(status.as_u16()), body));
    }
    Ok(response)
}

async fn decode<R: DeserializeOwned>(response: Response) -> Result<R> {
    response
        .json::<R>()
        .await
        .map_err(|e| Error::http(None, format!("response body: {}", e)))
}

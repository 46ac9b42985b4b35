//! `reqwest`-backed [`HttpTransport`] for grids bound to a remote controller.

use std::time::Duration;

use async_trait::async_trait;
use lgrid_core::{GridError, HttpMethod, HttpRequest, HttpResponse, HttpTransport};
use log::debug;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Sends grid requests relative to a base address. Auth context is carried
/// as default headers, e.g. a bearer token issued by the host.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    base_url: String,
    headers: Vec<(String, String)>,
}

impl ReqwestTransport {
    pub fn new(base_url: impl Into<String>) -> Result<Self, GridError> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(transport_error)?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            headers: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_bearer_token(self, token: &str) -> Self {
        self.with_header("Authorization", format!("Bearer {}", token))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL for a request path, with its query string.
    pub fn url_for(&self, request: &HttpRequest) -> String {
        let target = request.path_and_query();
        if target.starts_with("http://") || target.starts_with("https://") {
            return target;
        }
        format!("{}/{}", self.base_url, target.trim_start_matches('/'))
    }
}

fn method_of(method: HttpMethod) -> reqwest::Method {
    match method {
        HttpMethod::Get => reqwest::Method::GET,
        HttpMethod::Post => reqwest::Method::POST,
        HttpMethod::Put => reqwest::Method::PUT,
        HttpMethod::Delete => reqwest::Method::DELETE,
    }
}

fn transport_error(err: reqwest::Error) -> GridError {
    if err.is_timeout() {
        GridError::Transport(format!("request timed out: {}", err))
    } else {
        GridError::Transport(err.to_string())
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, GridError> {
        let url = self.url_for(&request);
        let mut builder = self.client.request(method_of(request.method), &url);
        for (name, value) in &self.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(transport_error)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(transport_error)?;
        debug!("{} {} -> {}", request.method.as_str(), url, status);

        Ok(HttpResponse::new(status, body))
    }
}

/// Installs `env_logger` with `info` as the default level.
pub fn init_logging() -> Result<(), log::SetLoggerError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .try_init()
}

//! HTTP seam shared by the remote loader, row controller and profile store.

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::{CancelToken, DataPage, DataPageLoader, DataRequest, GridError, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    /// Path relative to the transport's base address.
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Put, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Delete, path)
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn with_json<B: Serialize>(mut self, body: &B) -> Result<Self, GridError> {
        self.body = Some(serde_json::to_value(body)?);
        Ok(self)
    }

    /// Path plus URL-encoded query string.
    pub fn path_and_query(&self) -> String {
        if self.query.is_empty() {
            return self.path.clone();
        }
        let query: Vec<String> = self
            .query
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect();
        format!("{}?{}", self.path, query.join("&"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn ok_json<B: Serialize>(body: &B) -> Result<Self, GridError> {
        Ok(Self::new(200, serde_json::to_string(body)?))
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Maps non-success statuses to errors; 400 bodies with an `errors`
    /// list become [`GridError::RowValidation`].
    pub fn error_for_status(self) -> Result<Self, GridError> {
        if self.is_success() {
            return Ok(self);
        }

        match self.status {
            400 => match serde_json::from_str::<ValidationProblem>(&self.body) {
                Ok(problem) if !problem.errors.is_empty() => {
                    Err(GridError::RowValidation(problem.errors))
                }
                _ => Err(GridError::remote(self.status, self.body)),
            },
            401 | 403 => Err(GridError::Unauthorized(self.body)),
            404 => Err(GridError::NotFound(self.body)),
            status => Err(GridError::remote(status, self.body)),
        }
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, GridError> {
        Ok(serde_json::from_str(&self.body)?)
    }
}

#[derive(Debug, Deserialize)]
struct ValidationProblem {
    #[serde(default)]
    errors: Vec<String>,
}

/// Sends requests to the host application's backend. The host supplies the
/// auth context (cookies, bearer token) through its implementation.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, GridError>;
}

/// Sends `request` and fails fast when `cancel` fires.
pub async fn send_checked(
    transport: &dyn HttpTransport,
    request: HttpRequest,
    cancel: &CancelToken,
) -> Result<HttpResponse, GridError> {
    let method = request.method;
    let target = request.path_and_query();
    log::debug!("{} {}", method.as_str(), target);

    let response = cancel.run(transport.send(request)).await?;
    response.error_for_status()
}

/// Path builders for the paged-query / row controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerPaths {
    base: String,
}

impl ControllerPaths {
    pub fn new(controller_uri: &str) -> Self {
        Self {
            base: controller_uri.trim_end_matches('/').to_string(),
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn page(&self) -> String {
        format!("{}/page", self.base)
    }

    pub fn selector_values(&self) -> String {
        format!("{}/selector-values", self.base)
    }

    pub fn calculations(&self) -> String {
        format!("{}/calculations", self.base)
    }
}

/// Loads pages from the remote controller.
pub struct RemoteLoader<T> {
    transport: Arc<dyn HttpTransport>,
    paths: ControllerPaths,
    _item: PhantomData<fn() -> T>,
}

impl<T> RemoteLoader<T> {
    pub fn new(transport: Arc<dyn HttpTransport>, controller_uri: &str) -> Self {
        Self {
            transport,
            paths: ControllerPaths::new(controller_uri),
            _item: PhantomData,
        }
    }

    pub fn paths(&self) -> &ControllerPaths {
        &self.paths
    }
}

#[async_trait]
impl<T> DataPageLoader<T> for RemoteLoader<T>
where
    T: DeserializeOwned + Send + Sync + 'static,
{
    async fn get_data_page(
        &self,
        request: &DataRequest,
        cancel: &CancelToken,
    ) -> Result<DataPage<T>, GridError> {
        let http = HttpRequest::post(self.paths.page()).with_json(request)?;
        let response = send_checked(self.transport.as_ref(), http, cancel).await?;
        let page: DataPage<T> = response.json()?;

        log::debug!(
            "Remote page {} ({} rows, total {:?})",
            page.current_page,
            page.data.len(),
            page.total_rows
        );

        Ok(page)
    }

    async fn get_selector_values(
        &self,
        field: &str,
        request: &DataRequest,
        cancel: &CancelToken,
    ) -> Result<Vec<Value>, GridError> {
        let http = HttpRequest::post(self.paths.selector_values())
            .with_query("field", field)
            .with_json(request)?;
        let response = send_checked(self.transport.as_ref(), http, cancel).await?;
        response.json()
    }

    async fn get_calculations(
        &self,
        request: &DataRequest,
        cancel: &CancelToken,
    ) -> Result<IndexMap<String, Value>, GridError> {
        let http = HttpRequest::post(self.paths.calculations()).with_json(request)?;
        let response = send_checked(self.transport.as_ref(), http, cancel).await?;
        response.json()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_string_is_encoded() {
        let request = HttpRequest::get("api/items").with_query("field", "a b&c");
        assert_eq!(request.path_and_query(), "api/items?field=a%20b%26c");
    }

    #[test]
    fn validation_body_becomes_row_validation() {
        let response = HttpResponse::new(400, r#"{"errors":["Name is required"]}"#);
        match response.error_for_status() {
            Err(GridError::RowValidation(errors)) => assert_eq!(errors, vec!["Name is required"]),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn other_statuses_map_to_errors() {
        assert!(matches!(
            HttpResponse::new(404, "gone").error_for_status(),
            Err(GridError::NotFound(_))
        ));
        assert!(matches!(
            HttpResponse::new(500, "boom").error_for_status(),
            Err(GridError::Remote { status: 500, .. })
        ));
        assert!(matches!(
            HttpResponse::new(400, "plain").error_for_status(),
            Err(GridError::Remote { status: 400, .. })
        ));
    }

    #[test]
    fn controller_paths_trim_trailing_slash() {
        let paths = ControllerPaths::new("api/people/");
        assert_eq!(paths.page(), "api/people/page");
        assert_eq!(paths.selector_values(), "api/people/selector-values");
    }
}

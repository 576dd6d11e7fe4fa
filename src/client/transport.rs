//! The network seam of the API client.
//!
//! [`ApiClient`](super::ApiClient) only ever talks to a [`Transport`]; the
//! production implementation wraps `reqwest`, tests script their own.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, ACCEPT};
use reqwest::multipart::{Form, Part};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;

/// Payload attached to an outbound request.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Empty,
    Json(serde_json::Value),
    /// A single file sent as `multipart/form-data`.
    File {
        field: String,
        filename: String,
        bytes: Vec<u8>,
    },
}

/// A request with its URL resolved and its bearer token chosen.
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    pub method: Method,
    pub url: String,
    pub query: Vec<(String, String)>,
    /// Access token sent as `Authorization: Bearer <token>`; `None` sends no header.
    pub bearer: Option<String>,
    pub body: RequestBody,
}

impl PreparedRequest {
    /// Value of the `Authorization` header this request will carry.
    pub fn authorization(&self) -> Option<String> {
        self.bearer.as_ref().map(|token| format!("Bearer {token}"))
    }
}

/// A fully buffered response.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl ApiResponse {
    pub fn new(status: StatusCode, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    /// Builds a response whose body is the serialized `value`.
    pub fn json_body(status: StatusCode, value: &serde_json::Value) -> Self {
        Self::new(status, value.to_string())
    }

    /// Decodes the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    /// Returns the body as text, replacing invalid UTF-8.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// The `detail` field of a JSON error body, if present.
    pub fn detail(&self) -> Option<String> {
        let value: serde_json::Value = self.json().ok()?;
        value.get("detail")?.as_str().map(str::to_owned)
    }
}

/// Failure to get any response at all.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    Other(String),
}

/// Executes prepared requests.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: PreparedRequest) -> Result<ApiResponse, TransportError>;
}

/// `reqwest`-backed transport.
#[derive(Clone)]
pub struct ReqwestTransport {
    http: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(&self, request: PreparedRequest) -> Result<ApiResponse, TransportError> {
        let mut builder = self
            .http
            .request(request.method, &request.url)
            .header(ACCEPT, "application/json");

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(token) = &request.bearer {
            builder = builder.bearer_auth(token);
        }

        builder = match request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(&value),
            RequestBody::File {
                field,
                filename,
                bytes,
            } => builder.multipart(Form::new().part(field, Part::bytes(bytes).file_name(filename))),
        };

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?.to_vec();

        Ok(ApiResponse {
            status,
            headers,
            body,
        })
    }
}

//! Authenticated access to the dashboard backend.
//!
//! Every request goes through [`ApiClient::send`], which attaches the current
//! access token and recovers from token expiry:
//!
//! 1. The request is transmitted with the stored access token (if any).
//! 2. A `401` carrying [`TOKEN_EXPIRED_DETAIL`] on a request that has not been
//!    retried yet hands control to the [`RefreshCoordinator`]. Exactly one
//!    caller refreshes; concurrent callers wait for its outcome.
//! 3. The request is retransmitted once with the new access token. A second
//!    rejection is reported as [`ClientError::Unauthorized`].
//!
//! Refresh failures are never retried; every waiter receives the same
//! [`RefreshError`].

pub mod refresh;
pub mod transport;

use std::io;
use std::sync::Arc;

use log::{debug, info, warn};
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::json;

use crate::config::ClientConfig;
use crate::model::ReportError;
use crate::session::{TokenPair, TokenStore};

pub use refresh::{RefreshCoordinator, RefreshError, RefreshState};
pub use transport::{
    ApiResponse, PreparedRequest, ReqwestTransport, RequestBody, Transport, TransportError,
};

use refresh::{Begin, RefreshOutcome};

/// `detail` value the backend sends when the access token has expired.
pub const TOKEN_EXPIRED_DETAIL: &str = "Given token not valid for any token type";

/// Endpoint that exchanges a refresh token for a new pair.
pub const REFRESH_ENDPOINT: &str = "/users/token/refresh/";

/// A replayable request relative to the configured base URL.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    body: RequestBody,
    retried: bool,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: RequestBody::Empty,
            retried: false,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Sets a JSON body and returns the updated request.
    pub fn with_json(mut self, body: serde_json::Value) -> Self {
        self.body = RequestBody::Json(body);
        self
    }

    /// Sets a single-file multipart body and returns the updated request.
    pub fn with_file(
        mut self,
        field: impl Into<String>,
        filename: impl Into<String>,
        bytes: impl Into<Vec<u8>>,
    ) -> Self {
        self.body = RequestBody::File {
            field: field.into(),
            filename: filename.into(),
            bytes: bytes.into(),
        };
        self
    }

    /// Appends a query parameter and returns the updated request.
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Whether this request is the single retransmission after a refresh.
    pub fn is_retry(&self) -> bool {
        self.retried
    }

    fn into_retry(mut self) -> Self {
        self.retried = true;
        self
    }
}

/// Errors surfaced to callers of the client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("unauthorized: {}", .detail.as_deref().unwrap_or("no detail"))]
    Unauthorized { detail: Option<String> },

    #[error("server error {status}: {body}")]
    Server { status: StatusCode, body: String },

    #[error("request failed with {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("token refresh failed: {0}")]
    Refresh(#[from] RefreshError),

    #[error("failed to decode response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("token storage failed: {0}")]
    Storage(#[from] io::Error),

    #[error(transparent)]
    Report(#[from] ReportError),
}

impl ClientError {
    /// True for failures that mean the session is no longer usable.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::Unauthorized { .. } | Self::Refresh(_))
    }

    pub fn is_server_error(&self) -> bool {
        matches!(self, Self::Server { .. })
    }

    /// HTTP status of the failed response, when there was one.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Unauthorized { .. } => Some(StatusCode::UNAUTHORIZED),
            Self::Server { status, .. } | Self::Status { status, .. } => Some(*status),
            Self::Refresh(RefreshError::Rejected { status, .. }) => Some(*status),
            _ => None,
        }
    }

    /// Short notification text suitable for showing to an end user.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Unauthorized { .. } | Self::Refresh(_) => {
                "Unauthorized access. Please log in again."
            }
            Self::Server { .. } => "Server error. Try again later.",
            Self::Transport(_) => "Network error. Please check your connection and try again.",
            _ => "The request could not be completed.",
        }
    }
}

#[derive(Deserialize)]
struct RefreshResponse {
    access: String,
    #[serde(default)]
    refresh: Option<String>,
}

struct ClientInner {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    tokens: Arc<dyn TokenStore>,
    refresh: RefreshCoordinator,
}

/// Cloneable handle; clones share tokens and refresh state.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ClientInner>,
}

impl ApiClient {
    pub fn new(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        tokens: Arc<dyn TokenStore>,
    ) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                config,
                transport,
                tokens,
                refresh: RefreshCoordinator::new(),
            }),
        }
    }

    /// Builds a client backed by [`ReqwestTransport`].
    pub fn from_config(
        config: ClientConfig,
        tokens: Arc<dyn TokenStore>,
    ) -> Result<Self, ClientError> {
        let transport = ReqwestTransport::new(config.timeout)?;
        Ok(Self::new(config, Arc::new(transport), tokens))
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn tokens(&self) -> &dyn TokenStore {
        self.inner.tokens.as_ref()
    }

    pub fn refresh_state(&self) -> RefreshState {
        self.inner.refresh.state()
    }

    /// Number of refreshes that have completed, successfully or not.
    pub fn refresh_count(&self) -> u64 {
        self.inner.refresh.completed()
    }

    /// Installs a new session, e.g. from a login response.
    pub fn set_tokens(&self, pair: &TokenPair) -> Result<(), ClientError> {
        self.inner.tokens.save(pair)?;
        Ok(())
    }

    /// Forgets the current session.
    pub fn logout(&self) -> Result<(), ClientError> {
        self.inner.tokens.clear()?;
        info!("Session cleared");
        Ok(())
    }

    /// Sends `request`, refreshing the access token once if it has expired.
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ClientError> {
        let token = self.inner.tokens.access_token();
        let response = self.transmit(&request, token.clone()).await?;

        if request.is_retry() || !is_token_expired(&response) {
            return check_status(response);
        }

        debug!(
            "Access token rejected for {} {}; recovering",
            request.method(),
            request.path()
        );
        let fresh = self.recover_access_token(token.as_deref()).await?;
        let retry = request.into_retry();
        let response = self.transmit(&retry, Some(fresh)).await?;
        check_status(response)
    }

    /// Sends `request` and decodes a successful JSON body.
    pub async fn send_json<T>(&self, request: ApiRequest) -> Result<T, ClientError>
    where
        T: serde::de::DeserializeOwned,
    {
        let response = self.send(request).await?;
        Ok(response.json()?)
    }

    async fn transmit(
        &self,
        request: &ApiRequest,
        bearer: Option<String>,
    ) -> Result<ApiResponse, ClientError> {
        let prepared = PreparedRequest {
            method: request.method.clone(),
            url: self.inner.config.endpoint(&request.path),
            query: request.query.clone(),
            bearer,
            body: request.body.clone(),
        };
        Ok(self.inner.transport.execute(prepared).await?)
    }

    async fn recover_access_token(&self, used: Option<&str>) -> Result<String, ClientError> {
        let tokens = &self.inner.tokens;
        let begin = self.inner.refresh.begin(|| {
            tokens
                .access_token()
                .filter(|current| Some(current.as_str()) != used)
        });

        match begin {
            Begin::Rotated(token) => {
                debug!("Access token was rotated by an earlier refresh; retrying");
                Ok(token)
            }
            Begin::Follower(pending) => {
                debug!("Refresh already in flight; waiting for it to settle");
                Ok(pending.wait().await?)
            }
            Begin::Leader => {
                let outcome = self.request_new_pair().await;
                let drained = self.inner.refresh.settle(&outcome);
                match &outcome {
                    Ok(_) => {
                        info!("Access token refreshed; replaying {} queued request(s)", drained)
                    }
                    Err(err) => warn!(
                        "Token refresh failed ({}); rejecting {} queued request(s)",
                        err, drained
                    ),
                }
                Ok(outcome?)
            }
        }
    }

    async fn request_new_pair(&self) -> RefreshOutcome {
        let refresh_token = self
            .inner
            .tokens
            .refresh_token()
            .filter(|token| !token.is_empty())
            .ok_or(RefreshError::MissingRefreshToken)?;

        let prepared = PreparedRequest {
            method: Method::POST,
            url: self.inner.config.endpoint(REFRESH_ENDPOINT),
            query: Vec::new(),
            bearer: None,
            body: RequestBody::Json(json!({ "refresh": refresh_token })),
        };

        let response = self
            .inner
            .transport
            .execute(prepared)
            .await
            .map_err(|err| RefreshError::Transport(err.to_string()))?;

        if !response.status.is_success() {
            return Err(RefreshError::Rejected {
                status: response.status,
                body: response.text(),
            });
        }

        let body: RefreshResponse = response
            .json()
            .map_err(|err| RefreshError::Malformed(err.to_string()))?;
        let pair = TokenPair::new(body.access, body.refresh.unwrap_or(refresh_token));
        self.inner
            .tokens
            .save(&pair)
            .map_err(|err| RefreshError::Storage(err.to_string()))?;

        Ok(pair.access_token)
    }
}

/// Whether `response` is the backend's "access token expired" rejection.
pub fn is_token_expired(response: &ApiResponse) -> bool {
    response.status == StatusCode::UNAUTHORIZED
        && response.detail().as_deref() == Some(TOKEN_EXPIRED_DETAIL)
}

fn check_status(response: ApiResponse) -> Result<ApiResponse, ClientError> {
    let status = response.status;
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::UNAUTHORIZED {
        return Err(ClientError::Unauthorized {
            detail: response.detail(),
        });
    }
    if status.is_server_error() {
        return Err(ClientError::Server {
            status,
            body: response.text(),
        });
    }
    Err(ClientError::Status {
        status,
        body: response.text(),
    })
}

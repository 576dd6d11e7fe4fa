#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use athlete_report::client::{
    ApiClient, ApiResponse, PreparedRequest, RequestBody, Transport, TransportError,
    REFRESH_ENDPOINT, TOKEN_EXPIRED_DETAIL,
};
use athlete_report::config::ClientConfig;
use athlete_report::session::{MemoryTokenStore, TokenPair, TokenStore};
use reqwest::StatusCode;
use serde_json::{json, Value};
use tokio::sync::Barrier;

pub const BASE_URL: &str = "http://backend.test/api";

type Handler = dyn Fn(&PreparedRequest) -> ApiResponse + Send + Sync;

/// Transport that answers from a closure and records every request.
pub struct ScriptedTransport {
    handler: Box<Handler>,
    log: Mutex<Vec<PreparedRequest>>,
    refresh_delay: Duration,
    gate: Option<Arc<Barrier>>,
}

impl ScriptedTransport {
    pub fn new(handler: impl Fn(&PreparedRequest) -> ApiResponse + Send + Sync + 'static) -> Self {
        Self {
            handler: Box::new(handler),
            log: Mutex::new(Vec::new()),
            refresh_delay: Duration::from_millis(0),
            gate: None,
        }
    }

    /// Delays refresh responses so concurrent callers pile up behind the leader.
    pub fn with_refresh_delay(mut self, delay: Duration) -> Self {
        self.refresh_delay = delay;
        self
    }

    /// Holds first attempts (sent with `A1`) until `parties` of them have arrived.
    pub fn with_gate(mut self, parties: usize) -> Self {
        self.gate = Some(Arc::new(Barrier::new(parties)));
        self
    }

    pub fn requests(&self) -> Vec<PreparedRequest> {
        self.log.lock().unwrap().clone()
    }

    pub fn refresh_calls(&self) -> usize {
        self.requests().iter().filter(|r| is_refresh(r)).count()
    }

    pub fn data_calls(&self) -> Vec<PreparedRequest> {
        self.requests().into_iter().filter(|r| !is_refresh(r)).collect()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn execute(&self, request: PreparedRequest) -> Result<ApiResponse, TransportError> {
        self.log.lock().unwrap().push(request.clone());
        if is_refresh(&request) {
            tokio::time::sleep(self.refresh_delay).await;
        } else if let Some(gate) = &self.gate {
            if request.bearer.as_deref() == Some("A1") {
                gate.wait().await;
            }
        }
        Ok((self.handler)(&request))
    }
}

pub fn is_refresh(request: &PreparedRequest) -> bool {
    request.url.ends_with(REFRESH_ENDPOINT)
}

pub fn json_body(request: &PreparedRequest) -> Value {
    match &request.body {
        RequestBody::Json(value) => value.clone(),
        _ => Value::Null,
    }
}

pub fn ok(value: Value) -> ApiResponse {
    ApiResponse::json_body(StatusCode::OK, &value)
}

pub fn expired() -> ApiResponse {
    ApiResponse::json_body(
        StatusCode::UNAUTHORIZED,
        &json!({ "detail": TOKEN_EXPIRED_DETAIL, "code": "token_not_valid" }),
    )
}

/// Backend where `A1` has expired and `R1` refreshes to `A2`/`R2`.
pub fn rotating_backend(request: &PreparedRequest) -> ApiResponse {
    if is_refresh(request) {
        return if json_body(request)["refresh"] == "R1" {
            ok(json!({ "access": "A2", "refresh": "R2" }))
        } else {
            ApiResponse::json_body(
                StatusCode::UNAUTHORIZED,
                &json!({ "detail": "Token is invalid or expired" }),
            )
        };
    }
    match request.bearer.as_deref() {
        Some("A2") => ok(json!({ "ok": true, "path": request.url })),
        _ => expired(),
    }
}

pub fn client_with(
    transport: Arc<ScriptedTransport>,
    pair: Option<TokenPair>,
) -> (ApiClient, Arc<MemoryTokenStore>) {
    let store = Arc::new(match pair {
        Some(pair) => MemoryTokenStore::with_pair(pair),
        None => MemoryTokenStore::new(),
    });
    let tokens: Arc<dyn TokenStore> = store.clone();
    let client = ApiClient::new(ClientConfig::new(BASE_URL), transport, tokens);
    (client, store)
}

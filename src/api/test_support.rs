//! Scripted in-memory backend for gateway tests

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::Notify;

use super::transport::{bearer, ApiRequest, Transport, TransportError, TransportResponse};

pub const BASE: &str = "http://perks.test";

/// A 200 whose body stops well short of its declared length.
pub const TRUNCATED_OK: &[u8] = b"HTTP/1.1 200 OK\r\nContent-Length: 500\r\n\r\n{\"status\":";

/// Serve one connection with `reply` verbatim, then hang up. Returns the base URL.
pub async fn serve_once(reply: &'static [u8]) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut sock, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 4096];
        let _ = sock.read(&mut buf).await;
        sock.write_all(reply).await.unwrap();
        let _ = sock.shutdown().await;
    });
    format!("http://{}", addr)
}

/// Accepts exactly one bearer token; everything else is a 401.
///
/// `/api/auth/refresh` answers with the scripted reply, optionally holding it
/// back until `release_refresh` is called. `/api/auth/login` accepts only
/// `alice`/`secret`. Paths containing `/broken` fail with a bare 503.
pub struct MockBackend {
    valid_token: Mutex<String>,
    refresh_reply: Mutex<Result<Value, TransportError>>,
    login_reply: Value,
    /// Whether a successful refresh makes its new access token valid.
    accept_refreshed: bool,
    gated: bool,
    gate: Notify,
    refresh_calls: AtomicUsize,
    calls: Mutex<Vec<ApiRequest>>,
}

impl MockBackend {
    pub fn new(valid_token: &str) -> Self {
        Self {
            valid_token: Mutex::new(valid_token.to_string()),
            refresh_reply: Mutex::new(Err(TransportError::http(
                401,
                json!({"message": "refresh token expired"}),
            ))),
            login_reply: json!({
                "status": 200,
                "message": "ok",
                "body": {"access_token": "L1", "refresh_token": "LR1"}
            }),
            accept_refreshed: true,
            gated: false,
            gate: Notify::new(),
            refresh_calls: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn refreshing_to(self, access: &str, refresh: &str) -> Self {
        self.refresh_replying(json!({
            "body": {"access_token": access, "refresh_token": refresh}
        }))
    }

    /// Answer refresh calls with an arbitrary 200 payload.
    pub fn refresh_replying(self, data: Value) -> Self {
        *self.refresh_reply.lock().unwrap() = Ok(data);
        self
    }

    pub fn rejecting_refreshed_tokens(mut self) -> Self {
        self.accept_refreshed = false;
        self
    }

    /// Hold refresh replies until `release_refresh`.
    pub fn gated(mut self) -> Self {
        self.gated = true;
        self
    }

    pub fn release_refresh(&self) {
        self.gate.notify_one();
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<ApiRequest> {
        self.calls.lock().unwrap().clone()
    }

    /// URLs of calls that carried `Bearer <token>`, in the order they reached the backend.
    pub fn urls_sent_with(&self, token: &str) -> Vec<String> {
        let expected = bearer(token);
        self.calls()
            .into_iter()
            .filter(|c| c.authorization() == Some(expected.as_str()))
            .map(|c| c.url)
            .collect()
    }

    async fn handle(&self, req: ApiRequest) -> Result<TransportResponse, TransportError> {
        self.calls.lock().unwrap().push(req.clone());

        if req.url.ends_with("/api/auth/refresh") {
            self.refresh_calls.fetch_add(1, Ordering::SeqCst);
            if self.gated {
                self.gate.notified().await;
            }
            let reply = self.refresh_reply.lock().unwrap().clone();
            let data = reply?;
            if self.accept_refreshed {
                if let Some(token) = data["body"]["access_token"].as_str() {
                    *self.valid_token.lock().unwrap() = token.to_string();
                }
            }
            return Ok(TransportResponse { status: 200, data });
        }

        if req.url.ends_with("/api/auth/login") {
            let body = req.body.clone().unwrap_or(Value::Null);
            if body["username"] == "alice" && body["password"] == "secret" {
                let data = self.login_reply.clone();
                return Ok(TransportResponse { status: 200, data });
            }
            return Err(TransportError::http(
                401,
                json!({"message": "bad credentials"}),
            ));
        }

        if req.url.contains("/broken") {
            return Err(TransportError::http(503, Value::Null));
        }

        let expected = bearer(&self.valid_token.lock().unwrap());
        if req.authorization() != Some(expected.as_str()) {
            return Err(TransportError::http(
                401,
                json!({"message": "token expired"}),
            ));
        }

        Ok(TransportResponse {
            status: 200,
            data: json!({
                "status": 200,
                "message": "ok",
                "body": {"method": req.method.as_str(), "url": req.url, "echo": req.body}
            }),
        })
    }
}

impl Transport for MockBackend {
    fn execute(
        &self,
        request: &ApiRequest,
    ) -> impl Future<Output = Result<TransportResponse, TransportError>> + Send {
        self.handle(request.clone())
    }
}

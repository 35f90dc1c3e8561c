//! Outbound request descriptor and the transport seam
//!
//! The gateway only needs `{status, data}` from a success and
//! `{status, data}` from a failure; everything else about HTTP lives here.

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Method;
use serde_json::Value;

pub const AUTHORIZATION: &str = "Authorization";

/// One outbound API call, owned by whoever is currently driving it.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<Value>,
    /// Set by the gateway once this request has been replayed after a refresh.
    pub retried: bool,
}

impl ApiRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: BTreeMap::new(),
            body: None,
            retried: false,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>, body: Value) -> Self {
        Self::new(Method::POST, url).with_body(body)
    }

    pub fn put(url: impl Into<String>, body: Value) -> Self {
        Self::new(Method::PUT, url).with_body(body)
    }

    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(Method::DELETE, url)
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn set_bearer(&mut self, token: &str) {
        self.headers.insert(AUTHORIZATION.to_string(), bearer(token));
    }

    pub fn authorization(&self) -> Option<&str> {
        self.headers.get(AUTHORIZATION).map(String::as_str)
    }
}

pub fn bearer(token: &str) -> String {
    format!("Bearer {}", token)
}

/// Raw transport success: HTTP status plus decoded JSON (`Null` for empty bodies).
#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    pub status: u16,
    pub data: Value,
}

/// Raw transport failure. `status` is `None` when no response arrived at all.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct TransportError {
    pub status: Option<u16>,
    pub data: Option<Value>,
    pub message: String,
}

impl TransportError {
    pub fn http(status: u16, data: Value) -> Self {
        Self {
            status: Some(status),
            data: Some(data),
            message: format!("Request failed with status code {}", status),
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status == Some(401)
    }
}

/// Issues HTTP requests on behalf of the gateway.
pub trait Transport: Send + Sync {
    fn execute(
        &self,
        request: &ApiRequest,
    ) -> impl Future<Output = Result<TransportResponse, TransportError>> + Send;
}

/// `reqwest`-backed transport.
pub struct ReqwestTransport {
    http: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("localperks/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { http })
    }

    /// Read the whole body. A connection that drops mid-body is a transport failure.
    async fn decode(resp: reqwest::Response) -> Result<Value, TransportError> {
        let status = resp.status().as_u16();
        let text = resp.text().await.map_err(|e| TransportError {
            status: Some(status),
            data: None,
            message: e.to_string(),
        })?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
    }
}

impl Transport for ReqwestTransport {
    fn execute(
        &self,
        request: &ApiRequest,
    ) -> impl Future<Output = Result<TransportResponse, TransportError>> + Send {
        let mut builder = self.http.request(request.method.clone(), &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        let url = request.url.clone();

        async move {
            tracing::debug!("HTTP {}", url);
            let resp = builder.send().await.map_err(|e| TransportError {
                status: e.status().map(|s| s.as_u16()),
                data: None,
                message: e.to_string(),
            })?;

            let status = resp.status();
            let data = Self::decode(resp).await?;
            if status.is_success() {
                Ok(TransportResponse {
                    status: status.as_u16(),
                    data,
                })
            } else {
                Err(TransportError::http(status.as_u16(), data))
            }
        }
    }
}

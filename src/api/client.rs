//! Authenticated HTTP client for the LocalPerks backend
//!
//! Wraps a transport with bearer-token injection and a single-flight token
//! refresh: the first request to hit a 401 refreshes the session, requests
//! that hit a 401 meanwhile wait for that refresh and then replay in arrival
//! order, and an unrecoverable refresh logs the session out.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use anyhow::Result;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::watch;

use super::envelope::{interpret, normalize, ApiEnvelope, ApiError};
use super::refresh::{Entry, RefreshCoordinator, Ticket};
use super::transport::{
    bearer, ApiRequest, ReqwestTransport, Transport, TransportError, AUTHORIZATION,
};
use crate::auth::tokens::{TokenPair, TokenStore, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY};
use crate::config::{Config, GatewaySettings};

/// Where the session stands from the caller's point of view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// No tokens yet.
    Anonymous,
    /// Tokens present; requests carry a bearer token.
    Active,
    /// Session ended by the gateway; the user should be sent to `redirect_to`.
    LoggedOut { redirect_to: String },
}

#[derive(Deserialize)]
struct RefreshResponse {
    body: TokenPair,
}

/// Gateway used by the CLI: reqwest transport, tokens persisted in the config file.
pub type LocalPerksClient = ApiClient<ReqwestTransport, Config>;

/// Load config and build the production client.
pub fn connect(base_url: Option<String>) -> Result<LocalPerksClient> {
    let mut config = Config::load()?;
    if let Some(url) = base_url {
        config.gateway.base_url = url;
    }
    let settings = config.gateway.clone();
    let transport = ReqwestTransport::new(Duration::from_secs(settings.timeout_secs))?;
    Ok(ApiClient::new(transport, config, settings))
}

/// Authenticated request gateway. Construct one per process and share it.
pub struct ApiClient<T, S> {
    transport: T,
    store: Mutex<S>,
    settings: GatewaySettings,
    refresh: RefreshCoordinator,
    default_headers: Mutex<BTreeMap<String, String>>,
    session: watch::Sender<SessionState>,
}

impl<T: Transport, S: TokenStore> ApiClient<T, S> {
    pub fn new(transport: T, store: S, settings: GatewaySettings) -> Self {
        let initial = if store.access_token().is_some() {
            SessionState::Active
        } else {
            SessionState::Anonymous
        };
        let (session, _) = watch::channel(initial);
        Self {
            transport,
            store: Mutex::new(store),
            settings,
            refresh: RefreshCoordinator::new(),
            default_headers: Mutex::new(BTreeMap::new()),
            session,
        }
    }

    fn lock_store(&self) -> MutexGuard<'_, S> {
        self.store.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_defaults(&self) -> MutexGuard<'_, BTreeMap<String, String>> {
        self.default_headers.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn settings(&self) -> &GatewaySettings {
        &self.settings
    }

    /// Absolute URL for a backend path. Absolute URLs pass through untouched.
    pub fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        format!(
            "{}/{}",
            self.settings.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Read-only access to the token store.
    pub fn with_store<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        f(&self.lock_store())
    }

    pub fn session_state(&self) -> SessionState {
        self.session.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.session.subscribe()
    }

    pub fn default_authorization(&self) -> Option<String> {
        self.lock_defaults().get(AUTHORIZATION).cloned()
    }

    pub fn is_refreshing(&self) -> bool {
        self.refresh.is_refreshing()
    }

    /// Requests currently parked behind an in-flight refresh.
    pub fn queued_requests(&self) -> usize {
        self.refresh.queued()
    }

    /// Install a freshly minted token pair and mark the session active.
    pub fn establish(&self, tokens: &TokenPair) {
        {
            let mut store = self.lock_store();
            store.set(ACCESS_TOKEN_KEY, tokens.access_token.clone());
            store.set(REFRESH_TOKEN_KEY, tokens.refresh_token.clone());
        }
        self.lock_defaults()
            .insert(AUTHORIZATION.to_string(), bearer(&tokens.access_token));
        self.session.send_replace(SessionState::Active);
    }

    /// End the session: drop tokens, reset refresh state, and point the user at
    /// the login route. Safe to call repeatedly.
    pub fn force_logout(&self) {
        self.clear_session();
        self.refresh.reset(ApiError::SessionExpired);
    }

    fn clear_session(&self) {
        self.lock_store().clear_tokens();
        self.lock_defaults().remove(AUTHORIZATION);

        let redirect_to = self.settings.login_route.clone();
        tracing::info!("Session ended, redirecting to {}", redirect_to);
        self.session.send_replace(SessionState::LoggedOut { redirect_to });
    }

    pub async fn get(&self, path: &str) -> Result<ApiEnvelope, ApiError> {
        self.send(ApiRequest::get(self.url(path))).await
    }

    pub async fn post(&self, path: &str, body: Value) -> Result<ApiEnvelope, ApiError> {
        self.send(ApiRequest::post(self.url(path), body)).await
    }

    pub async fn put(&self, path: &str, body: Value) -> Result<ApiEnvelope, ApiError> {
        self.send(ApiRequest::put(self.url(path), body)).await
    }

    pub async fn delete(&self, path: &str) -> Result<ApiEnvelope, ApiError> {
        self.send(ApiRequest::delete(self.url(path))).await
    }

    /// Send a request with the current bearer token, recovering once from an
    /// expired session.
    pub async fn send(&self, mut request: ApiRequest) -> Result<ApiEnvelope, ApiError> {
        loop {
            self.attach_auth(&mut request);
            tracing::debug!("{} {}", request.method, request.url);

            let err = match self.transport.execute(&request).await {
                Ok(resp) => return interpret(resp, self.settings.success_code),
                Err(err) => err,
            };
            if !err.is_unauthorized() {
                return Err(normalize(err));
            }

            let token = self.recover(&request, err).await?;
            request.retried = true;
            request.set_bearer(&token);
        }
    }

    fn attach_auth(&self, request: &mut ApiRequest) {
        for (name, value) in self.lock_defaults().iter() {
            request
                .headers
                .entry(name.clone())
                .or_insert_with(|| value.clone());
        }
        if let Some(token) = self.lock_store().access_token() {
            request.set_bearer(&token);
        }
    }

    /// Decide what a 401 means for this request. `Ok` carries the access token
    /// to replay with.
    async fn recover(
        &self,
        request: &ApiRequest,
        err: TransportError,
    ) -> Result<String, ApiError> {
        if request.url.contains(&self.settings.login_path) {
            return Err(ApiError::Unauthorized(err));
        }
        if request.retried {
            tracing::debug!("{} still unauthorized after refresh", request.url);
            return Err(ApiError::Unauthorized(err));
        }

        match self.refresh.enter() {
            Entry::Queued(rx) => {
                tracing::debug!("Refresh in flight, queueing {}", request.url);
                rx.await.unwrap_or(Err(ApiError::SessionExpired))
            }
            Entry::Leader(ticket) => self.refresh_session(ticket).await,
        }
    }

    /// Run the refresh this caller leads and settle every queued request with its outcome.
    ///
    /// The session is updated before the slot is released, so a request that
    /// fails after release sees either the new tokens or none at all.
    async fn refresh_session(&self, ticket: Ticket) -> Result<String, ApiError> {
        let refresh_token = self.lock_store().refresh_token();
        let Some(refresh_token) = refresh_token else {
            tracing::warn!("Access token expired and no refresh token stored");
            self.refresh
                .complete(ticket, Err(ApiError::SessionExpired), || self.clear_session());
            return Err(ApiError::SessionExpired);
        };

        tracing::info!("Access token expired, refreshing session...");
        match self.request_new_tokens(&refresh_token).await {
            Ok(tokens) => {
                let token = tokens.access_token.clone();
                if !self
                    .refresh
                    .complete(ticket, Ok(token.clone()), || self.establish(&tokens))
                {
                    tracing::debug!("Session ended while refreshing, discarding new tokens");
                    return Err(ApiError::SessionExpired);
                }
                tracing::info!("Session refreshed");
                Ok(token)
            }
            Err(e) => {
                tracing::warn!("Token refresh failed: {}", e);
                self.refresh
                    .complete(ticket, Err(e.clone()), || self.clear_session());
                Err(e)
            }
        }
    }

    async fn request_new_tokens(&self, refresh_token: &str) -> Result<TokenPair, ApiError> {
        let request = ApiRequest::post(
            self.url(&self.settings.refresh_path),
            json!({ "refreshToken": refresh_token }),
        );
        let resp = self
            .transport
            .execute(&request)
            .await
            .map_err(|e| ApiError::Refresh(e.to_string()))?;
        let parsed: RefreshResponse = serde_json::from_value(resp.data)
            .map_err(|e| ApiError::Refresh(format!("malformed refresh response: {}", e)))?;
        Ok(parsed.body)
    }
}

//! Login, logout and session status

use anyhow::{anyhow, Context, Result};
use serde_json::json;

use super::tokens::{TokenPair, TokenStore};
use crate::api::client::ApiClient;
use crate::api::envelope::ApiError;
use crate::api::transport::Transport;

/// Exchange credentials for a token pair and install it in the gateway.
pub async fn login<T: Transport, S: TokenStore>(
    client: &ApiClient<T, S>,
    username: &str,
    password: &str,
) -> Result<()> {
    let login_path = client.settings().login_path.clone();
    tracing::debug!("Logging in as {}", username);

    let env = client
        .post(
            &login_path,
            json!({ "username": username, "password": password }),
        )
        .await
        .map_err(|e| match e {
            ApiError::Unauthorized(_) => anyhow!("Invalid username or password"),
            other => anyhow::Error::new(other).context("Login request failed"),
        })?;

    let tokens: TokenPair =
        serde_json::from_value(env.body).context("Login response missing token pair")?;
    client.establish(&tokens);
    tracing::info!("Logged in as {}", username);
    Ok(())
}

/// Clear stored credentials
pub fn logout<T: Transport, S: TokenStore>(client: &ApiClient<T, S>) {
    client.force_logout();
}

/// Human-readable session summary.
pub fn status<T: Transport, S: TokenStore>(client: &ApiClient<T, S>) -> String {
    let (access, refresh) =
        client.with_store(|s| (s.access_token().is_some(), s.refresh_token().is_some()));
    let present = |p: bool| if p { "present" } else { "none" };

    let mut out = format!(
        "Backend:       {}\nAccess token:  {}\nRefresh token: {}",
        client.settings().base_url,
        present(access),
        present(refresh)
    );
    if !access && !refresh {
        out.push_str("\n\nRun 'localperks login' to authenticate.");
    }
    out
}

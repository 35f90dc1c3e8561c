//! API client module for the LocalPerks backend

pub mod client;
pub mod envelope;
mod refresh;
pub mod resources;
#[cfg(test)]
pub(crate) mod test_support;
pub mod transport;

use anyhow::{Context, Result};
use reqwest::Method;
use serde_json::Value;

use client::ApiClient;
use envelope::ApiEnvelope;
use resources::Resource;
use transport::{ApiRequest, Transport};

use crate::auth::TokenStore;

fn print_envelope(env: &ApiEnvelope) -> Result<()> {
    if !env.message.is_empty() {
        tracing::debug!("{} {}", env.status, env.message);
    }
    let rendered =
        serde_json::to_string_pretty(&env.body).context("Failed to render response body")?;
    println!("{}", rendered);
    Ok(())
}

/// List one page of a back-office collection
pub async fn list_resource<T: Transport, S: TokenStore>(
    client: &ApiClient<T, S>,
    resource: Resource,
    page: u32,
    size: u32,
) -> Result<()> {
    let env = resources::list(client, resource, page, size).await?;
    print_envelope(&env)
}

/// Show a single item of a back-office collection
pub async fn show_resource<T: Transport, S: TokenStore>(
    client: &ApiClient<T, S>,
    resource: Resource,
    id: &str,
) -> Result<()> {
    let env = resources::show(client, resource, id).await?;
    print_envelope(&env)
}

/// Issue an arbitrary request through the gateway and print the unwrapped body
pub async fn raw<T: Transport, S: TokenStore>(
    client: &ApiClient<T, S>,
    method: Method,
    path: &str,
    body: Option<&str>,
) -> Result<()> {
    let mut request = ApiRequest::new(method, client.url(path));
    if let Some(text) = body {
        let json: Value = serde_json::from_str(text).context("Request body is not valid JSON")?;
        request = request.with_body(json);
    }
    let env = client.send(request).await?;
    print_envelope(&env)
}

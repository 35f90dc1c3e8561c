//! Back-office collections (offers, categories, tags, organizations, users)

use anyhow::{anyhow, Context, Result};
use clap::ValueEnum;
use url::Url;

use super::client::ApiClient;
use super::envelope::{ApiEnvelope, ApiError};
use super::transport::Transport;
use crate::auth::TokenStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Resource {
    Offers,
    Categories,
    Tags,
    Organizations,
    Users,
}

impl Resource {
    pub fn path(self) -> &'static str {
        match self {
            Self::Offers => "/api/offers",
            Self::Categories => "/api/categories",
            Self::Tags => "/api/tags",
            Self::Organizations => "/api/organizations",
            Self::Users => "/api/users",
        }
    }
}

/// Collection path with `page`/`size` query parameters.
pub fn list_path(resource: Resource, page: u32, size: u32) -> String {
    let query = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("page", &page.to_string())
        .append_pair("size", &size.to_string())
        .finish();
    format!("{}?{}", resource.path(), query)
}

/// Single-item path. The id is percent-encoded as one path segment.
pub fn item_path(resource: Resource, id: &str) -> Result<String> {
    let mut url = Url::parse("http://localhost").context("Failed to build item path")?;
    url.path_segments_mut()
        .map_err(|()| anyhow!("Base URL cannot carry a path"))?
        .pop_if_empty()
        .extend(resource.path().trim_start_matches('/').split('/'))
        .push(id);
    Ok(url.path().to_string())
}

pub async fn list<T: Transport, S: TokenStore>(
    client: &ApiClient<T, S>,
    resource: Resource,
    page: u32,
    size: u32,
) -> Result<ApiEnvelope, ApiError> {
    client.get(&list_path(resource, page, size)).await
}

pub async fn show<T: Transport, S: TokenStore>(
    client: &ApiClient<T, S>,
    resource: Resource,
    id: &str,
) -> Result<ApiEnvelope> {
    Ok(client.get(&item_path(resource, id)?).await?)
}

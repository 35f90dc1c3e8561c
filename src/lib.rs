//! LocalPerks backend client
//!
//! The authenticated request gateway ([`api::client::ApiClient`]) plus the
//! token storage and configuration it runs on.

pub mod api;
pub mod auth;
pub mod config;

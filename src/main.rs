//! LocalPerks CLI - command-line client for the LocalPerks backend
//!
//! Every command goes through the authenticated request gateway, which keeps
//! the stored session fresh.

use anyhow::Result;
use clap::{Parser, Subcommand};
use reqwest::Method;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use localperks::api::{self, client::SessionState, envelope::ApiError, resources::Resource};
use localperks::auth;

#[derive(Parser)]
#[command(name = "localperks")]
#[command(about = "Command-line client for the LocalPerks backend", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Override the backend URL stored in the config file
    #[arg(long, global = true)]
    base_url: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in and store a session
    Login {
        #[arg(short, long)]
        username: String,

        #[arg(short, long)]
        password: String,
    },

    /// Log out and clear stored tokens
    Logout,

    /// Show current session status
    Status,

    /// List a back-office collection
    List {
        resource: Resource,

        /// Zero-based page index
        #[arg(long, default_value = "0")]
        page: u32,

        /// Page size
        #[arg(long, default_value = "20")]
        size: u32,
    },

    /// Show one item of a back-office collection
    Show { resource: Resource, id: String },

    /// GET an arbitrary backend path
    Get { path: String },

    /// POST a JSON body to a backend path
    Post { path: String, body: String },

    /// PUT a JSON body to a backend path
    Put { path: String, body: String },

    /// DELETE a backend path
    Delete { path: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let client = api::client::connect(cli.base_url)?;
    let mut session = client.subscribe();

    let outcome = match cli.command {
        Commands::Login { username, password } => {
            tracing::info!("Signing in...");
            auth::login(&client, &username, &password).await.map(|()| {
                println!("Login successful.");
            })
        }
        Commands::Logout => {
            auth::logout(&client);
            println!("Logged out.");
            return Ok(());
        }
        Commands::Status => {
            println!("{}", auth::status(&client));
            Ok(())
        }
        Commands::List {
            resource,
            page,
            size,
        } => api::list_resource(&client, resource, page, size).await,
        Commands::Show { resource, id } => api::show_resource(&client, resource, &id).await,
        Commands::Get { path } => api::raw(&client, Method::GET, &path, None).await,
        Commands::Post { path, body } => api::raw(&client, Method::POST, &path, Some(&body)).await,
        Commands::Put { path, body } => api::raw(&client, Method::PUT, &path, Some(&body)).await,
        Commands::Delete { path } => api::raw(&client, Method::DELETE, &path, None).await,
    };

    if session.has_changed().unwrap_or(false) {
        if let SessionState::LoggedOut { redirect_to } = session.borrow_and_update().clone() {
            eprintln!(
                "Session ended ({}). Run 'localperks login' to sign in again.",
                redirect_to
            );
        }
    }

    outcome.map_err(|e| {
        let status = e.downcast_ref::<ApiError>().map(ApiError::status);
        match status {
            Some(status) => e.context(format!("Request failed with status {}", status)),
            None => e,
        }
    })
}

//! Basic request pipeline example
//!
//! Usage:
//!   cargo run --example basic_pipeline

use huaan_rs_client::api::booking::ScheduleQuery;
use huaan_rs_client::{ClientConfig, FileStorage, LogOnlyRedirect, RequestPipeline, TokenStore};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    // Configuration: huaan-client.toml and HUAAN_CLIENT__* override the defaults
    let config = ClientConfig::load()?;

    let username = std::env::var("HUAAN_USERNAME").unwrap_or_else(|_| "patient01".to_string());
    let password = std::env::var("HUAAN_PASSWORD").unwrap_or_else(|_| "secret123".to_string());

    println!("=== Huaan Rust Client Example ===");
    println!("API: {}", config.base_url);
    println!();

    let storage = match &config.storage_path {
        Some(path) => FileStorage::open(path),
        None => FileStorage::default_location()?,
    };
    println!("Session file: {}", storage.path().display());

    let client = RequestPipeline::new(config, TokenStore::new(storage), Arc::new(LogOnlyRedirect))?;

    // Reuse a stored session when there is one
    match client.bootstrap().await? {
        Some(user) => println!("✓ Restored session for {user}"),
        None => {
            println!("No stored session, signing in as {username}...");
            let login = client.password_login(&username, &password).await?;
            println!("✓ Signed in (new account: {})", login.is_new);
        }
    }
    println!();

    println!("Doctors:");
    let doctors = client.list_doctors(None, None).await?;
    println!("{}", serde_json::to_string_pretty(&doctors)?);
    println!();

    println!("Available schedules:");
    match client.list_available_schedules(&ScheduleQuery::default()).await {
        Ok(schedules) => println!("{}", serde_json::to_string_pretty(&schedules)?),
        Err(e) => println!("! {}", e.user_message()),
    }

    Ok(())
}

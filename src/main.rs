//! Balladis admin CLI - a thin front end over the session controller.
//!
//! Commands: `login [username]`, `whoami`, `logout`, `status`.
//! The API base address comes from `BALLADIS_API_BASE`, the config file,
//! or the dev-server default.

use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use balladis_admin::{ApiClient, Config, SessionController, SessionState, TokenStore};

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

fn prompt(label: &str) -> Result<String> {
    print!("{}: ", label);
    io::stdout().flush()?;
    let mut value = String::new();
    io::stdin()
        .read_line(&mut value)
        .context("Failed to read input")?;
    Ok(value.trim().to_string())
}

fn print_usage() {
    eprintln!("Usage: balladis-admin <login [username] | whoami | logout | status>");
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    init_tracing();
    info!("Balladis admin CLI starting");

    let mut config = Config::load()?;
    let tokens = Arc::new(TokenStore::open(config.data_dir()?));
    let api = ApiClient::new(config.api_base(), tokens)?;
    let controller = SessionController::new(api);

    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(String::as_str).unwrap_or("status");

    match command {
        "status" | "whoami" => {
            controller.bootstrap().await;
            match controller.state() {
                SessionState::Authenticated(user) => {
                    println!("Logged in as {}", user.username);
                    if let Some(email) = user.email {
                        println!("  email: {}", email);
                    }
                    if user.is_staff {
                        println!("  staff: yes");
                    }
                }
                _ => println!("Not logged in."),
            }
        }
        "login" => {
            let username = match args.get(2).cloned() {
                Some(name) => name,
                None => std::env::var("BALLADIS_USERNAME")
                    .ok()
                    .filter(|v| !v.is_empty())
                    .or_else(|| config.last_username.clone())
                    .map_or_else(|| prompt("Username"), Ok)?,
            };
            let password = match std::env::var("BALLADIS_PASSWORD") {
                Ok(p) if !p.is_empty() => p,
                _ => prompt("Password")?,
            };

            match controller.login(&username, &password).await {
                Ok(()) => {
                    config.last_username = Some(username);
                    if let Err(e) = config.save() {
                        tracing::warn!(error = %e, "Failed to save config");
                    }
                    match controller.state() {
                        SessionState::Authenticated(user) => {
                            println!("Login successful. Welcome, {}!", user.username);
                        }
                        _ => println!("Login accepted, but the session could not be verified."),
                    }
                }
                Err(e) => {
                    eprintln!("Login failed: {}", e);
                    std::process::exit(1);
                }
            }
        }
        "logout" => {
            controller.logout().await;
            println!("Logged out.");
        }
        _ => {
            print_usage();
            std::process::exit(2);
        }
    }

    Ok(())
}

//! authrelay - issue authenticated API calls from the command line.
//!
//! The access credential only lives for the duration of the process. On start
//! the session is restored silently from the refresh cookie; every call then
//! goes through the gateway, which renews the credential on 401.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use authrelay_core::{
    Config, Credential, Gateway, HttpTransport, LogRedirect, RequestOptions, SessionStore,
};
use clap::{Parser, Subcommand};
use futures::future::join_all;
use serde_json::Value;
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "authrelay", version, about = "Authenticated API calls with silent token renewal")]
struct Cli {
    /// API base URL (overrides config and AUTHRELAY_API_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Session cookie to renew from, as `name=value`
    #[arg(long, global = true)]
    session_cookie: Option<String>,

    /// Start with this access token instead of restoring the session
    #[arg(long, global = true)]
    token: Option<String>,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Renew the session from the cookie and report who is signed in
    Restore,
    /// Ask the server who the cookie session belongs to
    Whoami,
    /// GET one or more endpoints concurrently
    Get {
        #[arg(required = true)]
        endpoints: Vec<String>,
    },
    /// Send a single request with an optional JSON body
    Send {
        endpoint: String,
        #[arg(long, short = 'X', default_value = "POST")]
        method: String,
        #[arg(long, short = 'd')]
        body: Option<String>,
    },
}

/// Initialize the tracing subscriber for logging.
///
/// Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug).
fn init_tracing(log_file: Option<&PathBuf>) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            let (writer, guard) = tracing_appender::non_blocking(file);
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(writer).with_ansi(false))
                .with(filter)
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(io::stderr))
                .with(filter)
                .init();
            Ok(None)
        }
    }
}

fn build_gateway(cli: &Cli) -> Result<Gateway> {
    let mut config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            warn!(error = %e, "Failed to load config, using defaults");
            Config::default()
        }
    };
    if let Some(ref url) = cli.api_url {
        config.api_url = url.clone();
    }
    if let Some(ref cookie) = cli.session_cookie {
        config.session_cookie = Some(cookie.clone());
    }
    debug!(api_url = %config.api_url, "Config loaded");

    let mut transport = HttpTransport::with_timeout(config.request_timeout())
        .context("Failed to create HTTP client")?;
    if let Some(ref cookie) = config.session_cookie {
        transport = transport
            .with_session_cookie(cookie, &config.api_url)
            .context("Failed to install session cookie")?;
    }

    Ok(Gateway::new(
        config.gateway_config(),
        Arc::new(SessionStore::new()),
        Arc::new(transport),
        Arc::new(LogRedirect::new(config.login_url())),
    ))
}

/// Initial silent renewal. Failures are expected when signed out and only
/// logged; the first 401 will try again anyway.
async fn restore(gateway: &Gateway) {
    match gateway.restore_session().await {
        Ok(identity) => info!(identity = ?identity, "Session restored"),
        Err(e) => debug!(error = %e, "Initial silent refresh failed"),
    }
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let _log_guard = init_tracing(cli.log_file.as_ref())?;
    info!("authrelay starting");

    let gateway = build_gateway(&cli)?;
    match cli.token {
        Some(ref token) => gateway.login(Credential::from(token.as_str()), None),
        None => {
            if !matches!(cli.command, Command::Restore | Command::Whoami) {
                restore(&gateway).await;
            }
        }
    }

    match cli.command {
        Command::Restore => match gateway.restore_session().await {
            Ok(Some(identity)) => println!("Signed in as {}", identity),
            Ok(None) => println!("Signed in"),
            Err(e) => println!("Not signed in: {}", e),
        },
        Command::Whoami => match gateway.current_user::<Value>().await? {
            Some(user) => print_json(&user)?,
            None => println!("Not signed in"),
        },
        Command::Get { endpoints } => {
            let calls = endpoints
                .iter()
                .map(|endpoint| gateway.request::<Value>(endpoint, RequestOptions::get()));
            let results = join_all(calls).await;

            let mut failures = 0;
            for (endpoint, result) in endpoints.iter().zip(results) {
                match result {
                    Ok(body) => {
                        println!("== {}", endpoint);
                        print_json(&body)?;
                    }
                    Err(e) => {
                        failures += 1;
                        eprintln!("== {}: {}", endpoint, e);
                    }
                }
            }
            if failures > 0 {
                anyhow::bail!("{} of {} requests failed", failures, endpoints.len());
            }
        }
        Command::Send {
            endpoint,
            method,
            body,
        } => {
            let method = method
                .to_uppercase()
                .parse()
                .with_context(|| format!("Invalid HTTP method {}", method))?;
            let mut options = RequestOptions::default().method(method);
            if let Some(body) = body {
                let parsed: Value = serde_json::from_str(&body).context("Body is not valid JSON")?;
                options = options.json(&parsed)?;
            }

            let response: Value = gateway
                .request(&endpoint, options)
                .await
                .with_context(|| format!("Request to {} failed", endpoint))?;
            print_json(&response)?;
        }
    }

    info!("authrelay shutting down");
    Ok(())
}

//! wattcache - command-line access to ZwiftPower data.
//!
//! Logs in, keeps the session warm, and prints each response as a JSON
//! envelope. Responses are cached on disk and requests are spaced out.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use wattcache_core::api::{cache_name, HttpMethod};
use wattcache_core::auth::credentials::IDENTITY_ENV;
use wattcache_core::{
    Authenticator, Config, Credential, CredentialStore, Params, PowerApi, ProfileApi,
    RequestOptions, RequestOutcome,
};

/// Log file name prefix inside the log directory
const LOG_FILE_PREFIX: &str = "wattcache.log";

/// wattcache - cached, rate-limited ZwiftPower client
#[derive(Parser)]
#[command(name = "wattcache")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable debug output on stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Use this config file instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Account email (defaults to the last one used)
    #[arg(long, global = true)]
    email: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in and store the password in the OS keychain
    Login,

    /// Forget the saved session
    Logout {
        /// Also remove the password from the keychain
        #[arg(long)]
        forget_password: bool,
    },

    /// Show session and cache state
    Status,

    /// Request an endpoint, e.g. `fetch api3.php -p do=profile_search -p zwid=123`
    Fetch {
        endpoint: String,

        /// Request parameter as key=value, repeatable
        #[arg(short = 'p', long = "param", value_parser = parse_param)]
        params: Vec<(String, String)>,

        /// Send as a form POST instead of a GET
        #[arg(long)]
        post: bool,

        /// Ignore cached responses
        #[arg(long)]
        no_cache: bool,

        /// Maximum age of a cached response in seconds
        #[arg(long)]
        ttl: Option<u64>,
    },

    /// Rider profile
    Profile {
        zwid: String,

        #[arg(long)]
        no_cache: bool,
    },

    /// Rider power curve
    Power {
        zwid: String,

        #[arg(long)]
        no_cache: bool,
    },

    /// Response cache maintenance
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Entry count and size on disk
    Stats,

    /// Remove one endpoint's cached GET response, or everything
    Clear {
        endpoint: Option<String>,

        #[arg(short = 'p', long = "param", value_parser = parse_param)]
        params: Vec<(String, String)>,
    },

    /// Remove entries older than the cleanup TTL
    Cleanup {
        /// Override the configured cleanup TTL in seconds
        #[arg(long)]
        ttl: Option<u64>,
    },
}

fn parse_param(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.to_string()))
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| format!("expected key=value, got '{}'", s))
}

/// Install the stderr layer, plus a daily rolling file when logging is on.
/// The returned guard must live until exit so buffered lines get flushed.
fn init_tracing(config: &Config, verbose: bool) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control stderr level (e.g., RUST_LOG=debug)
    let default_filter = if verbose {
        "wattcache=debug,wattcache_core=debug,warn"
    } else {
        "warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let (file_layer, guard) = match config.logging.enabled.then(|| config.log_dir()) {
        Some(Ok(log_dir)) => {
            let appender = tracing_appender::rolling::daily(&log_dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_ansi(false)
                .with_target(true)
                .with_writer(writer)
                .with_filter(EnvFilter::new(&config.logging.level));
            (Some(layer), Some(guard))
        }
        _ => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr).with_filter(filter))
        .with(file_layer)
        .init();

    guard
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    let mut config = match path {
        Some(path) => Config::load_from(path)?,
        None => Config::load().context("Failed to load config")?,
    };
    config.apply_env();
    Ok(config)
}

fn save_config(config: &Config, path: Option<&PathBuf>) -> Result<()> {
    match path {
        Some(path) => config.save_to(path),
        None => config.save(),
    }
}

fn prompt_line(prompt: &str) -> Result<String> {
    eprint!("{}", prompt);
    io::stderr().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

/// Which account to act for: flag, then environment, then last login
fn resolve_identity(cli_email: Option<&str>, config: &Config) -> Option<String> {
    cli_email
        .map(str::to_string)
        .or_else(|| std::env::var(IDENTITY_ENV).ok())
        .or_else(|| config.auth.last_identity.clone())
        .filter(|identity| !identity.trim().is_empty())
}

/// Full credentials: environment, then keychain, then an interactive prompt
fn resolve_credential(cli_email: Option<&str>, config: &Config) -> Result<Credential> {
    if cli_email.is_none() {
        if let Some(credential) = Credential::from_env() {
            info!("Using credentials from environment");
            return Ok(credential);
        }
    }

    let identity = match resolve_identity(cli_email, config) {
        Some(identity) => identity,
        None => prompt_line("ZwiftPower email: ")?,
    };
    if identity.is_empty() {
        anyhow::bail!("An email address is required");
    }

    match CredentialStore::load(&identity) {
        Ok(credential) => {
            info!("Using credentials from keychain");
            return Ok(credential);
        }
        Err(e) => info!(error = %e, "No keychain entry"),
    }

    let secret = rpassword::prompt_password("ZwiftPower password: ")
        .context("Failed to read password")?;
    Ok(Credential::new(identity, secret))
}

/// An authenticator that can reuse or drop a saved session but never log in
fn identity_only_authenticator(cli_email: Option<&str>, config: &Config) -> Result<Authenticator> {
    let credential = resolve_identity(cli_email, config).map(|identity| Credential::new(identity, ""));
    config.authenticator(credential)
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_outcome(outcome: &RequestOutcome) -> Result<ExitCode> {
    print_json(outcome)?;
    Ok(if outcome.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn to_params(pairs: Vec<(String, String)>) -> Params {
    pairs.into_iter().collect()
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;
    let _guard = init_tracing(&config, cli.verbose);

    let problems = config.validate();
    if !problems.is_empty() {
        for problem in &problems {
            warn!(problem = %problem, "Invalid configuration");
        }
        anyhow::bail!("Invalid configuration: {}", problems.join("; "));
    }

    let email = cli.email.as_deref();

    match cli.command {
        Commands::Login => login(config, cli.config.as_ref(), email).await,
        Commands::Logout { forget_password } => {
            let authenticator = identity_only_authenticator(email, &config)?;
            authenticator.logout().await;
            if forget_password {
                if let Some(identity) = resolve_identity(email, &config) {
                    CredentialStore::delete(&identity)?;
                }
            }
            println!("Logged out");
            Ok(ExitCode::SUCCESS)
        }
        Commands::Status => {
            let authenticator = identity_only_authenticator(email, &config)?;
            let session_valid = authenticator.check_session_valid().await;
            let session_age_secs = authenticator
                .session_age()
                .await
                .map(|age| age.num_seconds());
            let keychain = resolve_identity(email, &config)
                .is_some_and(|identity| CredentialStore::has_credentials(&identity));
            let cache = config.cache_manager()?.stats();
            print_json(&json!({
                "password_in_keychain": keychain,
                "base_url": config.api.base_url,
                "session_valid": session_valid,
                "session_age_secs": session_age_secs,
                "cache_enabled": config.cache.enabled,
                "cache": cache,
            }))?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Fetch {
            endpoint,
            params,
            post,
            no_cache,
            ttl,
        } => {
            let client = connect(&config, email)?;
            let method = if post { HttpMethod::Post } else { HttpMethod::Get };
            let options = RequestOptions::with_ttl_secs(ttl.unwrap_or(config.cache.default_ttl_secs))
                .use_cache(!no_cache);
            let outcome = client
                .dispatch(&endpoint, &to_params(params), method, options)
                .await;
            print_outcome(&outcome)
        }
        Commands::Profile { zwid, no_cache } => {
            let client = connect(&config, email)?;
            let api = ProfileApi::new(&client);
            let api = if no_cache { api.bypass_cache() } else { api };
            print_outcome(&api.rider_profile(&zwid).await)
        }
        Commands::Power { zwid, no_cache } => {
            let client = connect(&config, email)?;
            let api = PowerApi::new(&client);
            let api = if no_cache { api.bypass_cache() } else { api };
            print_outcome(&api.power_profile(&zwid).await)
        }
        Commands::Cache { action } => cache_command(&config, action),
    }
}

fn connect(config: &Config, email: Option<&str>) -> Result<wattcache_core::ApiClient> {
    let credential = resolve_credential(email, config)?;
    let authenticator = Arc::new(config.authenticator(Some(credential))?);
    config.api_client(authenticator)
}

async fn login(mut config: Config, path: Option<&PathBuf>, email: Option<&str>) -> Result<ExitCode> {
    let credential = resolve_credential(email, &config)?;
    let authenticator = config.authenticator(Some(credential.clone()))?;

    let session = match authenticator.get_session().await {
        Ok(session) => session,
        Err(e) => {
            eprintln!("Login failed: {}", e);
            return Ok(ExitCode::FAILURE);
        }
    };

    if let Err(e) = CredentialStore::store(&credential) {
        warn!(error = %e, "Failed to store credentials in keychain");
    }

    config.auth.last_identity = Some(credential.identity().to_string());
    if let Err(e) = save_config(&config, path) {
        warn!(error = %e, "Failed to save config");
    }

    println!(
        "Logged in (session created {})",
        session.created_at().format("%Y-%m-%d %H:%M:%S UTC")
    );
    Ok(ExitCode::SUCCESS)
}

fn cache_command(config: &Config, action: CacheAction) -> Result<ExitCode> {
    let cache = config.cache_manager()?;
    let ok = match action {
        CacheAction::Stats => {
            print_json(&cache.stats())?;
            true
        }
        CacheAction::Clear { endpoint, params } => {
            let cleared = match endpoint {
                Some(endpoint) => {
                    cache.invalidate(&cache_name(&endpoint, HttpMethod::Get), &to_params(params))
                }
                None => cache.clear_all(),
            };
            println!("{}", if cleared { "Cache cleared" } else { "Failed to clear cache" });
            cleared
        }
        CacheAction::Cleanup { ttl } => {
            let ttl = ttl.unwrap_or(config.cache.cleanup_ttl_secs);
            let removed = cache.cleanup_expired(Duration::from_secs(ttl));
            println!("Removed {} expired entries", removed);
            true
        }
    };
    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

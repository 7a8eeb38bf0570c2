//! route2rise - command-line client for the Route2Rise lead management backend.
//!
//! Signs in, keeps the session current, and makes authenticated requests
//! using the same session gate a frontend would.

use std::io;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use route2rise_core::config::StoreKind;
use route2rise_core::{Config, Navigator, SessionContext};

#[derive(Parser)]
#[command(name = "route2rise", version, about = "Route2Rise lead management client")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check the stored session and show which view a path would render
    Status {
        #[arg(default_value = "/")]
        path: String,
    },
    /// Sign in and store the access token
    Login {
        #[arg(short, long)]
        username: Option<String>,
    },
    /// Forget the stored access token
    Logout,
    /// GET a backend path and print the JSON response
    Get { path: String },
    /// Check that the backend is up
    Health,
    /// Follow session changes until interrupted
    Watch {
        #[arg(default_value = "/dashboard")]
        path: String,
    },
    /// Show the config file, or update it
    Config {
        /// Backend address to store; an empty value restores the default
        #[arg(long)]
        api_base_url: Option<String>,
        /// Credential store to use from now on
        #[arg(long, value_enum)]
        store: Option<StoreArg>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum StoreArg {
    File,
    Keyring,
    Memory,
}

impl From<StoreArg> for StoreKind {
    fn from(arg: StoreArg) -> Self {
        match arg {
            StoreArg::File => StoreKind::File,
            StoreArg::Keyring => StoreKind::Keyring,
            StoreArg::Memory => StoreKind::Memory,
        }
    }
}

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_tracing();

    let config = Config::load().context("Failed to load configuration")?;
    debug!(?config, "Configuration loaded");
    let ctx = SessionContext::new(config)?;

    let result = match cli.command {
        Command::Status { path } => status(&ctx, &path).await,
        Command::Login { username } => login(&ctx, username).await,
        Command::Logout => logout(&ctx),
        Command::Get { path } => get(&ctx, &path).await,
        Command::Health => health(&ctx).await,
        Command::Watch { path } => watch(&ctx, &path).await,
        Command::Config {
            api_base_url,
            store,
        } => configure(api_base_url, store),
    };

    ctx.dispose();
    result
}

async fn status(ctx: &SessionContext, path: &str) -> Result<()> {
    ctx.init();
    let snapshot = ctx.wait_until_resolved().await;
    let nav = Navigator::new(path, &snapshot);

    println!("backend:       {}", ctx.api().base_url());
    println!("store:         {:?}", ctx.config().store);
    println!("authenticated: {}", snapshot.authenticated());
    let access = if nav.view().is_protected() {
        "protected"
    } else {
        "public"
    };
    println!("{} -> {} ({:?}, {})", path, nav.location(), nav.view(), access);
    Ok(())
}

/// Edits the file as written, so environment overrides are never baked in.
fn configure(api_base_url: Option<String>, store: Option<StoreArg>) -> Result<()> {
    let mut config = Config::load_file().context("Failed to load configuration")?;
    let changed = api_base_url.is_some() || store.is_some();

    if let Some(url) = api_base_url {
        config.api_base_url = if url.trim().is_empty() { None } else { Some(url) };
    }
    if let Some(store) = store {
        config.store = store.into();
    }
    if changed {
        config.save().context("Failed to save configuration")?;
        info!("Configuration saved");
    }

    println!("file:    {}", Config::config_path()?.display());
    println!("backend: {}", config.api_base_url());
    println!("store:   {:?}", config.store);
    Ok(())
}

async fn login(ctx: &SessionContext, username: Option<String>) -> Result<()> {
    let username = match username {
        Some(username) => username,
        None => prompt_username()?,
    };
    if username.is_empty() {
        anyhow::bail!("Username required");
    }
    let password = rpassword::prompt_password("Password: ")?;

    ctx.login(&username, &password).await.map_err(|e| {
        if e.is_unauthorized() {
            anyhow::anyhow!("Invalid username or password")
        } else {
            anyhow::Error::new(e).context("Login failed")
        }
    })?;

    println!("Logged in as {}", username);
    Ok(())
}

fn prompt_username() -> Result<String> {
    use std::io::Write;

    print!("Username: ");
    io::stdout().flush()?;
    let mut username = String::new();
    io::stdin().read_line(&mut username)?;
    Ok(username.trim().to_string())
}

fn logout(ctx: &SessionContext) -> Result<()> {
    ctx.logout()?;
    println!("Logged out");
    Ok(())
}

async fn get(ctx: &SessionContext, path: &str) -> Result<()> {
    let value: serde_json::Value = ctx.api().get(path).await.map_err(|e| {
        if e.is_unauthorized() {
            anyhow::anyhow!("Session expired - run `route2rise login`")
        } else {
            anyhow::Error::new(e).context(format!("GET {} failed", path))
        }
    })?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

async fn health(ctx: &SessionContext) -> Result<()> {
    let health = ctx.api().health().await.context("Health check failed")?;
    match health.app {
        Some(app) => println!("{}: {}", app, health.status),
        None => println!("{}", health.status),
    }
    Ok(())
}

async fn watch(ctx: &SessionContext, path: &str) -> Result<()> {
    ctx.init();
    let mut states = ctx.subscribe();
    let mut nav = Navigator::new(path, &states.borrow_and_update());
    println!("{:?} at {}", nav.view(), nav.location());
    info!(path, "Watching session");

    loop {
        tokio::select! {
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = *states.borrow_and_update();
                let view = nav.sync(&snapshot);
                println!("{:?}: {:?} at {}", snapshot.state, view, nav.location());
            }
            _ = tokio::signal::ctrl_c() => {
                break;
            }
        }
    }
    Ok(())
}

//! CLI entry and dispatch.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use photobox_core::config::{self, paths};
use photobox_core::logging;

mod commands;

#[derive(Parser)]
#[command(name = "photobox")]
#[command(version = "0.1")]
#[command(about = "Photo storage client for a hosted auth + object storage backend")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Credentials shared by `signup` and `login`.
#[derive(clap::Args, Debug, Clone)]
struct CredentialArgs {
    /// Account email address
    #[arg(short, long)]
    email: String,

    /// Account password (read from stdin when omitted)
    #[arg(short, long, env = "PHOTOBOX_PASSWORD", hide_env_values = true)]
    password: Option<String>,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Create a new account
    Signup {
        #[command(flatten)]
        credentials: CredentialArgs,
    },
    /// Sign in and store the session locally
    Login {
        #[command(flatten)]
        credentials: CredentialArgs,
    },
    /// Sign out and clear all locally stored session data
    Logout,
    /// Show the signed-in account
    Whoami,
    /// Upload an image (JPG, PNG, GIF, WEBP; max 5MB)
    Upload {
        /// Path to the image file
        #[arg(value_name = "PATH")]
        path: String,
    },
    /// Delete an uploaded image by its public URL
    Delete {
        /// Public URL returned by `upload`
        #[arg(value_name = "URL")]
        url: String,
    },
    /// Browse images in the bucket
    Gallery {
        #[command(subcommand)]
        command: Option<GalleryCommands>,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(clap::Subcommand)]
enum GalleryCommands {
    /// List stored images (default)
    List,
    /// Download an image into a directory
    Download {
        /// Stored file name, as shown by `gallery list`
        #[arg(value_name = "NAME")]
        name: String,
        /// Destination directory
        #[arg(long, value_name = "DIR", default_value = ".")]
        out: PathBuf,
    },
    /// Open an image in the system browser
    Open {
        /// Stored file name, as shown by `gallery list`
        #[arg(value_name = "NAME")]
        name: String,
    },
}

#[derive(clap::Subcommand)]
enum ConfigCommands {
    /// Show the path to the config file
    Path,
    /// Initialize a default config file (if not present)
    Init,
    /// Generate a fresh config from Rust defaults (for xtask)
    Generate,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    // Log setup failures must not block the command itself.
    let _log_guard = match logging::init_logging(&paths::logs_dir()) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("Warning: file logging disabled: {e:#}");
            None
        }
    };

    // one tokio runtime for everything
    let rt = tokio::runtime::Runtime::new().context("create tokio runtime")?;

    rt.block_on(async move { dispatch(cli).await })
}

async fn dispatch(cli: Cli) -> Result<()> {
    let load_config = || -> Result<config::Config> {
        let config = config::Config::load().context("load config")?;
        tracing::debug!(bucket = %config.storage.bucket, "Config loaded");
        Ok(config)
    };

    match cli.command {
        Commands::Signup { credentials } => {
            commands::auth::signup(&load_config()?, &credentials.email, credentials.password)
                .await
        }
        Commands::Login { credentials } => {
            commands::auth::login(&load_config()?, &credentials.email, credentials.password)
                .await
        }
        Commands::Logout => {
            // A broken config must never keep credentials on disk.
            let config = load_config()
                .inspect_err(|e| {
                    tracing::warn!(error = %format!("{e:#}"), "Signing out without config");
                })
                .ok();
            commands::auth::logout(config.as_ref()).await
        }
        Commands::Whoami => commands::auth::whoami(&load_config()?).await,
        Commands::Upload { path } => commands::upload::upload(&load_config()?, &path).await,
        Commands::Delete { url } => commands::upload::delete(&load_config()?, &url).await,
        Commands::Gallery { command } => {
            let config = load_config()?;
            match command.unwrap_or(GalleryCommands::List) {
                GalleryCommands::List => commands::gallery::list(&config).await,
                GalleryCommands::Download { name, out } => {
                    commands::gallery::download(&config, &name, &out).await
                }
                GalleryCommands::Open { name } => commands::gallery::open(&config, &name).await,
            }
        }
        Commands::Config { command } => match command {
            ConfigCommands::Path => {
                commands::config::path();
                Ok(())
            }
            ConfigCommands::Init => commands::config::init(),
            ConfigCommands::Generate => commands::config::generate(),
        },
    }
}

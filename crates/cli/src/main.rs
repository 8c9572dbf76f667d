//! Right Water CLI - Database migrations and administrator records.
//!
//! # Usage
//!
//! ```bash
//! # Run storefront database migrations
//! rw-cli migrate
//!
//! # Grant administrator privilege
//! rw-cli admin grant --email owner@example.com --note "store owner"
//!
//! # Revoke it again
//! rw-cli admin revoke --uid 3f9c2b7a1d4e8f6a0b5c
//!
//! # List administrators
//! rw-cli admin list
//! ```
//!
//! # Commands
//!
//! - `migrate` - Run database migrations
//! - `admin grant|revoke|list` - Manage authorization records

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Args, Parser, Subcommand};

mod commands;

use commands::admin::Target;

#[derive(Parser)]
#[command(name = "rw-cli")]
#[command(author, version, about = "Right Water CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Manage administrator authorization records
    Admin {
        #[command(subcommand)]
        action: AdminAction,
    },
}

/// Who to act on: an identity id or an account email.
#[derive(Args)]
#[group(required = true, multiple = false)]
struct TargetArgs {
    /// Identity id
    #[arg(long)]
    uid: Option<String>,

    /// Account email address
    #[arg(short, long)]
    email: Option<String>,
}

impl TargetArgs {
    fn into_target(self) -> Option<Target> {
        self.uid
            .map(Target::Uid)
            .or_else(|| self.email.map(Target::Email))
    }
}

#[derive(Subcommand)]
enum AdminAction {
    /// Grant administrator privilege
    Grant {
        #[command(flatten)]
        target: TargetArgs,

        /// Free-form note stored with the record
        #[arg(short, long)]
        note: Option<String>,
    },
    /// Revoke administrator privilege
    Revoke {
        #[command(flatten)]
        target: TargetArgs,
    },
    /// List administrators
    List,
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Admin { action } => {
            let backends = commands::admin::connect().await?;
            match action {
                AdminAction::Grant { target, note } => {
                    let target = target.into_target().ok_or("--uid or --email is required")?;
                    let uid = commands::admin::grant(&backends, &target, note).await?;
                    tracing::info!(%uid, "administrator privilege granted");
                }
                AdminAction::Revoke { target } => {
                    let target = target.into_target().ok_or("--uid or --email is required")?;
                    let uid = commands::admin::revoke(&backends, &target).await?;
                    tracing::info!(%uid, "administrator privilege revoked");
                }
                AdminAction::List => {
                    let admins = commands::admin::list(&backends).await?;
                    if admins.is_empty() {
                        tracing::info!("no administrators");
                    }
                    for admin in admins {
                        tracing::info!(
                            uid = %admin.uid,
                            email = admin.email.as_deref().unwrap_or("-"),
                            granted_at = %admin.record.granted_at,
                            note = admin.record.note.as_deref().unwrap_or(""),
                            "administrator"
                        );
                    }
                }
            }
        }
    }
    Ok(())
}

//! Maintenance commands that run against the server's database.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use db::{
    DBService,
    models::user::{ApiToken, User},
};
use services::services::wiki;

#[derive(Parser)]
#[command(name = "orbit-cli")]
#[command(version, about = "Orbit maintenance commands")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Delete old wiki revisions, keeping the newest N per page
    #[command(name = "wiki:cleanup-revisions")]
    WikiCleanupRevisions {
        #[arg(long)]
        keep: i64,
        /// Report what would be removed without deleting anything
        #[arg(long)]
        dry_run: bool,
    },
    /// Issue a personal access token, creating the user if needed
    #[command(name = "token:issue")]
    TokenIssue {
        #[arg(long)]
        email: String,
        /// Display name for a newly created user (defaults to the email)
        #[arg(long)]
        name: Option<String>,
        #[arg(long, default_value = "cli")]
        label: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let db = DBService::new().await.context("Failed to open database")?;

    match cli.command {
        Commands::WikiCleanupRevisions { keep, dry_run } => {
            let report = wiki::cleanup_revisions(&db.pool, keep, dry_run).await?;
            for pruned in &report.wikis {
                println!(
                    "{}: {} stored, {} {}",
                    pruned.wiki_id,
                    pruned.stored,
                    pruned.removed,
                    if dry_run { "would be removed" } else { "removed" }
                );
            }
            println!(
                "{} revision(s) {} across {} page(s), keeping {}",
                report.total_removed,
                if dry_run { "would be removed" } else { "removed" },
                report.wikis.len(),
                report.keep
            );
        }
        Commands::TokenIssue { email, name, label } => {
            let user = match User::find_by_email(&db.pool, &email).await? {
                Some(user) => user,
                None => {
                    let name = name.as_deref().unwrap_or(&email);
                    let user = User::create(&db.pool, name, &email).await?;
                    eprintln!("Created user {} <{}>", user.name, user.email);
                    user
                }
            };
            let issued = ApiToken::issue(&db.pool, user.id, &label).await?;
            eprintln!("Token '{}' issued for {}", issued.token.label, user.email);
            println!("{}", issued.plain_text);
        }
    }

    db.pool.close().await;
    Ok(())
}

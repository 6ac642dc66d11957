use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ipsight::config::{DatabaseBackend, DatabaseConfig};
use ipsight::storage::open_store;

#[derive(Parser)]
#[command(name = "ipsight-admin")]
#[command(about = "ipsight database maintenance CLI", long_about = None)]
struct Cli {
    /// Database backend (sqlite, postgres)
    #[arg(long, env = "DATABASE_BACKEND", default_value = "sqlite")]
    backend: String,

    /// Database connection string
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://./ipsight.db?mode=rwc")]
    database_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the counter table and seed it at zero
    Init,
    /// Print the persisted access count
    Count,
    /// Check database connectivity
    Ping,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let backend = match cli.backend.to_lowercase().as_str() {
        "postgres" | "postgresql" => DatabaseBackend::Postgres,
        _ => DatabaseBackend::Sqlite,
    };

    let store = open_store(&DatabaseConfig {
        backend,
        url: cli.database_url.clone(),
        max_connections: 1,
    })
    .await
    .with_context(|| format!("failed to open {} database", backend.as_str()))?;

    match cli.command {
        Commands::Init => {
            store.init().await.context("failed to create schema")?;
            println!("✓ Counter table ready ({})", backend.as_str());
        }
        Commands::Count => {
            let count = store.load().await.context("failed to read access counter")?;
            println!("{}", count);
        }
        Commands::Ping => {
            store.ping().await.context("database is offline")?;
            println!("✓ Database is online");
        }
    }

    store.close().await?;

    Ok(())
}

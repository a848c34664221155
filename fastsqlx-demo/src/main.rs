//! fastsqlx-demo - heroes HTTP API
//!
//! - `serve`: run the API with a session per request and paginated listing
//! - `init-db`: create the `hero` table

use std::net::SocketAddr;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fastsqlx::{Database, DatabaseConfig};

mod heroes;
mod server;
mod tracing_setup;

use server::ServerConfig;
use tracing_setup::TracingConfig;

#[derive(Parser, Debug)]
#[command(name = "fastsqlx-demo", author, version, about = "Heroes API built on fastsqlx")]
struct Cli {
    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP server
    Serve(ServeArgs),
    /// Create the hero table if it does not exist
    InitDb(DatabaseArgs),
}

/// Arguments for the serve command
#[derive(Parser, Debug)]
struct ServeArgs {
    /// Address to bind to (default: 127.0.0.1:3030)
    #[arg(long, short = 'b', default_value = "127.0.0.1:3030")]
    bind: SocketAddr,

    /// Allow permissive CORS (all origins) - use with caution
    #[arg(long)]
    cors_permissive: bool,

    #[command(flatten)]
    database: DatabaseArgs,
}

#[derive(Parser, Debug)]
struct DatabaseArgs {
    /// Database URL (overrides DATABASE_URL from the environment)
    #[arg(long)]
    database_url: Option<String>,
}

impl DatabaseArgs {
    /// Pool configuration from the environment, with `--database-url` taking
    /// precedence over `DATABASE_URL`.
    fn config(&self) -> Result<DatabaseConfig> {
        let vars = std::env::vars().chain(
            self.database_url
                .clone()
                .map(|url| ("DATABASE_URL".to_string(), url)),
        );
        DatabaseConfig::from_vars(vars).context(
            "DATABASE_URL not set. Set via --database-url, DATABASE_URL env, or a .env file",
        )
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    tracing_setup::init(&TracingConfig { debug: cli.debug }).ok();

    match cli.command {
        Commands::Serve(args) => run_serve(args).await?,
        Commands::InitDb(args) => run_init_db(args).await?,
    }
    Ok(())
}

async fn run_serve(args: ServeArgs) -> Result<()> {
    let config = ServerConfig {
        bind_addr: args.bind,
        cors_permissive: args.cors_permissive,
    };

    fastsqlx::lifespan(args.database.config()?, |db| server::run_server(db, config))
        .await
        .context("Failed to open database")?
        .context("Server error")?;

    Ok(())
}

async fn run_init_db(args: DatabaseArgs) -> Result<()> {
    let db = Database::connect(args.config()?)
        .await
        .context("Failed to open database")?;

    heroes::create_schema(&db)
        .await
        .context("Failed to create hero table")?;
    tracing::info!(backend = db.backend().name(), "hero table ready");

    db.close().await;
    Ok(())
}

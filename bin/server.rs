// Sakila Reports - Web Server
// HTML report page plus a JSON API over the same report engine

use anyhow::{Context, Result};
use clap::Parser;
use sakila_reports::web::{router, AppState};
use sakila_reports::{logging, Config, VERSION};

#[derive(Parser, Debug)]
#[command(name = "sakila-server")]
#[command(version = VERSION)]
#[command(about = "Serve the Sakila reports over HTTP")]
struct ServerArgs {
    #[command(flatten)]
    config: Config,

    /// Address to listen on
    #[arg(long, env = "SAKILA_BIND", default_value = "0.0.0.0:8000")]
    bind: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = ServerArgs::parse();
    logging::init(&args.config.log_level);

    if !args.config.db_path.exists() {
        // Keep serving: /health reports the failure and every report renders an error.
        tracing::warn!(
            db = %args.config.db_path.display(),
            "database not found, run `sakila-reports import <dir>` first"
        );
    }

    let listener = tokio::net::TcpListener::bind(&args.bind)
        .await
        .with_context(|| format!("Failed to bind to {}", args.bind))?;

    tracing::info!(
        addr = %args.bind,
        db = %args.config.db_path.display(),
        timeout_secs = args.config.query_timeout_secs,
        "server listening"
    );

    let app = router(AppState::new(args.config));

    axum::serve(listener, app)
        .await
        .context("Server terminated unexpectedly")?;

    Ok(())
}

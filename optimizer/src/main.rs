//! Binary entrypoint: `sql-optimizer serve` starts the HTTP
//! surface, the other subcommands run one pipeline stage against a DSN and
//! exit. Bootstrap shape: load config, init tracing, init process-wide
//! caches, build state, bind, serve.

use clap::Parser;
use sql_optimizer::cli::{Cli, Commands};
use sql_optimizer::pathology::catalog;
use sql_optimizer::worker::llm::HttpLlmProvider;
use sql_optimizer::{cli, config::Config, http, AppState};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    sql_optimizer::utils::logging::init(&config.logging.level);

    tracing::info!("sql-optimizer starting up");

    let parsed = Cli::parse();

    match parsed.command {
        Commands::Serve => serve(config).await,
        _ => {
            let code = cli::run(parsed, config).await;
            std::process::exit(code);
        }
    }
}

async fn serve(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    catalog::init(&config.catalogs.pathology_profile_path, &config.catalogs.transform_catalog_path)?;
    tracing::info!("pathology and transform catalogs loaded");

    let llm_provider = Arc::new(HttpLlmProvider::new(&config.llm.provider_url, &config.llm.api_key, &config.llm.model));

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = Arc::new(AppState::new(config, llm_provider));

    let app = http::router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("server listening on http://{addr}");
    tracing::info!("API documentation available at http://{addr}/docs");

    axum::serve(listener, app).await?;
    Ok(())
}

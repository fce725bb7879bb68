use anyhow::{Context as _, Result};
use tracing_subscriber::EnvFilter;

use volunteer_hub::config::Config;
use volunteer_hub::{app, db};

const DEFAULT_LOG_FILTER: &str = "volunteer_hub=info,tower_http=info";

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    let config = Config::from_env()?;
    let pool = db::connect(&config.database_url).await?;
    let app = app(pool, &config)?;

    let address = config.address();
    tracing::info!(%address, "listening");
    axum::Server::bind(&address)
        .serve(app.into_make_service())
        .await
        .context("Server failed")
}

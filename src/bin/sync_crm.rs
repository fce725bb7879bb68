//! Runs a single CRM sync against the configured database and prints the report.

use anyhow::{bail, Result};
use tracing_subscriber::EnvFilter;

use volunteer_hub::config::Config;
use volunteer_hub::db;
use volunteer_hub::salesforce::{sync, SalesforceClient};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("volunteer_hub=info")),
        )
        .init();

    let config = Config::from_env()?;
    let salesforce = match config.salesforce.clone() {
        Some(salesforce) => salesforce,
        None => bail!(
            "Set SALESFORCE_CLIENT_ID, SALESFORCE_CLIENT_SECRET, SALESFORCE_USERNAME, \
             and SALESFORCE_PASSWORD to sync"
        ),
    };

    let pool = db::connect(&config.database_url).await?;
    let client = SalesforceClient::new(salesforce)?;
    let report = sync(&client, &pool).await?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

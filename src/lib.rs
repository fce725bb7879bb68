//! The backend for Volunteer Hub, which tracks volunteers, the programs and
//! workshops they help run, and who has signed up for what.
//!
//! ## Layout
//!
//! - [`models`] holds the records and every query and mutation on them.
//! - [`routes`] maps the JSON API under `/api` onto the models.
//! - [`salesforce`] imports volunteer jobs, shifts, and hours from the CRM.
//! - [`error`] defines [`HubError`](error::HubError), which every fallible
//!   operation returns and which renders itself as a JSON response.

use std::sync::Arc;

use axum::Router;
use sqlx::SqlitePool;

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod routes;
pub mod salesforce;
pub mod util;


use crate::config::Config;
use crate::salesforce::{Crm, SalesforceClient};

/// The whole API, with the CRM client built from the config.
pub fn app(pool: SqlitePool, config: &Config) -> anyhow::Result<Router> {
    let crm = match &config.salesforce {
        Some(salesforce) => {
            let client = SalesforceClient::new(salesforce.clone())?;
            Some(Arc::new(client) as Arc<dyn Crm>)
        }
        None => {
            tracing::info!("Salesforce credentials not set, CRM sync is disabled");
            None
        }
    };

    Ok(routes::router(pool, config, crm))
}

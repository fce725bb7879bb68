//! The HTTP API, served under `/api`.
//!
//! Handlers are thin: they pull the pool out of the request, open a
//! connection or transaction, and hand off to the models. Every multi-step
//! write runs in a transaction that is only committed on success, so a
//! failed request leaves nothing behind.

use std::sync::Arc;

use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post, put};
use axum::{Extension, Router};
use sqlx::SqlitePool;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::salesforce::Crm;

pub mod misc;
pub mod opportunities;
pub mod participant_workshops;
pub mod participants;
pub mod programs;
pub mod salesforce;
pub mod signups;
pub mod volunteers;
pub mod workshops;

/// The CRM client, if credentials were configured.
#[derive(Clone)]
pub struct CrmHandle(pub Option<Arc<dyn Crm>>);

pub fn router(pool: SqlitePool, config: &Config, crm: Option<Arc<dyn Crm>>) -> Router {
    Router::new()
        .nest("/api", api_routes())
        .layer(Extension(pool))
        .layer(Extension(CrmHandle(crm)))
        .layer(cors_layer(&config.cors_origins))
        .layer(TraceLayer::new_for_http())
}

fn api_routes() -> Router {
    Router::new()
        .route(
            "/programs",
            get(programs::list_programs).post(programs::new_program),
        )
        .route(
            "/programs/:id",
            get(programs::get_program)
                .put(programs::update_program)
                .delete(programs::delete_program),
        )
        .route(
            "/workshops",
            get(workshops::list_workshops).post(workshops::new_workshop),
        )
        .route(
            "/workshops/:id",
            get(workshops::get_workshop)
                .put(workshops::update_workshop)
                .delete(workshops::delete_workshop),
        )
        .route(
            "/opportunities",
            get(opportunities::list_opportunities).post(opportunities::new_opportunity),
        )
        .route(
            "/opportunities/:id",
            get(opportunities::get_opportunity)
                .put(opportunities::update_opportunity)
                .delete(opportunities::delete_opportunity),
        )
        .route(
            "/participants",
            get(participants::list_participants).post(participants::new_participant),
        )
        .route(
            "/participants/:id",
            get(participants::get_participant)
                .put(participants::update_participant)
                .delete(participants::delete_participant),
        )
        .route(
            "/volunteers",
            get(volunteers::list_volunteers).post(volunteers::new_volunteer),
        )
        .route(
            "/volunteers/:id",
            get(volunteers::get_volunteer)
                .put(volunteers::update_volunteer)
                .delete(volunteers::delete_volunteer),
        )
        .route("/volunteers/:id/signups", get(signups::volunteer_signups))
        .route("/signups", get(signups::list_signups).post(signups::sign_up))
        .route(
            "/signups/:id",
            get(signups::get_signup)
                .put(signups::update_signup)
                .delete(signups::delete_signup),
        )
        .route("/coach-signups", post(signups::coach_sign_up))
        .route(
            "/participant-workshops",
            get(participant_workshops::list_registrations)
                .post(participant_workshops::register),
        )
        .route(
            "/participant-workshops/:participant_id/:workshop_id",
            put(participant_workshops::update_registration)
                .delete(participant_workshops::delete_registration),
        )
        .route("/stats", get(misc::stats))
        .route("/health", get(misc::health))
        .route("/version", get(misc::version))
        .route("/debug/db-connection", get(misc::db_connection))
        .route("/salesforce/test", get(salesforce::test_connection))
        .route("/salesforce/objects", get(salesforce::list_objects))
        .route("/salesforce/query/:object_name", get(salesforce::query_object))
        .route("/salesforce/sync", post(salesforce::run_sync))
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(%origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT])
}

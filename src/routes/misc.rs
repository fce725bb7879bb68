use std::collections::BTreeMap;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use serde_json::{json, Value};
use sqlx::SqlitePool;

use crate::db::TABLES;
use crate::error::HubResult;
use crate::models::stats::Stats;
use crate::util::today;

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn version() -> Json<Value> {
    Json(json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn stats(Extension(pool): Extension<SqlitePool>) -> HubResult<Json<Stats>> {
    let mut conn = pool.acquire().await?;
    Stats::as_of(today(), &mut conn).await.map(Json)
}

/// Counts the rows in every table, reporting failures in the body.
pub async fn db_connection(Extension(pool): Extension<SqlitePool>) -> Response {
    match count_rows(&pool).await {
        Ok(tables) => Json(json!({
            "success": true,
            "message": "Database connection is working",
            "tables": tables,
        }))
        .into_response(),
        Err(error) => {
            tracing::error!(%error, "database connection check failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "success": false,
                    "message": format!("Database connection failed: {}", error),
                })),
            )
                .into_response()
        }
    }
}

async fn count_rows(pool: &SqlitePool) -> Result<BTreeMap<&'static str, i64>, sqlx::Error> {
    let mut conn = pool.acquire().await?;
    let mut tables = BTreeMap::new();
    for table in TABLES {
        let count = sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(&mut *conn)
            .await?;
        tables.insert(table, count);
    }

    Ok(tables)
}

use std::sync::Arc;

use axum::extract::{Path, Query};
use axum::{Extension, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use sqlx::SqlitePool;

use crate::error::{HubError, HubResult};
use crate::models::parse_filter;
use crate::routes::CrmHandle;
use crate::salesforce::{is_valid_object_name, sync, Crm};

const DEFAULT_QUERY_LIMIT: i64 = 10;
const MAX_QUERY_LIMIT: i64 = 200;

impl CrmHandle {
    fn client(&self) -> HubResult<Arc<dyn Crm>> {
        self.0.clone().ok_or(HubError::CrmDisabled)
    }
}

pub async fn test_connection(Extension(crm): Extension<CrmHandle>) -> HubResult<Json<Value>> {
    let identity = crm.client()?.identity().await?;

    Ok(Json(json!({
        "success": true,
        "message": "Successfully connected to Salesforce",
        "userInfo": identity.user_info,
        "organizationId": identity.organization_id,
    })))
}

/// Object types from the volunteer management package, or otherwise about volunteers.
pub async fn list_objects(Extension(crm): Extension<CrmHandle>) -> HubResult<Json<Value>> {
    let objects: Vec<String> = crm
        .client()?
        .list_objects()
        .await?
        .into_iter()
        .filter(|name| name.contains("Volunteer"))
        .collect();

    Ok(Json(json!({
        "success": true,
        "objects": objects,
    })))
}

#[derive(Debug, Default, Deserialize)]
pub struct QueryLimit {
    pub limit: Option<String>,
}

pub async fn query_object(
    Extension(crm): Extension<CrmHandle>,
    Path(object_name): Path<String>,
    Query(params): Query<QueryLimit>,
) -> HubResult<Json<Value>> {
    let crm = crm.client()?;
    if !is_valid_object_name(&object_name) {
        return Err(HubError::Validation(format!(
            "{:?} is not a valid object name",
            object_name
        )));
    }

    let limit = parse_filter::<i64>(params.limit.as_deref())
        .unwrap_or(DEFAULT_QUERY_LIMIT)
        .clamp(1, MAX_QUERY_LIMIT);
    let soql = format!("SELECT FIELDS(ALL) FROM {} LIMIT {}", object_name, limit);
    let records = crm.query(&soql).await?;

    Ok(Json(json!({
        "success": true,
        "records": records,
    })))
}

pub async fn run_sync(
    Extension(pool): Extension<SqlitePool>,
    Extension(crm): Extension<CrmHandle>,
) -> HubResult<Json<Value>> {
    let crm = crm.client()?;
    let report = sync(crm.as_ref(), &pool).await?;

    Ok(Json(json!({
        "success": true,
        "report": report,
    })))
}

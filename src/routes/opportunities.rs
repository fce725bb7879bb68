use axum::extract::{Path, Query};
use axum::http::StatusCode;
use axum::{Extension, Json};
use sqlx::SqlitePool;

use crate::db;
use crate::error::HubResult;
use crate::models::opportunity::{
    NewOpportunity, Opportunity, OpportunityFilter, OpportunityUpdate,
};

pub async fn list_opportunities(
    Extension(pool): Extension<SqlitePool>,
    Query(filter): Query<OpportunityFilter>,
) -> HubResult<Json<Vec<Opportunity>>> {
    let mut conn = pool.acquire().await?;
    Opportunity::list(&filter, &mut conn).await.map(Json)
}

pub async fn get_opportunity(
    Extension(pool): Extension<SqlitePool>,
    Path(id): Path<i64>,
) -> HubResult<Json<Opportunity>> {
    let mut conn = pool.acquire().await?;
    Opportunity::with_id(id, &mut conn).await.map(Json)
}

pub async fn new_opportunity(
    Extension(pool): Extension<SqlitePool>,
    Json(new_opportunity): Json<NewOpportunity>,
) -> HubResult<(StatusCode, Json<Opportunity>)> {
    let mut transaction = db::begin_write(&pool).await?;
    let opportunity = Opportunity::create(new_opportunity, &mut transaction).await?;
    transaction.commit().await?;

    Ok((StatusCode::CREATED, Json(opportunity)))
}

pub async fn update_opportunity(
    Extension(pool): Extension<SqlitePool>,
    Path(id): Path<i64>,
    Json(update): Json<OpportunityUpdate>,
) -> HubResult<Json<Opportunity>> {
    let mut transaction = db::begin_write(&pool).await?;
    let opportunity = Opportunity::update(id, update, &mut transaction).await?;
    transaction.commit().await?;

    Ok(Json(opportunity))
}

pub async fn delete_opportunity(
    Extension(pool): Extension<SqlitePool>,
    Path(id): Path<i64>,
) -> HubResult<StatusCode> {
    let mut transaction = db::begin_write(&pool).await?;
    Opportunity::delete(id, &mut transaction).await?;
    transaction.commit().await?;

    Ok(StatusCode::NO_CONTENT)
}

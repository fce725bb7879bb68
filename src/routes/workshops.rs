use axum::extract::{Path, Query};
use axum::http::StatusCode;
use axum::{Extension, Json};
use sqlx::SqlitePool;

use crate::db;
use crate::error::HubResult;
use crate::models::workshop::{NewWorkshop, Workshop, WorkshopFilter, WorkshopUpdate};

pub async fn list_workshops(
    Extension(pool): Extension<SqlitePool>,
    Query(filter): Query<WorkshopFilter>,
) -> HubResult<Json<Vec<Workshop>>> {
    let mut conn = pool.acquire().await?;
    Workshop::list(&filter, &mut conn).await.map(Json)
}

pub async fn get_workshop(
    Extension(pool): Extension<SqlitePool>,
    Path(id): Path<i64>,
) -> HubResult<Json<Workshop>> {
    let mut conn = pool.acquire().await?;
    Workshop::with_id(id, &mut conn).await.map(Json)
}

pub async fn new_workshop(
    Extension(pool): Extension<SqlitePool>,
    Json(new_workshop): Json<NewWorkshop>,
) -> HubResult<(StatusCode, Json<Workshop>)> {
    let mut transaction = db::begin_write(&pool).await?;
    let workshop = Workshop::create(new_workshop, &mut transaction).await?;
    transaction.commit().await?;

    Ok((StatusCode::CREATED, Json(workshop)))
}

pub async fn update_workshop(
    Extension(pool): Extension<SqlitePool>,
    Path(id): Path<i64>,
    Json(update): Json<WorkshopUpdate>,
) -> HubResult<Json<Workshop>> {
    let mut transaction = db::begin_write(&pool).await?;
    let workshop = Workshop::update(id, update, &mut transaction).await?;
    transaction.commit().await?;

    Ok(Json(workshop))
}

pub async fn delete_workshop(
    Extension(pool): Extension<SqlitePool>,
    Path(id): Path<i64>,
) -> HubResult<StatusCode> {
    let mut transaction = db::begin_write(&pool).await?;
    Workshop::delete(id, &mut transaction).await?;
    transaction.commit().await?;

    Ok(StatusCode::NO_CONTENT)
}

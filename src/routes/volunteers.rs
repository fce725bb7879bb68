use axum::extract::{Path, Query};
use axum::http::StatusCode;
use axum::{Extension, Json};
use sqlx::SqlitePool;

use crate::db;
use crate::error::HubResult;
use crate::models::volunteer::{NewVolunteer, Volunteer, VolunteerFilter, VolunteerUpdate};
use crate::models::Page;

pub async fn list_volunteers(
    Extension(pool): Extension<SqlitePool>,
    Query(filter): Query<VolunteerFilter>,
) -> HubResult<Json<Page<Volunteer>>> {
    let mut conn = pool.acquire().await?;
    Volunteer::list(&filter, &mut conn).await.map(Json)
}

pub async fn get_volunteer(
    Extension(pool): Extension<SqlitePool>,
    Path(id): Path<i64>,
) -> HubResult<Json<Volunteer>> {
    let mut conn = pool.acquire().await?;
    Volunteer::with_id(id, &mut conn).await.map(Json)
}

pub async fn new_volunteer(
    Extension(pool): Extension<SqlitePool>,
    Json(new_volunteer): Json<NewVolunteer>,
) -> HubResult<(StatusCode, Json<Volunteer>)> {
    let mut transaction = db::begin_write(&pool).await?;
    let volunteer = Volunteer::create(new_volunteer, &mut transaction).await?;
    transaction.commit().await?;

    Ok((StatusCode::CREATED, Json(volunteer)))
}

pub async fn update_volunteer(
    Extension(pool): Extension<SqlitePool>,
    Path(id): Path<i64>,
    Json(update): Json<VolunteerUpdate>,
) -> HubResult<Json<Volunteer>> {
    let mut transaction = db::begin_write(&pool).await?;
    let volunteer = Volunteer::update(id, update, &mut transaction).await?;
    transaction.commit().await?;

    Ok(Json(volunteer))
}

/// Also removes the volunteer's signups, freeing the spots they held.
pub async fn delete_volunteer(
    Extension(pool): Extension<SqlitePool>,
    Path(id): Path<i64>,
) -> HubResult<StatusCode> {
    let mut transaction = db::begin_write(&pool).await?;
    Volunteer::delete(id, &mut transaction).await?;
    transaction.commit().await?;

    Ok(StatusCode::NO_CONTENT)
}

use axum::extract::{Path, Query};
use axum::http::StatusCode;
use axum::{Extension, Json};
use sqlx::SqlitePool;

use crate::db;
use crate::error::HubResult;
use crate::models::participant_workshop::{
    NewRegistration, ParticipantWorkshop, RegistrationFilter, RegistrationUpdate,
};

pub async fn list_registrations(
    Extension(pool): Extension<SqlitePool>,
    Query(filter): Query<RegistrationFilter>,
) -> HubResult<Json<Vec<ParticipantWorkshop>>> {
    let mut conn = pool.acquire().await?;
    ParticipantWorkshop::list(&filter, &mut conn).await.map(Json)
}

pub async fn register(
    Extension(pool): Extension<SqlitePool>,
    Json(new_registration): Json<NewRegistration>,
) -> HubResult<(StatusCode, Json<ParticipantWorkshop>)> {
    let mut transaction = db::begin_write(&pool).await?;
    let registration = ParticipantWorkshop::register(new_registration, &mut transaction).await?;
    transaction.commit().await?;

    Ok((StatusCode::CREATED, Json(registration)))
}

pub async fn update_registration(
    Extension(pool): Extension<SqlitePool>,
    Path((participant_id, workshop_id)): Path<(i64, i64)>,
    Json(update): Json<RegistrationUpdate>,
) -> HubResult<Json<ParticipantWorkshop>> {
    let mut transaction = db::begin_write(&pool).await?;
    let registration =
        ParticipantWorkshop::update(participant_id, workshop_id, update, &mut transaction).await?;
    transaction.commit().await?;

    Ok(Json(registration))
}

pub async fn delete_registration(
    Extension(pool): Extension<SqlitePool>,
    Path((participant_id, workshop_id)): Path<(i64, i64)>,
) -> HubResult<StatusCode> {
    let mut transaction = db::begin_write(&pool).await?;
    ParticipantWorkshop::delete(participant_id, workshop_id, &mut transaction).await?;
    transaction.commit().await?;

    Ok(StatusCode::NO_CONTENT)
}

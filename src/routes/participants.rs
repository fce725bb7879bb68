use axum::extract::{Path, Query};
use axum::http::StatusCode;
use axum::{Extension, Json};
use sqlx::SqlitePool;

use crate::db;
use crate::error::HubResult;
use crate::models::participant::{
    NewParticipant, Participant, ParticipantFilter, ParticipantUpdate,
};

pub async fn list_participants(
    Extension(pool): Extension<SqlitePool>,
    Query(filter): Query<ParticipantFilter>,
) -> HubResult<Json<Vec<Participant>>> {
    let mut conn = pool.acquire().await?;
    Participant::list(&filter, &mut conn).await.map(Json)
}

pub async fn get_participant(
    Extension(pool): Extension<SqlitePool>,
    Path(id): Path<i64>,
) -> HubResult<Json<Participant>> {
    let mut conn = pool.acquire().await?;
    Participant::with_id(id, &mut conn).await.map(Json)
}

pub async fn new_participant(
    Extension(pool): Extension<SqlitePool>,
    Json(new_participant): Json<NewParticipant>,
) -> HubResult<(StatusCode, Json<Participant>)> {
    let mut transaction = db::begin_write(&pool).await?;
    let participant = Participant::create(new_participant, &mut transaction).await?;
    transaction.commit().await?;

    Ok((StatusCode::CREATED, Json(participant)))
}

pub async fn update_participant(
    Extension(pool): Extension<SqlitePool>,
    Path(id): Path<i64>,
    Json(update): Json<ParticipantUpdate>,
) -> HubResult<Json<Participant>> {
    let mut transaction = db::begin_write(&pool).await?;
    let participant = Participant::update(id, update, &mut transaction).await?;
    transaction.commit().await?;

    Ok(Json(participant))
}

pub async fn delete_participant(
    Extension(pool): Extension<SqlitePool>,
    Path(id): Path<i64>,
) -> HubResult<StatusCode> {
    let mut transaction = db::begin_write(&pool).await?;
    Participant::delete(id, &mut transaction).await?;
    transaction.commit().await?;

    Ok(StatusCode::NO_CONTENT)
}

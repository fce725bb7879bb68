use axum::extract::{Path, Query};
use axum::http::StatusCode;
use axum::{Extension, Json};
use sqlx::SqlitePool;

use crate::db;
use crate::error::HubResult;
use crate::models::program::{NewProgram, Program, ProgramFilter, ProgramUpdate};

pub async fn list_programs(
    Extension(pool): Extension<SqlitePool>,
    Query(filter): Query<ProgramFilter>,
) -> HubResult<Json<Vec<Program>>> {
    let mut conn = pool.acquire().await?;
    Program::list(&filter, &mut conn).await.map(Json)
}

pub async fn get_program(
    Extension(pool): Extension<SqlitePool>,
    Path(id): Path<i64>,
) -> HubResult<Json<Program>> {
    let mut conn = pool.acquire().await?;
    Program::with_id(id, &mut conn).await.map(Json)
}

pub async fn new_program(
    Extension(pool): Extension<SqlitePool>,
    Json(new_program): Json<NewProgram>,
) -> HubResult<(StatusCode, Json<Program>)> {
    let mut transaction = db::begin_write(&pool).await?;
    let program = Program::create(new_program, &mut transaction).await?;
    transaction.commit().await?;

    Ok((StatusCode::CREATED, Json(program)))
}

pub async fn update_program(
    Extension(pool): Extension<SqlitePool>,
    Path(id): Path<i64>,
    Json(update): Json<ProgramUpdate>,
) -> HubResult<Json<Program>> {
    let mut transaction = db::begin_write(&pool).await?;
    let program = Program::update(id, update, &mut transaction).await?;
    transaction.commit().await?;

    Ok(Json(program))
}

pub async fn delete_program(
    Extension(pool): Extension<SqlitePool>,
    Path(id): Path<i64>,
) -> HubResult<StatusCode> {
    let mut transaction = db::begin_write(&pool).await?;
    Program::delete(id, &mut transaction).await?;
    transaction.commit().await?;

    Ok(StatusCode::NO_CONTENT)
}

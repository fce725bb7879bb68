use axum::extract::{Path, Query};
use axum::http::StatusCode;
use axum::{Extension, Json};
use sqlx::SqlitePool;

use crate::db;
use crate::error::HubResult;
use crate::models::signup::coach::{CoachSignup, CoachSignupResult};
use crate::models::signup::{NewSignup, SignupFilter, SignupUpdate, VolunteerSignup};

pub async fn list_signups(
    Extension(pool): Extension<SqlitePool>,
    Query(filter): Query<SignupFilter>,
) -> HubResult<Json<Vec<VolunteerSignup>>> {
    let mut conn = pool.acquire().await?;
    VolunteerSignup::list(&filter, &mut conn).await.map(Json)
}

pub async fn volunteer_signups(
    Extension(pool): Extension<SqlitePool>,
    Path(volunteer_id): Path<i64>,
) -> HubResult<Json<Vec<VolunteerSignup>>> {
    let mut conn = pool.acquire().await?;
    VolunteerSignup::for_volunteer(volunteer_id, &mut conn)
        .await
        .map(Json)
}

pub async fn get_signup(
    Extension(pool): Extension<SqlitePool>,
    Path(id): Path<i64>,
) -> HubResult<Json<VolunteerSignup>> {
    let mut conn = pool.acquire().await?;
    VolunteerSignup::with_id(id, &mut conn).await.map(Json)
}

pub async fn sign_up(
    Extension(pool): Extension<SqlitePool>,
    Json(new_signup): Json<NewSignup>,
) -> HubResult<(StatusCode, Json<VolunteerSignup>)> {
    let mut transaction = db::begin_write(&pool).await?;
    let signup = VolunteerSignup::sign_up(new_signup, &mut transaction).await?;
    transaction.commit().await?;

    Ok((StatusCode::CREATED, Json(signup)))
}

pub async fn update_signup(
    Extension(pool): Extension<SqlitePool>,
    Path(id): Path<i64>,
    Json(update): Json<SignupUpdate>,
) -> HubResult<Json<VolunteerSignup>> {
    let mut transaction = db::begin_write(&pool).await?;
    let signup = VolunteerSignup::update(id, update, &mut transaction).await?;
    transaction.commit().await?;

    Ok(Json(signup))
}

pub async fn delete_signup(
    Extension(pool): Extension<SqlitePool>,
    Path(id): Path<i64>,
) -> HubResult<StatusCode> {
    let mut transaction = db::begin_write(&pool).await?;
    VolunteerSignup::delete(id, &mut transaction).await?;
    transaction.commit().await?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn coach_sign_up(
    Extension(pool): Extension<SqlitePool>,
    Json(application): Json<CoachSignup>,
) -> HubResult<(StatusCode, Json<CoachSignupResult>)> {
    let mut transaction = db::begin_write(&pool).await?;
    let result = application.submit(&mut transaction).await?;
    transaction.commit().await?;

    Ok((StatusCode::CREATED, Json(result)))
}

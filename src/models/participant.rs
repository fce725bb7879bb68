use serde::{Deserialize, Serialize};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqliteConnection};
use time::OffsetDateTime;

use crate::error::{HubError, HubResult};
use crate::models::program::Program;
use crate::models::{
    optional_text, parse_filter, push_eq, push_search, required, required_text, search_pattern,
    status_enum, UpdateBuilder,
};
use crate::util::{current_time, normalize_email};

status_enum! {
    pub enum ParticipantStatus {
        Enrolled => "enrolled",
        Completed => "completed",
        Withdrawn => "withdrawn",
        Waitlisted => "waitlisted",
    }
}

/// Someone taking part in a program.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub id: i64,
    pub program_id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub status: ParticipantStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

const SELECT_PARTICIPANTS: &str = "SELECT id, program_id, first_name, last_name, email, phone,
        status, created_at, updated_at
    FROM participants WHERE 1 = 1";

impl Participant {
    pub async fn with_id(id: i64, conn: &mut SqliteConnection) -> HubResult<Self> {
        Self::with_id_opt(id, conn)
            .await?
            .ok_or_else(|| HubError::not_found("participant", id))
    }

    pub async fn with_id_opt(id: i64, conn: &mut SqliteConnection) -> HubResult<Option<Self>> {
        let sql = format!("{} AND id = ?", SELECT_PARTICIPANTS);
        sqlx::query_as::<_, Self>(&sql)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await
            .map_err(Into::into)
    }

    pub async fn ensure_exists(id: i64, conn: &mut SqliteConnection) -> HubResult<()> {
        if Self::with_id_opt(id, conn).await?.is_some() {
            Ok(())
        } else {
            Err(HubError::BadReference {
                entity: "participant",
                id,
            })
        }
    }

    pub async fn list(
        filter: &ParticipantFilter,
        conn: &mut SqliteConnection,
    ) -> HubResult<Vec<Self>> {
        let mut builder = QueryBuilder::<Sqlite>::new(SELECT_PARTICIPANTS);
        if let Some(pattern) = search_pattern(filter.search.as_deref()) {
            push_search(&mut builder, &["first_name", "last_name", "email"], &pattern);
        }
        push_eq(
            &mut builder,
            "status",
            parse_filter::<ParticipantStatus>(filter.status.as_deref()),
        );
        push_eq(
            &mut builder,
            "program_id",
            parse_filter::<i64>(filter.program_id.as_deref()),
        );
        builder.push(" ORDER BY id");

        builder
            .build_query_as::<Self>()
            .fetch_all(&mut *conn)
            .await
            .map_err(Into::into)
    }

    pub async fn create(
        new_participant: NewParticipant,
        conn: &mut SqliteConnection,
    ) -> HubResult<Self> {
        let program_id = required(new_participant.program_id, "programId")?;
        let first_name = required_text(new_participant.first_name, "firstName")?;
        let last_name = required_text(new_participant.last_name, "lastName")?;
        let status = new_participant
            .status
            .map(|status| status.parse::<ParticipantStatus>())
            .transpose()?
            .unwrap_or(ParticipantStatus::Enrolled);
        Program::ensure_exists(program_id, conn).await?;

        let now = current_time();
        let id = sqlx::query(
            "INSERT INTO participants
             (program_id, first_name, last_name, email, phone, status, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(program_id)
        .bind(first_name)
        .bind(last_name)
        .bind(optional_text(new_participant.email).map(|email| normalize_email(&email)))
        .bind(optional_text(new_participant.phone))
        .bind(status)
        .bind(now)
        .bind(now)
        .execute(&mut *conn)
        .await?
        .last_insert_rowid();

        tracing::info!(participant = id, program = program_id, "created participant");
        Self::with_id(id, conn).await
    }

    pub async fn update(
        id: i64,
        update: ParticipantUpdate,
        conn: &mut SqliteConnection,
    ) -> HubResult<Self> {
        Self::with_id(id, conn).await?;

        if let Some(program_id) = update.program_id {
            Program::ensure_exists(program_id, conn).await?;
        }
        let first_name = update
            .first_name
            .map(|name| required_text(Some(name), "firstName"))
            .transpose()?;
        let last_name = update
            .last_name
            .map(|name| required_text(Some(name), "lastName"))
            .transpose()?;
        let status = update
            .status
            .map(|status| status.parse::<ParticipantStatus>())
            .transpose()?;
        let email = update.email.map(|email| {
            optional_text(email).map(|email| normalize_email(&email))
        });

        let mut builder = UpdateBuilder::new("participants", "participant");
        builder
            .set_opt("program_id", update.program_id)
            .set_opt("first_name", first_name)
            .set_opt("last_name", last_name)
            .set_opt("email", email)
            .set_opt("phone", update.phone.map(optional_text))
            .set_opt("status", status);
        builder.execute(id, conn).await?;

        tracing::info!(participant = id, "updated participant");
        Self::with_id(id, conn).await
    }

    /// Deletes the participant and their workshop registrations, freeing
    /// their seats. Run inside a transaction.
    pub async fn delete(id: i64, conn: &mut SqliteConnection) -> HubResult<()> {
        Self::with_id(id, conn).await?;

        sqlx::query(
            "UPDATE workshops SET current_participants = current_participants - 1
             WHERE current_participants > 0 AND id IN
             (SELECT workshop_id FROM participant_workshops WHERE participant_id = ?)",
        )
        .bind(id)
        .execute(&mut *conn)
        .await?;

        sqlx::query("DELETE FROM participant_workshops WHERE participant_id = ?")
            .bind(id)
            .execute(&mut *conn)
            .await?;
        sqlx::query("DELETE FROM participants WHERE id = ?")
            .bind(id)
            .execute(&mut *conn)
            .await?;

        tracing::info!(participant = id, "deleted participant");
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantFilter {
    pub search: Option<String>,
    pub status: Option<String>,
    pub program_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewParticipant {
    pub program_id: Option<i64>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantUpdate {
    pub program_id: Option<i64>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    pub email: Option<Option<String>>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    pub phone: Option<Option<String>>,
    pub status: Option<String>,
}

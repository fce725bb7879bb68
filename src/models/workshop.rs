use serde::{Deserialize, Serialize};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqliteConnection};
use time::{Date, OffsetDateTime};

use crate::error::{HubError, HubResult};
use crate::models::program::Program;
use crate::models::{
    optional_text, parse_filter, push_eq, push_search, required, required_text, search_pattern,
    UpdateBuilder,
};
use crate::util::current_time;

/// A single session of a program that participants register for.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Workshop {
    pub id: i64,
    pub program_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub date: Date,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub location: Option<String>,
    pub max_participants: i64,
    /// Kept in step with the participant registrations for this workshop
    pub current_participants: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

const SELECT_WORKSHOPS: &str = "SELECT id, program_id, title, description, date, start_time,
        end_time, location, max_participants, current_participants, created_at, updated_at
    FROM workshops WHERE 1 = 1";

impl Workshop {
    pub async fn with_id(id: i64, conn: &mut SqliteConnection) -> HubResult<Self> {
        Self::with_id_opt(id, conn)
            .await?
            .ok_or_else(|| HubError::not_found("workshop", id))
    }

    pub async fn with_id_opt(id: i64, conn: &mut SqliteConnection) -> HubResult<Option<Self>> {
        let sql = format!("{} AND id = ?", SELECT_WORKSHOPS);
        sqlx::query_as::<_, Self>(&sql)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await
            .map_err(Into::into)
    }

    /// Loads a workshop named by a foreign key, failing with a bad reference.
    pub async fn referenced(id: i64, conn: &mut SqliteConnection) -> HubResult<Self> {
        Self::with_id_opt(id, conn)
            .await?
            .ok_or(HubError::BadReference {
                entity: "workshop",
                id,
            })
    }

    pub async fn list(filter: &WorkshopFilter, conn: &mut SqliteConnection) -> HubResult<Vec<Self>> {
        let mut builder = QueryBuilder::<Sqlite>::new(SELECT_WORKSHOPS);
        if let Some(pattern) = search_pattern(filter.search.as_deref()) {
            push_search(&mut builder, &["title", "description", "location"], &pattern);
        }
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

    pub async fn create(new_workshop: NewWorkshop, conn: &mut SqliteConnection) -> HubResult<Self> {
        let program_id = required(new_workshop.program_id, "programId")?;
        let title = required_text(new_workshop.title, "title")?;
        let date = required(new_workshop.date, "date")?;
        let max_participants = required(new_workshop.max_participants, "maxParticipants")?;
        check_max_participants(max_participants, 0)?;
        Program::ensure_exists(program_id, conn).await?;

        let now = current_time();
        let id = sqlx::query(
            "INSERT INTO workshops
             (program_id, title, description, date, start_time, end_time, location,
              max_participants, current_participants, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?)",
        )
        .bind(program_id)
        .bind(title)
        .bind(optional_text(new_workshop.description))
        .bind(date)
        .bind(optional_text(new_workshop.start_time))
        .bind(optional_text(new_workshop.end_time))
        .bind(optional_text(new_workshop.location))
        .bind(max_participants)
        .bind(now)
        .bind(now)
        .execute(&mut *conn)
        .await?
        .last_insert_rowid();

        tracing::info!(workshop = id, program = program_id, "created workshop");
        Self::with_id(id, conn).await
    }

    pub async fn update(
        id: i64,
        update: WorkshopUpdate,
        conn: &mut SqliteConnection,
    ) -> HubResult<Self> {
        let existing = Self::with_id(id, conn).await?;

        if let Some(program_id) = update.program_id {
            Program::ensure_exists(program_id, conn).await?;
        }
        let title = update
            .title
            .map(|title| required_text(Some(title), "title"))
            .transpose()?;
        if let Some(max_participants) = update.max_participants {
            check_max_participants(max_participants, existing.current_participants)?;
        }

        let mut builder = UpdateBuilder::new("workshops", "workshop");
        builder
            .set_opt("program_id", update.program_id)
            .set_opt("title", title)
            .set_opt("description", update.description.map(optional_text))
            .set_opt("date", update.date)
            .set_opt("start_time", update.start_time.map(optional_text))
            .set_opt("end_time", update.end_time.map(optional_text))
            .set_opt("location", update.location.map(optional_text))
            .set_opt("max_participants", update.max_participants);
        builder.execute(id, conn).await?;

        // opportunities at a workshop belong to the workshop's program
        if let Some(program_id) = update.program_id.filter(|&p| p != existing.program_id) {
            let moved = sqlx::query(
                "UPDATE opportunities SET program_id = ?, updated_at = ? WHERE workshop_id = ?",
            )
            .bind(program_id)
            .bind(current_time())
            .bind(id)
            .execute(&mut *conn)
            .await?
            .rows_affected();

            tracing::info!(
                workshop = id,
                program = program_id,
                opportunities = moved,
                "moved workshop to another program"
            );
        }

        tracing::info!(workshop = id, "updated workshop");
        Self::with_id(id, conn).await
    }

    /// Deletes a workshop nobody is registered for and no opportunity points at.
    pub async fn delete(id: i64, conn: &mut SqliteConnection) -> HubResult<()> {
        Self::with_id(id, conn).await?;

        let (registrations, opportunities) = sqlx::query_as::<_, (i64, i64)>(
            "SELECT
                (SELECT COUNT(*) FROM participant_workshops WHERE workshop_id = ?1),
                (SELECT COUNT(*) FROM opportunities WHERE workshop_id = ?1)",
        )
        .bind(id)
        .fetch_one(&mut *conn)
        .await?;

        if registrations + opportunities > 0 {
            return Err(HubError::Conflict(format!(
                "workshop {} still has {} registration(s) and {} opportunity(s); remove them first",
                id, registrations, opportunities
            )));
        }

        sqlx::query("DELETE FROM workshops WHERE id = ?")
            .bind(id)
            .execute(&mut *conn)
            .await?;

        tracing::info!(workshop = id, "deleted workshop");
        Ok(())
    }

    /// Takes one seat for a registration in the same transaction.
    pub async fn claim_seat(id: i64, conn: &mut SqliteConnection) -> HubResult<()> {
        let result = sqlx::query(
            "UPDATE workshops SET current_participants = current_participants + 1
             WHERE id = ? AND current_participants < max_participants",
        )
        .bind(id)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            Err(HubError::Full {
                entity: "workshop",
                id,
            })
        } else {
            Ok(())
        }
    }

    pub async fn release_seat(id: i64, conn: &mut SqliteConnection) -> HubResult<()> {
        sqlx::query(
            "UPDATE workshops SET current_participants = current_participants - 1
             WHERE id = ? AND current_participants > 0",
        )
        .bind(id)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }
}

fn check_max_participants(max_participants: i64, current_participants: i64) -> HubResult<()> {
    if max_participants < 1 {
        Err(HubError::Validation(
            "maxParticipants must be at least 1".to_owned(),
        ))
    } else if max_participants < current_participants {
        Err(HubError::Validation(format!(
            "maxParticipants cannot drop below the {} participants already registered",
            current_participants
        )))
    } else {
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkshopFilter {
    pub search: Option<String>,
    pub program_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewWorkshop {
    pub program_id: Option<i64>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub date: Option<Date>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub location: Option<String>,
    pub max_participants: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkshopUpdate {
    pub program_id: Option<i64>,
    pub title: Option<String>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    pub description: Option<Option<String>>,
    pub date: Option<Date>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    pub start_time: Option<Option<String>>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    pub end_time: Option<Option<String>>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    pub location: Option<Option<String>>,
    pub max_participants: Option<i64>,
}

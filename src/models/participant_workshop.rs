use serde::{Deserialize, Serialize};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqliteConnection};
use time::OffsetDateTime;

use crate::error::{HubError, HubResult};
use crate::models::participant::Participant;
use crate::models::workshop::Workshop;
use crate::models::{parse_filter, push_eq, required, status_enum};
use crate::util::current_time;

status_enum! {
    pub enum AttendanceStatus {
        Registered => "registered",
        Attended => "attended",
        Absent => "absent",
        Excused => "excused",
    }
}

/// A participant's registration for a workshop.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantWorkshop {
    pub participant_id: i64,
    pub workshop_id: i64,
    pub attendance_status: AttendanceStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

const SELECT_REGISTRATIONS: &str = "SELECT participant_id, workshop_id, attendance_status,
        created_at, updated_at
    FROM participant_workshops WHERE 1 = 1";

impl ParticipantWorkshop {
    pub async fn for_participant_at_workshop(
        participant_id: i64,
        workshop_id: i64,
        conn: &mut SqliteConnection,
    ) -> HubResult<Self> {
        Self::for_participant_at_workshop_opt(participant_id, workshop_id, conn)
            .await?
            .ok_or_else(|| {
                HubError::not_found(
                    "registration",
                    format!("{}/{}", participant_id, workshop_id),
                )
            })
    }

    pub async fn for_participant_at_workshop_opt(
        participant_id: i64,
        workshop_id: i64,
        conn: &mut SqliteConnection,
    ) -> HubResult<Option<Self>> {
        let sql = format!(
            "{} AND participant_id = ? AND workshop_id = ?",
            SELECT_REGISTRATIONS
        );
        sqlx::query_as::<_, Self>(&sql)
            .bind(participant_id)
            .bind(workshop_id)
            .fetch_optional(&mut *conn)
            .await
            .map_err(Into::into)
    }

    pub async fn list(
        filter: &RegistrationFilter,
        conn: &mut SqliteConnection,
    ) -> HubResult<Vec<Self>> {
        let mut builder = QueryBuilder::<Sqlite>::new(SELECT_REGISTRATIONS);
        push_eq(
            &mut builder,
            "participant_id",
            parse_filter::<i64>(filter.participant_id.as_deref()),
        );
        push_eq(
            &mut builder,
            "workshop_id",
            parse_filter::<i64>(filter.workshop_id.as_deref()),
        );
        push_eq(
            &mut builder,
            "attendance_status",
            parse_filter::<AttendanceStatus>(filter.attendance_status.as_deref()),
        );
        builder.push(" ORDER BY rowid");

        builder
            .build_query_as::<Self>()
            .fetch_all(&mut *conn)
            .await
            .map_err(Into::into)
    }

    /// Registers a participant for a workshop, taking a seat. Run inside a
    /// transaction so the registration and the seat count change together.
    pub async fn register(
        new_registration: NewRegistration,
        conn: &mut SqliteConnection,
    ) -> HubResult<Self> {
        let participant_id = required(new_registration.participant_id, "participantId")?;
        let workshop_id = required(new_registration.workshop_id, "workshopId")?;
        let attendance_status = new_registration
            .attendance_status
            .map(|status| status.parse::<AttendanceStatus>())
            .transpose()?
            .unwrap_or(AttendanceStatus::Registered);
        Participant::ensure_exists(participant_id, conn).await?;
        Workshop::referenced(workshop_id, conn).await?;

        let now = current_time();
        let inserted = sqlx::query(
            "INSERT INTO participant_workshops
             (participant_id, workshop_id, attendance_status, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(participant_id, workshop_id) DO NOTHING",
        )
        .bind(participant_id)
        .bind(workshop_id)
        .bind(attendance_status)
        .bind(now)
        .bind(now)
        .execute(&mut *conn)
        .await?;
        if inserted.rows_affected() == 0 {
            return Err(HubError::AlreadySignedUp);
        }

        Workshop::claim_seat(workshop_id, conn).await?;

        tracing::info!(
            participant = participant_id,
            workshop = workshop_id,
            "registered participant for workshop"
        );
        Self::for_participant_at_workshop(participant_id, workshop_id, conn).await
    }

    pub async fn update(
        participant_id: i64,
        workshop_id: i64,
        update: RegistrationUpdate,
        conn: &mut SqliteConnection,
    ) -> HubResult<Self> {
        Self::for_participant_at_workshop(participant_id, workshop_id, conn).await?;

        if let Some(status) = update.attendance_status {
            let status: AttendanceStatus = status.parse()?;
            sqlx::query(
                "UPDATE participant_workshops SET attendance_status = ?, updated_at = ?
                 WHERE participant_id = ? AND workshop_id = ?",
            )
            .bind(status)
            .bind(current_time())
            .bind(participant_id)
            .bind(workshop_id)
            .execute(&mut *conn)
            .await?;
        }

        Self::for_participant_at_workshop(participant_id, workshop_id, conn).await
    }

    /// Removes a registration and frees its seat. Run inside a transaction.
    pub async fn delete(
        participant_id: i64,
        workshop_id: i64,
        conn: &mut SqliteConnection,
    ) -> HubResult<()> {
        let result = sqlx::query(
            "DELETE FROM participant_workshops WHERE participant_id = ? AND workshop_id = ?",
        )
        .bind(participant_id)
        .bind(workshop_id)
        .execute(&mut *conn)
        .await?;
        if result.rows_affected() == 0 {
            return Err(HubError::not_found(
                "registration",
                format!("{}/{}", participant_id, workshop_id),
            ));
        }

        Workshop::release_seat(workshop_id, conn).await?;

        tracing::info!(
            participant = participant_id,
            workshop = workshop_id,
            "removed workshop registration"
        );
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationFilter {
    pub participant_id: Option<String>,
    pub workshop_id: Option<String>,
    pub attendance_status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRegistration {
    pub participant_id: Option<i64>,
    pub workshop_id: Option<i64>,
    pub attendance_status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationUpdate {
    pub attendance_status: Option<String>,
}

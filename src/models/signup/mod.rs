//! Volunteer signups, for single opportunities and as program coaches.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqliteConnection};
use time::OffsetDateTime;

use crate::error::{HubError, HubResult};
use crate::models::opportunity::Opportunity;
use crate::models::program::Program;
use crate::models::volunteer::Volunteer;
use crate::models::{optional_text, parse_filter, push_eq, required, status_enum, UpdateBuilder};
use crate::util::current_time;

pub mod coach;

status_enum! {
    pub enum SignupStatus {
        Pending => "pending",
        Confirmed => "confirmed",
        Completed => "completed",
        /// Doesn't hold a spot
        Cancelled => "cancelled",
    }
}

/// A volunteer signed up for either an opportunity or, as a coach, a program.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VolunteerSignup {
    pub id: i64,
    pub volunteer_id: i64,
    pub opportunity_id: Option<i64>,
    pub program_id: Option<i64>,
    pub status: SignupStatus,
    pub hours_worked: f64,
    pub comments: Option<String>,
    /// The Salesforce hours record this signup was imported from
    pub external_id: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

const SELECT_SIGNUPS: &str = "SELECT id, volunteer_id, opportunity_id, program_id, status,
        hours_worked, comments, external_id, created_at, updated_at
    FROM volunteer_signups WHERE 1 = 1";

impl VolunteerSignup {
    pub fn holds_spot(&self) -> bool {
        self.status != SignupStatus::Cancelled
    }

    pub async fn with_id(id: i64, conn: &mut SqliteConnection) -> HubResult<Self> {
        Self::with_id_opt(id, conn)
            .await?
            .ok_or_else(|| HubError::not_found("signup", id))
    }

    pub async fn with_id_opt(id: i64, conn: &mut SqliteConnection) -> HubResult<Option<Self>> {
        let sql = format!("{} AND id = ?", SELECT_SIGNUPS);
        sqlx::query_as::<_, Self>(&sql)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await
            .map_err(Into::into)
    }

    pub async fn list(filter: &SignupFilter, conn: &mut SqliteConnection) -> HubResult<Vec<Self>> {
        let mut builder = QueryBuilder::<Sqlite>::new(SELECT_SIGNUPS);
        push_eq(
            &mut builder,
            "volunteer_id",
            parse_filter::<i64>(filter.volunteer_id.as_deref()),
        );
        push_eq(
            &mut builder,
            "opportunity_id",
            parse_filter::<i64>(filter.opportunity_id.as_deref()),
        );
        push_eq(
            &mut builder,
            "program_id",
            parse_filter::<i64>(filter.program_id.as_deref()),
        );
        push_eq(
            &mut builder,
            "status",
            parse_filter::<SignupStatus>(filter.status.as_deref()),
        );
        builder.push(" ORDER BY id");

        builder
            .build_query_as::<Self>()
            .fetch_all(&mut *conn)
            .await
            .map_err(Into::into)
    }

    /// All of a volunteer's signups, failing if the volunteer doesn't exist.
    pub async fn for_volunteer(
        volunteer_id: i64,
        conn: &mut SqliteConnection,
    ) -> HubResult<Vec<Self>> {
        Volunteer::with_id(volunteer_id, conn).await?;

        let sql = format!("{} AND volunteer_id = ? ORDER BY id", SELECT_SIGNUPS);
        sqlx::query_as::<_, Self>(&sql)
            .bind(volunteer_id)
            .fetch_all(&mut *conn)
            .await
            .map_err(Into::into)
    }

    /// Signs a volunteer up for an opportunity and takes one of its spots.
    ///
    /// Run inside a transaction: if the opportunity turns out to be full, the
    /// inserted signup must be rolled back with it.
    pub async fn sign_up(new_signup: NewSignup, conn: &mut SqliteConnection) -> HubResult<Self> {
        let volunteer_id = required(new_signup.volunteer_id, "volunteerId")?;
        let opportunity_id = required(new_signup.opportunity_id, "opportunityId")?;
        Volunteer::ensure_exists(volunteer_id, conn).await?;
        Opportunity::ensure_exists(opportunity_id, conn).await?;

        let now = current_time();
        let inserted = sqlx::query(
            "INSERT INTO volunteer_signups
             (volunteer_id, opportunity_id, status, hours_worked, comments, created_at, updated_at)
             VALUES (?, ?, 'pending', 0, ?, ?, ?)
             ON CONFLICT(volunteer_id, opportunity_id) DO NOTHING",
        )
        .bind(volunteer_id)
        .bind(opportunity_id)
        .bind(optional_text(new_signup.comments))
        .bind(now)
        .bind(now)
        .execute(&mut *conn)
        .await?;
        if inserted.rows_affected() == 0 {
            return Err(HubError::AlreadySignedUp);
        }
        let id = inserted.last_insert_rowid();

        Opportunity::claim_spot(opportunity_id, conn).await?;

        tracing::info!(
            signup = id,
            volunteer = volunteer_id,
            opportunity = opportunity_id,
            "volunteer signed up"
        );
        Self::with_id(id, conn).await
    }

    /// Updates a signup's status, hours, or comments. Cancelling gives back the
    /// spot, and un-cancelling takes it again if one is free. Run inside a
    /// transaction.
    pub async fn update(
        id: i64,
        update: SignupUpdate,
        conn: &mut SqliteConnection,
    ) -> HubResult<Self> {
        let existing = Self::with_id(id, conn).await?;

        let status = update
            .status
            .map(|status| status.parse::<SignupStatus>())
            .transpose()?;
        if let Some(hours_worked) = update.hours_worked {
            check_hours_worked(hours_worked)?;
        }

        let mut builder = UpdateBuilder::new("volunteer_signups", "signup");
        builder
            .set_opt("status", status)
            .set_opt("hours_worked", update.hours_worked)
            .set_opt("comments", update.comments.map(optional_text));
        builder.execute(id, conn).await?;

        let updated = Self::with_id(id, conn).await?;
        match (existing.holds_spot(), updated.holds_spot()) {
            (true, false) => updated.release(conn).await?,
            (false, true) => updated.claim(conn).await?,
            _ => {}
        }
        if updated.hours_worked != existing.hours_worked {
            Volunteer::refresh_hours(updated.volunteer_id, conn).await?;
        }

        tracing::info!(signup = id, status = %updated.status, "updated signup");
        Ok(updated)
    }

    /// Removes a signup, giving back its spot and taking its hours off the
    /// volunteer. Run inside a transaction.
    pub async fn delete(id: i64, conn: &mut SqliteConnection) -> HubResult<()> {
        let existing = Self::with_id(id, conn).await?;

        sqlx::query("DELETE FROM volunteer_signups WHERE id = ?")
            .bind(id)
            .execute(&mut *conn)
            .await?;

        if existing.holds_spot() {
            existing.release(conn).await?;
        }
        Volunteer::refresh_hours(existing.volunteer_id, conn).await?;

        tracing::info!(signup = id, "deleted signup");
        Ok(())
    }

    /// Inserts or refreshes a signup imported from CRM hours. A local signup
    /// for the same volunteer and opportunity is adopted rather than
    /// duplicated. Spot counts of synced opportunities come from the CRM, so
    /// they aren't touched here.
    pub async fn upsert_by_external_id(
        record: &ExternalSignup,
        conn: &mut SqliteConnection,
    ) -> HubResult<i64> {
        let now = current_time();

        sqlx::query(
            "UPDATE volunteer_signups SET external_id = ?, updated_at = ?
             WHERE volunteer_id = ? AND opportunity_id = ? AND external_id IS NULL",
        )
        .bind(&record.external_id)
        .bind(now)
        .bind(record.volunteer_id)
        .bind(record.opportunity_id)
        .execute(&mut *conn)
        .await?;

        sqlx::query(
            "INSERT INTO volunteer_signups
             (volunteer_id, opportunity_id, status, hours_worked, external_id,
              created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(external_id) DO UPDATE SET
                volunteer_id = excluded.volunteer_id,
                opportunity_id = excluded.opportunity_id,
                status = excluded.status,
                hours_worked = excluded.hours_worked,
                updated_at = excluded.updated_at",
        )
        .bind(record.volunteer_id)
        .bind(record.opportunity_id)
        .bind(record.status)
        .bind(record.hours_worked)
        .bind(&record.external_id)
        .bind(now)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        Volunteer::refresh_hours(record.volunteer_id, conn).await?;

        sqlx::query_scalar::<_, i64>("SELECT id FROM volunteer_signups WHERE external_id = ?")
            .bind(&record.external_id)
            .fetch_one(&mut *conn)
            .await
            .map_err(Into::into)
    }

    async fn claim(&self, conn: &mut SqliteConnection) -> HubResult<()> {
        if let Some(opportunity_id) = self.opportunity_id {
            Opportunity::claim_spot(opportunity_id, conn).await
        } else if let Some(program_id) = self.program_id {
            check_coach_capacity(program_id, conn).await
        } else {
            Ok(())
        }
    }

    async fn release(&self, conn: &mut SqliteConnection) -> HubResult<()> {
        match self.opportunity_id {
            Some(opportunity_id) => Opportunity::release_spot(opportunity_id, conn).await,
            // coach counts are computed from the signups themselves
            None => Ok(()),
        }
    }
}

/// Fails if the program's active coach signups now exceed its coach spots.
/// Called after the signup in question is written, in the same transaction.
pub async fn check_coach_capacity(program_id: i64, conn: &mut SqliteConnection) -> HubResult<()> {
    let program = Program::with_id(program_id, conn).await?;
    if program.over_coach_capacity() {
        Err(HubError::Full {
            entity: "program",
            id: program_id,
        })
    } else {
        Ok(())
    }
}

fn check_hours_worked(hours_worked: f64) -> HubResult<()> {
    if hours_worked.is_finite() && hours_worked >= 0.0 {
        Ok(())
    } else {
        Err(HubError::Validation(
            "hoursWorked must be zero or more".to_owned(),
        ))
    }
}

/// Hours logged in the CRM, resolved to local ids and already validated.
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalSignup {
    pub external_id: String,
    pub volunteer_id: i64,
    pub opportunity_id: i64,
    pub status: SignupStatus,
    pub hours_worked: f64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupFilter {
    pub volunteer_id: Option<String>,
    pub opportunity_id: Option<String>,
    pub program_id: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSignup {
    pub volunteer_id: Option<i64>,
    pub opportunity_id: Option<i64>,
    pub comments: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupUpdate {
    pub status: Option<String>,
    pub hours_worked: Option<f64>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    pub comments: Option<Option<String>>,
}

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqliteConnection};
use time::{Date, OffsetDateTime};

use crate::error::{HubError, HubResult};
use crate::models::{
    optional_text, parse_filter, push_eq, push_search, required_text, search_pattern,
    status_enum, DateRange, UpdateBuilder,
};
use crate::util::{current_time, today};

status_enum! {
    /// Where a program is in its lifecycle
    pub enum ProgramStatus {
        Active => "active",
        Upcoming => "upcoming",
        Completed => "completed",
    }
}

/// A program that workshops, opportunities, and participants belong to.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Program {
    pub id: i64,
    /// The name of the program, e.g. "Financial Futures"
    pub name: String,
    pub description: Option<String>,
    /// A human description of how long the program runs, e.g. "8 weeks"
    pub duration: Option<String>,
    /// Who the program is meant for, e.g. "14-18"
    pub age_range: Option<String>,
    pub status: ProgramStatus,
    pub start_date: Option<Date>,
    pub end_date: Option<Date>,
    /// How many coaches the program can take, if it's limited
    pub coach_spots: Option<i64>,
    /// How many coaches are signed up and haven't cancelled
    pub number_of_coaches: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

const SELECT_PROGRAMS: &str = "SELECT p.id, p.name, p.description, p.duration, p.age_range,
        p.status, p.start_date, p.end_date, p.coach_spots,
        (SELECT COUNT(*) FROM volunteer_signups s
         WHERE s.program_id = p.id AND s.status != 'cancelled') AS number_of_coaches,
        p.created_at, p.updated_at
    FROM programs p WHERE 1 = 1";

impl Program {
    /// Whether more coaches are signed up than the program has spots for.
    /// Programs without a limit never are.
    pub fn over_coach_capacity(&self) -> bool {
        self.coach_spots
            .map(|spots| self.number_of_coaches > spots)
            .unwrap_or(false)
    }

    pub async fn with_id(id: i64, conn: &mut SqliteConnection) -> HubResult<Self> {
        Self::with_id_opt(id, conn)
            .await?
            .ok_or_else(|| HubError::not_found("program", id))
    }

    pub async fn with_id_opt(id: i64, conn: &mut SqliteConnection) -> HubResult<Option<Self>> {
        let sql = format!("{} AND p.id = ?", SELECT_PROGRAMS);
        sqlx::query_as::<_, Self>(&sql)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await
            .map_err(Into::into)
    }

    /// Fails with a bad reference instead of not-found, for use on foreign keys.
    pub async fn ensure_exists(id: i64, conn: &mut SqliteConnection) -> HubResult<()> {
        let exists = sqlx::query_scalar::<_, i64>("SELECT id FROM programs WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?
            .is_some();

        if exists {
            Ok(())
        } else {
            Err(HubError::BadReference {
                entity: "program",
                id,
            })
        }
    }

    pub async fn list(filter: &ProgramFilter, conn: &mut SqliteConnection) -> HubResult<Vec<Self>> {
        let mut builder = QueryBuilder::<Sqlite>::new(SELECT_PROGRAMS);
        filter.push_conditions(&mut builder, today());
        builder.push(" ORDER BY p.id");

        builder
            .build_query_as::<Self>()
            .fetch_all(&mut *conn)
            .await
            .map_err(Into::into)
    }

    pub async fn create(new_program: NewProgram, conn: &mut SqliteConnection) -> HubResult<Self> {
        let name = required_text(new_program.name, "name")?;
        let status: ProgramStatus = required_text(new_program.status, "status")?.parse()?;
        check_dates(new_program.start_date, new_program.end_date)?;
        check_coach_spots(new_program.coach_spots)?;

        let now = current_time();
        let id = sqlx::query(
            "INSERT INTO programs
             (name, description, duration, age_range, status, start_date, end_date,
              coach_spots, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(name)
        .bind(optional_text(new_program.description))
        .bind(optional_text(new_program.duration))
        .bind(optional_text(new_program.age_range))
        .bind(status)
        .bind(new_program.start_date)
        .bind(new_program.end_date)
        .bind(new_program.coach_spots)
        .bind(now)
        .bind(now)
        .execute(&mut *conn)
        .await?
        .last_insert_rowid();

        tracing::info!(program = id, "created program");
        Self::with_id(id, conn).await
    }

    pub async fn update(
        id: i64,
        update: ProgramUpdate,
        conn: &mut SqliteConnection,
    ) -> HubResult<Self> {
        let existing = Self::with_id(id, conn).await?;

        let name = update
            .name
            .map(|name| required_text(Some(name), "name"))
            .transpose()?;
        let status = update
            .status
            .map(|status| status.parse::<ProgramStatus>())
            .transpose()?;
        check_dates(
            update.start_date.unwrap_or(existing.start_date),
            update.end_date.unwrap_or(existing.end_date),
        )?;
        if let Some(coach_spots) = update.coach_spots {
            check_coach_spots(coach_spots)?;
        }

        let mut builder = UpdateBuilder::new("programs", "program");
        builder
            .set_opt("name", name)
            .set_opt("description", update.description.map(optional_text))
            .set_opt("duration", update.duration.map(optional_text))
            .set_opt("age_range", update.age_range.map(optional_text))
            .set_opt("status", status)
            .set_opt("start_date", update.start_date)
            .set_opt("end_date", update.end_date)
            .set_opt("coach_spots", update.coach_spots);
        builder.execute(id, conn).await?;

        tracing::info!(program = id, "updated program");
        Self::with_id(id, conn).await
    }

    /// Deletes a program that nothing depends on anymore.
    pub async fn delete(id: i64, conn: &mut SqliteConnection) -> HubResult<()> {
        Self::with_id(id, conn).await?;

        let (workshops, opportunities, participants, coaches) =
            sqlx::query_as::<_, (i64, i64, i64, i64)>(
                "SELECT
                    (SELECT COUNT(*) FROM workshops WHERE program_id = ?1),
                    (SELECT COUNT(*) FROM opportunities WHERE program_id = ?1),
                    (SELECT COUNT(*) FROM participants WHERE program_id = ?1),
                    (SELECT COUNT(*) FROM volunteer_signups WHERE program_id = ?1)",
            )
            .bind(id)
            .fetch_one(&mut *conn)
            .await?;

        if workshops + opportunities + participants + coaches > 0 {
            return Err(HubError::Conflict(format!(
                "program {} still has {} workshop(s), {} opportunity(s), {} participant(s), \
                 and {} coach signup(s); remove them first",
                id, workshops, opportunities, participants, coaches
            )));
        }

        sqlx::query("DELETE FROM programs WHERE id = ?")
            .bind(id)
            .execute(&mut *conn)
            .await?;

        tracing::info!(program = id, "deleted program");
        Ok(())
    }
}

fn check_dates(start_date: Option<Date>, end_date: Option<Date>) -> HubResult<()> {
    match (start_date, end_date) {
        (Some(start), Some(end)) if end < start => Err(HubError::Validation(
            "endDate cannot be before startDate".to_owned(),
        )),
        _ => Ok(()),
    }
}

fn check_coach_spots(coach_spots: Option<i64>) -> HubResult<()> {
    match coach_spots {
        Some(spots) if spots < 0 => Err(HubError::Validation(
            "coachSpots cannot be negative".to_owned(),
        )),
        _ => Ok(()),
    }
}

/// Query string filters for listing programs. Unrecognized values are ignored.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgramFilter {
    pub search: Option<String>,
    pub status: Option<String>,
    pub date_range: Option<String>,
}

impl ProgramFilter {
    fn push_conditions(&self, builder: &mut QueryBuilder<'_, Sqlite>, today: Date) {
        if let Some(pattern) = search_pattern(self.search.as_deref()) {
            push_search(builder, &["p.name", "p.description"], &pattern);
        }
        push_eq(
            builder,
            "p.status",
            parse_filter::<ProgramStatus>(self.status.as_deref()),
        );
        if let Some(range) = parse_filter::<DateRange>(self.date_range.as_deref()) {
            range.push_condition(builder, "p.start_date", "p.end_date", today);
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProgram {
    pub name: Option<String>,
    pub description: Option<String>,
    pub duration: Option<String>,
    pub age_range: Option<String>,
    pub status: Option<String>,
    pub start_date: Option<Date>,
    pub end_date: Option<Date>,
    pub coach_spots: Option<i64>,
}

/// A partial update. Absent fields are left alone, and `null` clears nullable ones.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgramUpdate {
    pub name: Option<String>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    pub description: Option<Option<String>>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    pub duration: Option<Option<String>>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    pub age_range: Option<Option<String>>,
    pub status: Option<String>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    pub start_date: Option<Option<Date>>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    pub end_date: Option<Option<Date>>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    pub coach_spots: Option<Option<i64>>,
}

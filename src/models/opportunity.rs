use serde::{Deserialize, Serialize};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqliteConnection};
use time::{Date, OffsetDateTime};

use crate::error::{HubError, HubResult};
use crate::models::program::Program;
use crate::models::volunteer::Volunteer;
use crate::models::workshop::Workshop;
use crate::models::{
    optional_text, parse_filter, push_eq, push_search, required, required_text, search_pattern,
    UpdateBuilder,
};
use crate::util::current_time;

/// A volunteer slot with a fixed number of spots.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Opportunity {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub program_id: Option<i64>,
    pub workshop_id: Option<i64>,
    pub category: Option<String>,
    pub date: Option<Date>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub location: Option<String>,
    pub total_spots: i64,
    /// Claimed and released together with signups, never patched directly
    pub filled_spots: i64,
    /// The Salesforce shift this opportunity was imported from
    pub external_id: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

const SELECT_OPPORTUNITIES: &str = "SELECT id, title, description, program_id, workshop_id,
        category, date, start_time, end_time, location, total_spots, filled_spots,
        external_id, created_at, updated_at
    FROM opportunities WHERE 1 = 1";

impl Opportunity {
    pub async fn with_id(id: i64, conn: &mut SqliteConnection) -> HubResult<Self> {
        Self::with_id_opt(id, conn)
            .await?
            .ok_or_else(|| HubError::not_found("opportunity", id))
    }

    pub async fn with_id_opt(id: i64, conn: &mut SqliteConnection) -> HubResult<Option<Self>> {
        let sql = format!("{} AND id = ?", SELECT_OPPORTUNITIES);
        sqlx::query_as::<_, Self>(&sql)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await
            .map_err(Into::into)
    }

    pub async fn with_external_id_opt(
        external_id: &str,
        conn: &mut SqliteConnection,
    ) -> HubResult<Option<Self>> {
        let sql = format!("{} AND external_id = ?", SELECT_OPPORTUNITIES);
        sqlx::query_as::<_, Self>(&sql)
            .bind(external_id)
            .fetch_optional(&mut *conn)
            .await
            .map_err(Into::into)
    }

    pub async fn ensure_exists(id: i64, conn: &mut SqliteConnection) -> HubResult<()> {
        let exists = sqlx::query_scalar::<_, i64>("SELECT id FROM opportunities WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?
            .is_some();

        if exists {
            Ok(())
        } else {
            Err(HubError::BadReference {
                entity: "opportunity",
                id,
            })
        }
    }

    pub async fn list(
        filter: &OpportunityFilter,
        conn: &mut SqliteConnection,
    ) -> HubResult<Vec<Self>> {
        let mut builder = QueryBuilder::<Sqlite>::new(SELECT_OPPORTUNITIES);
        if let Some(pattern) = search_pattern(filter.search.as_deref()) {
            push_search(&mut builder, &["title", "description", "location"], &pattern);
        }
        push_eq(
            &mut builder,
            "program_id",
            parse_filter::<i64>(filter.program_id.as_deref()),
        );
        push_eq(
            &mut builder,
            "workshop_id",
            parse_filter::<i64>(filter.workshop_id.as_deref()),
        );
        push_eq(
            &mut builder,
            "LOWER(category)",
            parse_filter::<String>(filter.category.as_deref()).map(|c| c.to_lowercase()),
        );
        if parse_filter::<bool>(filter.available.as_deref()) == Some(true) {
            builder.push(" AND filled_spots < total_spots");
        }
        builder.push(" ORDER BY id");

        builder
            .build_query_as::<Self>()
            .fetch_all(&mut *conn)
            .await
            .map_err(Into::into)
    }

    pub async fn create(
        new_opportunity: NewOpportunity,
        conn: &mut SqliteConnection,
    ) -> HubResult<Self> {
        let title = required_text(new_opportunity.title, "title")?;
        let total_spots = required(new_opportunity.total_spots, "totalSpots")?;
        check_total_spots(total_spots, 0)?;
        let program_id =
            resolve_parents(new_opportunity.program_id, new_opportunity.workshop_id, conn).await?;

        let now = current_time();
        let id = sqlx::query(
            "INSERT INTO opportunities
             (title, description, program_id, workshop_id, category, date, start_time,
              end_time, location, total_spots, filled_spots, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?)",
        )
        .bind(title)
        .bind(optional_text(new_opportunity.description))
        .bind(program_id)
        .bind(new_opportunity.workshop_id)
        .bind(optional_text(new_opportunity.category))
        .bind(new_opportunity.date)
        .bind(optional_text(new_opportunity.start_time))
        .bind(optional_text(new_opportunity.end_time))
        .bind(optional_text(new_opportunity.location))
        .bind(total_spots)
        .bind(now)
        .bind(now)
        .execute(&mut *conn)
        .await?
        .last_insert_rowid();

        tracing::info!(opportunity = id, "created opportunity");
        Self::with_id(id, conn).await
    }

    pub async fn update(
        id: i64,
        update: OpportunityUpdate,
        conn: &mut SqliteConnection,
    ) -> HubResult<Self> {
        let existing = Self::with_id(id, conn).await?;

        let title = update
            .title
            .map(|title| required_text(Some(title), "title"))
            .transpose()?;
        if let Some(total_spots) = update.total_spots {
            check_total_spots(total_spots, existing.filled_spots)?;
        }

        // the workshop and program have to agree after the patch is applied
        let program_id = match (update.program_id, update.workshop_id) {
            (None, None) | (None, Some(None)) => None,
            (Some(program_id), workshop_id) => {
                let workshop_id = workshop_id.unwrap_or(existing.workshop_id);
                Some(resolve_parents(program_id, workshop_id, conn).await?)
            }
            (None, Some(Some(workshop_id))) => {
                Some(resolve_parents(None, Some(workshop_id), conn).await?)
            }
        };

        let mut builder = UpdateBuilder::new("opportunities", "opportunity");
        builder
            .set_opt("title", title)
            .set_opt("description", update.description.map(optional_text))
            .set_opt("program_id", program_id)
            .set_opt("workshop_id", update.workshop_id)
            .set_opt("category", update.category.map(optional_text))
            .set_opt("date", update.date)
            .set_opt("start_time", update.start_time.map(optional_text))
            .set_opt("end_time", update.end_time.map(optional_text))
            .set_opt("location", update.location.map(optional_text))
            .set_opt("total_spots", update.total_spots);
        builder.execute(id, conn).await?;

        tracing::info!(opportunity = id, "updated opportunity");
        Self::with_id(id, conn).await
    }

    /// Deletes the opportunity along with its signups, taking the hours
    /// worked on it off its volunteers. Run inside a transaction.
    pub async fn delete(id: i64, conn: &mut SqliteConnection) -> HubResult<()> {
        let volunteer_ids = sqlx::query_scalar::<_, i64>(
            "SELECT DISTINCT volunteer_id FROM volunteer_signups WHERE opportunity_id = ?",
        )
        .bind(id)
        .fetch_all(&mut *conn)
        .await?;

        let result = sqlx::query("DELETE FROM opportunities WHERE id = ?")
            .bind(id)
            .execute(&mut *conn)
            .await?;
        if result.rows_affected() == 0 {
            return Err(HubError::not_found("opportunity", id));
        }

        for volunteer_id in volunteer_ids {
            Volunteer::refresh_hours(volunteer_id, conn).await?;
        }

        tracing::info!(opportunity = id, "deleted opportunity");
        Ok(())
    }

    /// Takes one spot, failing if none are left. Must run in the same
    /// transaction as the signup that holds the spot.
    pub async fn claim_spot(id: i64, conn: &mut SqliteConnection) -> HubResult<()> {
        let result = sqlx::query(
            "UPDATE opportunities SET filled_spots = filled_spots + 1
             WHERE id = ? AND filled_spots < total_spots",
        )
        .bind(id)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            Err(HubError::Full {
                entity: "opportunity",
                id,
            })
        } else {
            Ok(())
        }
    }

    pub async fn release_spot(id: i64, conn: &mut SqliteConnection) -> HubResult<()> {
        sqlx::query(
            "UPDATE opportunities SET filled_spots = filled_spots - 1
             WHERE id = ? AND filled_spots > 0",
        )
        .bind(id)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Inserts or refreshes the opportunity imported from the given CRM record.
    pub async fn upsert_by_external_id(
        record: &ExternalOpportunity,
        conn: &mut SqliteConnection,
    ) -> HubResult<i64> {
        let now = current_time();
        sqlx::query(
            "INSERT INTO opportunities
             (title, description, category, date, start_time, location, total_spots,
              filled_spots, external_id, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(external_id) DO UPDATE SET
                title = excluded.title,
                description = excluded.description,
                category = excluded.category,
                date = excluded.date,
                start_time = excluded.start_time,
                location = excluded.location,
                total_spots = excluded.total_spots,
                filled_spots = excluded.filled_spots,
                updated_at = excluded.updated_at",
        )
        .bind(&record.title)
        .bind(&record.description)
        .bind(&record.category)
        .bind(record.date)
        .bind(&record.start_time)
        .bind(&record.location)
        .bind(record.total_spots)
        .bind(record.filled_spots)
        .bind(&record.external_id)
        .bind(now)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        sqlx::query_scalar::<_, i64>("SELECT id FROM opportunities WHERE external_id = ?")
            .bind(&record.external_id)
            .fetch_one(&mut *conn)
            .await
            .map_err(Into::into)
    }
}

/// Works out the program an opportunity belongs to, checking that a given
/// workshop exists and belongs to the given program.
async fn resolve_parents(
    program_id: Option<i64>,
    workshop_id: Option<i64>,
    conn: &mut SqliteConnection,
) -> HubResult<Option<i64>> {
    if let Some(workshop_id) = workshop_id {
        let workshop = Workshop::referenced(workshop_id, conn).await?;
        match program_id {
            Some(program_id) if program_id != workshop.program_id => {
                Err(HubError::Validation(format!(
                    "workshop {} belongs to program {}, not program {}",
                    workshop_id, workshop.program_id, program_id
                )))
            }
            _ => Ok(Some(workshop.program_id)),
        }
    } else if let Some(program_id) = program_id {
        Program::ensure_exists(program_id, conn).await?;
        Ok(Some(program_id))
    } else {
        Ok(None)
    }
}

fn check_total_spots(total_spots: i64, filled_spots: i64) -> HubResult<()> {
    if total_spots < 1 {
        Err(HubError::Validation("totalSpots must be at least 1".to_owned()))
    } else if total_spots < filled_spots {
        Err(HubError::Validation(format!(
            "totalSpots cannot drop below the {} spots already filled",
            filled_spots
        )))
    } else {
        Ok(())
    }
}

/// An opportunity as described by the CRM, already validated.
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalOpportunity {
    pub external_id: String,
    pub title: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub date: Option<Date>,
    pub start_time: Option<String>,
    pub location: Option<String>,
    pub total_spots: i64,
    pub filled_spots: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpportunityFilter {
    pub search: Option<String>,
    pub program_id: Option<String>,
    pub workshop_id: Option<String>,
    pub category: Option<String>,
    /// `true` to only list opportunities with spots remaining
    pub available: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOpportunity {
    pub title: Option<String>,
    pub description: Option<String>,
    pub program_id: Option<i64>,
    pub workshop_id: Option<i64>,
    pub category: Option<String>,
    pub date: Option<Date>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub location: Option<String>,
    pub total_spots: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpportunityUpdate {
    pub title: Option<String>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    pub description: Option<Option<String>>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    pub program_id: Option<Option<i64>>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    pub workshop_id: Option<Option<i64>>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    pub category: Option<Option<String>>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    pub date: Option<Option<Date>>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    pub start_time: Option<Option<String>>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    pub end_time: Option<Option<String>>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    pub location: Option<Option<String>>,
    pub total_spots: Option<i64>,
}

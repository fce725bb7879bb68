use serde::{Deserialize, Serialize};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqliteConnection};
use time::OffsetDateTime;

use crate::error::{HubError, HubResult};
use crate::models::{
    optional_text, parse_filter, parse_page, push_eq, push_search, required_text, search_pattern,
    status_enum, Page, UpdateBuilder, PAGE_SIZE,
};
use crate::util::{current_time, looks_like_email, normalize_email};

status_enum! {
    /// Where a volunteer is in onboarding
    pub enum VolunteerStatus {
        /// Signed up but not yet approved by an admin
        Pending => "pending",
        Active => "active",
        Inactive => "inactive",
    }
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Volunteer {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    /// Unique across volunteers, always stored lowercase
    pub email: String,
    pub phone: Option<String>,
    pub interest_coaching: bool,
    pub interest_workshops: bool,
    pub interest_mentoring: bool,
    pub status: VolunteerStatus,
    /// The sum of hours worked across the volunteer's signups
    pub hours_logged: f64,
    pub comments: Option<String>,
    /// The Salesforce contact this volunteer was imported from
    pub external_id: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

const SELECT_VOLUNTEERS: &str = "SELECT id, first_name, last_name, email, phone,
        interest_coaching, interest_workshops, interest_mentoring, status, hours_logged,
        comments, external_id, created_at, updated_at
    FROM volunteers WHERE 1 = 1";

impl Volunteer {
    pub async fn with_id(id: i64, conn: &mut SqliteConnection) -> HubResult<Self> {
        Self::with_id_opt(id, conn)
            .await?
            .ok_or_else(|| HubError::not_found("volunteer", id))
    }

    pub async fn with_id_opt(id: i64, conn: &mut SqliteConnection) -> HubResult<Option<Self>> {
        let sql = format!("{} AND id = ?", SELECT_VOLUNTEERS);
        sqlx::query_as::<_, Self>(&sql)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await
            .map_err(Into::into)
    }

    pub async fn with_email_opt(
        email: &str,
        conn: &mut SqliteConnection,
    ) -> HubResult<Option<Self>> {
        let sql = format!("{} AND email = ?", SELECT_VOLUNTEERS);
        sqlx::query_as::<_, Self>(&sql)
            .bind(normalize_email(email))
            .fetch_optional(&mut *conn)
            .await
            .map_err(Into::into)
    }

    pub async fn ensure_exists(id: i64, conn: &mut SqliteConnection) -> HubResult<()> {
        if Self::with_id_opt(id, conn).await?.is_some() {
            Ok(())
        } else {
            Err(HubError::BadReference {
                entity: "volunteer",
                id,
            })
        }
    }

    /// One page of the volunteers matching the filter, with the total count.
    pub async fn list(
        filter: &VolunteerFilter,
        conn: &mut SqliteConnection,
    ) -> HubResult<Page<Self>> {
        let page = parse_page(filter.page.as_deref());

        let mut count =
            QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM volunteers WHERE 1 = 1");
        filter.push_conditions(&mut count);
        let (total,) = count
            .build_query_as::<(i64,)>()
            .fetch_one(&mut *conn)
            .await?;

        let mut builder = QueryBuilder::<Sqlite>::new(SELECT_VOLUNTEERS);
        filter.push_conditions(&mut builder);
        builder.push(" ORDER BY id LIMIT ");
        builder.push_bind(PAGE_SIZE);
        builder.push(" OFFSET ");
        builder.push_bind(Page::<Self>::offset(page));
        let volunteers = builder
            .build_query_as::<Self>()
            .fetch_all(&mut *conn)
            .await?;

        Ok(Page::new(volunteers, total, page))
    }

    pub async fn create(
        new_volunteer: NewVolunteer,
        conn: &mut SqliteConnection,
    ) -> HubResult<Self> {
        let first_name = required_text(new_volunteer.first_name, "firstName")?;
        let last_name = required_text(new_volunteer.last_name, "lastName")?;
        let email = checked_email(required_text(new_volunteer.email, "email")?)?;
        let status = new_volunteer
            .status
            .map(|status| status.parse::<VolunteerStatus>())
            .transpose()?
            .unwrap_or(VolunteerStatus::Pending);

        let now = current_time();
        let result = sqlx::query(
            "INSERT INTO volunteers
             (first_name, last_name, email, phone, interest_coaching, interest_workshops,
              interest_mentoring, status, hours_logged, comments, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?, ?)
             ON CONFLICT(email) DO NOTHING",
        )
        .bind(first_name)
        .bind(last_name)
        .bind(&email)
        .bind(optional_text(new_volunteer.phone))
        .bind(new_volunteer.interest_coaching.unwrap_or(false))
        .bind(new_volunteer.interest_workshops.unwrap_or(false))
        .bind(new_volunteer.interest_mentoring.unwrap_or(false))
        .bind(status)
        .bind(optional_text(new_volunteer.comments))
        .bind(now)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(HubError::Conflict(format!(
                "another volunteer already has the email {}",
                email
            )));
        }

        let id = result.last_insert_rowid();
        tracing::info!(volunteer = id, "created volunteer");
        Self::with_id(id, conn).await
    }

    pub async fn update(
        id: i64,
        update: VolunteerUpdate,
        conn: &mut SqliteConnection,
    ) -> HubResult<Self> {
        let existing = Self::with_id(id, conn).await?;

        let first_name = update
            .first_name
            .map(|name| required_text(Some(name), "firstName"))
            .transpose()?;
        let last_name = update
            .last_name
            .map(|name| required_text(Some(name), "lastName"))
            .transpose()?;
        let email = update
            .email
            .map(|email| required_text(Some(email), "email").and_then(checked_email))
            .transpose()?;
        if let Some(email) = &email {
            if email != &existing.email && Self::with_email_opt(email, conn).await?.is_some() {
                return Err(HubError::Conflict(format!(
                    "cannot change email to {}, as another volunteer has that email",
                    email
                )));
            }
        }
        let status = update
            .status
            .map(|status| status.parse::<VolunteerStatus>())
            .transpose()?;

        let mut builder = UpdateBuilder::new("volunteers", "volunteer");
        builder
            .set_opt("first_name", first_name)
            .set_opt("last_name", last_name)
            .set_opt("email", email)
            .set_opt("phone", update.phone.map(optional_text))
            .set_opt("interest_coaching", update.interest_coaching)
            .set_opt("interest_workshops", update.interest_workshops)
            .set_opt("interest_mentoring", update.interest_mentoring)
            .set_opt("status", status)
            .set_opt("comments", update.comments.map(optional_text));
        builder.execute(id, conn).await?;

        tracing::info!(volunteer = id, "updated volunteer");
        Self::with_id(id, conn).await
    }

    /// Deletes the volunteer and their signups, giving back the spots they held.
    /// Run inside a transaction.
    pub async fn delete(id: i64, conn: &mut SqliteConnection) -> HubResult<()> {
        Self::with_id(id, conn).await?;

        sqlx::query(
            "UPDATE opportunities SET filled_spots = filled_spots - 1
             WHERE filled_spots > 0 AND id IN
             (SELECT opportunity_id FROM volunteer_signups
              WHERE volunteer_id = ? AND opportunity_id IS NOT NULL AND status != 'cancelled')",
        )
        .bind(id)
        .execute(&mut *conn)
        .await?;

        sqlx::query("DELETE FROM volunteer_signups WHERE volunteer_id = ?")
            .bind(id)
            .execute(&mut *conn)
            .await?;
        sqlx::query("DELETE FROM volunteers WHERE id = ?")
            .bind(id)
            .execute(&mut *conn)
            .await?;

        tracing::info!(volunteer = id, "deleted volunteer");
        Ok(())
    }

    /// Finds the volunteer with this email, or registers a new pending one.
    pub async fn find_or_create(
        applicant: NewVolunteer,
        conn: &mut SqliteConnection,
    ) -> HubResult<Self> {
        let email = checked_email(required_text(applicant.email.clone(), "email")?)?;
        if let Some(existing) = Self::with_email_opt(&email, conn).await? {
            return Ok(existing);
        }

        Self::create(applicant, conn).await
    }

    /// Recomputes the volunteer's logged hours from their signups.
    pub async fn refresh_hours(id: i64, conn: &mut SqliteConnection) -> HubResult<()> {
        sqlx::query(
            "UPDATE volunteers SET updated_at = ?, hours_logged =
                (SELECT COALESCE(SUM(hours_worked), 0.0) FROM volunteer_signups
                 WHERE volunteer_id = volunteers.id)
             WHERE id = ?",
        )
        .bind(current_time())
        .bind(id)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Inserts or refreshes the volunteer imported from a CRM contact. A local
    /// volunteer with the same email is adopted rather than duplicated.
    pub async fn upsert_by_external_id(
        record: &ExternalVolunteer,
        conn: &mut SqliteConnection,
    ) -> HubResult<i64> {
        let email = checked_email(record.email.clone())?;
        let now = current_time();

        let adopted = sqlx::query(
            "UPDATE volunteers SET external_id = ?, updated_at = ?
             WHERE email = ? AND external_id IS NULL",
        )
        .bind(&record.external_id)
        .bind(now)
        .bind(&email)
        .execute(&mut *conn)
        .await?;
        if adopted.rows_affected() > 0 {
            tracing::debug!(contact = %record.external_id, "linked existing volunteer to contact");
        }

        sqlx::query(
            "INSERT INTO volunteers
             (first_name, last_name, email, phone, status, hours_logged, external_id,
              created_at, updated_at)
             VALUES (?, ?, ?, ?, 'active', 0, ?, ?, ?)
             ON CONFLICT(external_id) DO UPDATE SET
                first_name = excluded.first_name,
                last_name = excluded.last_name,
                email = excluded.email,
                phone = COALESCE(excluded.phone, volunteers.phone),
                updated_at = excluded.updated_at",
        )
        .bind(&record.first_name)
        .bind(&record.last_name)
        .bind(&email)
        .bind(&record.phone)
        .bind(&record.external_id)
        .bind(now)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        sqlx::query_scalar::<_, i64>("SELECT id FROM volunteers WHERE external_id = ?")
            .bind(&record.external_id)
            .fetch_one(&mut *conn)
            .await
            .map_err(Into::into)
    }
}

fn checked_email(email: String) -> HubResult<String> {
    let email = normalize_email(&email);
    if looks_like_email(&email) {
        Ok(email)
    } else {
        Err(HubError::Validation(format!(
            "{:?} is not a valid email address",
            email
        )))
    }
}

/// A CRM contact that volunteered, already validated.
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalVolunteer {
    pub external_id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolunteerFilter {
    pub search: Option<String>,
    pub status: Option<String>,
    pub page: Option<String>,
}

impl VolunteerFilter {
    fn push_conditions(&self, builder: &mut QueryBuilder<'_, Sqlite>) {
        if let Some(pattern) = search_pattern(self.search.as_deref()) {
            push_search(builder, &["first_name", "last_name", "email"], &pattern);
        }
        push_eq(
            builder,
            "status",
            parse_filter::<VolunteerStatus>(self.status.as_deref()),
        );
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewVolunteer {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub interest_coaching: Option<bool>,
    pub interest_workshops: Option<bool>,
    pub interest_mentoring: Option<bool>,
    pub status: Option<String>,
    pub comments: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolunteerUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    pub phone: Option<Option<String>>,
    pub interest_coaching: Option<bool>,
    pub interest_workshops: Option<bool>,
    pub interest_mentoring: Option<bool>,
    pub status: Option<String>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    pub comments: Option<Option<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::mock::mock_volunteer;

    #[test]
    fn emails_are_checked_and_lowercased() {
        assert_eq!(
            checked_email(" Grace@Example.com ".to_owned()).unwrap(),
            "grace@example.com"
        );
        assert!(checked_email("grace".to_owned()).is_err());
    }

    #[test]
    fn statuses_parse_case_insensitively() {
        assert_eq!(
            "Inactive".parse::<VolunteerStatus>().unwrap(),
            VolunteerStatus::Inactive
        );
        assert!("retired".parse::<VolunteerStatus>().is_err());
    }

    #[test]
    fn volunteers_serialize_in_camel_case() {
        let json = serde_json::to_value(mock_volunteer()).unwrap();
        assert_eq!(json["firstName"], "Ada");
        assert_eq!(json["lastName"], "Lovelace");
        assert_eq!(json["status"], "active");
        assert_eq!(json["hoursLogged"], 12.5);
        assert_eq!(json["interestCoaching"], true);
    }
}

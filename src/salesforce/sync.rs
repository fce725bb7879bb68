use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use sqlx::{SqliteConnection, SqlitePool};

use crate::db::begin_write;
use crate::error::{HubError, HubResult};
use crate::models::opportunity::Opportunity;
use crate::models::signup::{ExternalSignup, VolunteerSignup};
use crate::models::volunteer::Volunteer;
use crate::salesforce::records::{
    InvalidRecord, VolunteerHours, VolunteerJob, VolunteerShift, HOURS_QUERY, JOB_QUERY,
    SHIFT_QUERY,
};
use crate::salesforce::Crm;
use crate::util::normalize_email;

/// What a sync run imported.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub jobs: usize,
    pub opportunities: usize,
    pub volunteers: usize,
    pub signups: usize,
    /// Records that were missing required fields or clashed with local data
    pub skipped: usize,
}

/// Pulls jobs, shifts, and hours from the CRM and upserts them by external id.
///
/// Everything is fetched before anything is written, and all writes share one
/// transaction, so a CRM failure part way through leaves the store untouched.
pub async fn sync(crm: &dyn Crm, pool: &SqlitePool) -> HubResult<SyncReport> {
    let jobs = crm.query(JOB_QUERY).await?;
    let shifts = crm.query(SHIFT_QUERY).await?;
    let hours = crm.query(HOURS_QUERY).await?;
    tracing::info!(
        jobs = jobs.len(),
        shifts = shifts.len(),
        hours = hours.len(),
        "fetched CRM records"
    );

    let mut report = SyncReport::default();
    let mut transaction = begin_write(pool).await?;

    let mut jobs_by_id = HashMap::new();
    for value in jobs {
        match parse::<VolunteerJob>("job", value).and_then(|job| Ok((job.external_id()?, job))) {
            Ok((id, job)) => {
                jobs_by_id.insert(id, job);
                report.jobs += 1;
            }
            Err(invalid) => report.skip(&invalid),
        }
    }

    let mut opportunities_by_shift = HashMap::new();
    for value in shifts {
        let opportunity = match parse::<VolunteerShift>("shift", value)
            .and_then(|shift| shift.to_opportunity(&jobs_by_id))
        {
            Ok(opportunity) => opportunity,
            Err(invalid) => {
                report.skip(&invalid);
                continue;
            }
        };

        let upserted = Opportunity::upsert_by_external_id(&opportunity, &mut transaction).await;
        match record_outcome(upserted)? {
            Some(id) => {
                opportunities_by_shift.insert(opportunity.external_id, id);
                report.opportunities += 1;
            }
            None => report.skipped += 1,
        }
    }

    for value in hours {
        let hours = match parse::<VolunteerHours>("hours", value) {
            Ok(hours) => hours,
            Err(invalid) => {
                report.skip(&invalid);
                continue;
            }
        };

        match import_hours(&hours, &opportunities_by_shift, &mut transaction).await {
            Ok(Some(created_volunteer)) => {
                report.signups += 1;
                if created_volunteer {
                    report.volunteers += 1;
                }
            }
            Ok(None) => report.skipped += 1,
            Err(error) => return Err(error),
        }
    }

    transaction.commit().await?;
    tracing::info!(
        jobs = report.jobs,
        opportunities = report.opportunities,
        volunteers = report.volunteers,
        signups = report.signups,
        skipped = report.skipped,
        "finished CRM sync"
    );

    Ok(report)
}

/// Imports one hours record. `Ok(None)` means it was skipped; otherwise
/// whether its volunteer is new to this store.
async fn import_hours(
    hours: &VolunteerHours,
    opportunities_by_shift: &HashMap<String, i64>,
    conn: &mut SqliteConnection,
) -> HubResult<Option<bool>> {
    let (volunteer, (external_id, shift_id, status, hours_worked)) =
        match hours.to_volunteer().and_then(|v| Ok((v, hours.signup_parts()?))) {
            Ok(parts) => parts,
            Err(invalid) => {
                tracing::warn!(%invalid, "skipped CRM record");
                return Ok(None);
            }
        };

    let opportunity_id = match opportunities_by_shift.get(&shift_id) {
        Some(id) => Some(*id),
        None => Opportunity::with_external_id_opt(&shift_id, conn)
            .await?
            .map(|opportunity| opportunity.id),
    };
    let opportunity_id = match opportunity_id {
        Some(id) => id,
        None => {
            tracing::warn!(
                hours = %external_id,
                shift = %shift_id,
                "skipped hours for an unknown shift"
            );
            return Ok(None);
        }
    };

    let already_known = sqlx::query_scalar::<_, i64>(
        "SELECT id FROM volunteers WHERE external_id = ? OR email = ?",
    )
    .bind(&volunteer.external_id)
    .bind(normalize_email(&volunteer.email))
    .fetch_optional(&mut *conn)
    .await?
    .is_some();
    let upserted = Volunteer::upsert_by_external_id(&volunteer, conn).await;
    let volunteer_id = match record_outcome(upserted)? {
        Some(id) => id,
        None => return Ok(None),
    };

    let signup = ExternalSignup {
        external_id,
        volunteer_id,
        opportunity_id,
        status,
        hours_worked,
    };
    match record_outcome(VolunteerSignup::upsert_by_external_id(&signup, conn).await)? {
        Some(_) => Ok(Some(!already_known)),
        None => Ok(None),
    }
}

fn parse<T: DeserializeOwned>(object: &'static str, value: Value) -> Result<T, InvalidRecord> {
    let id = value.get("Id").and_then(Value::as_str).map(str::to_owned);
    serde_json::from_value(value).map_err(|error| InvalidRecord {
        object,
        id: id.unwrap_or_else(|| "<no id>".to_owned()),
        reason: error.to_string(),
    })
}

/// Bad data in a single record skips it; anything else aborts the sync.
fn record_outcome<T>(result: HubResult<T>) -> HubResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(HubError::Validation(reason)) | Err(HubError::Conflict(reason)) => {
            tracing::warn!(%reason, "skipped CRM record");
            Ok(None)
        }
        Err(error) => Err(error),
    }
}

impl SyncReport {
    fn skip(&mut self, invalid: &InvalidRecord) {
        tracing::warn!(%invalid, "skipped CRM record");
        self.skipped += 1;
    }
}

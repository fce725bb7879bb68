use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;

use crate::error::{HubError, HubResult};
use crate::models::program::Program;
use crate::models::signup::{check_coach_capacity, VolunteerSignup};
use crate::models::volunteer::{NewVolunteer, Volunteer};
use crate::models::{optional_text, required, required_text};
use crate::util::current_time;

/// The most programs one coach application can cover.
pub const MAX_COACH_PROGRAMS: usize = 4;

/// An application to coach one or more programs.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoachSignup {
    pub program_ids: Option<Vec<i64>>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub comments: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoachSignupResult {
    pub volunteer: Volunteer,
    pub signups: Vec<VolunteerSignup>,
}

impl CoachSignup {
    /// Signs the applicant up to coach every requested program, or none of
    /// them. The volunteer is matched by email or registered on the spot.
    /// Run inside a transaction.
    pub async fn submit(self, conn: &mut SqliteConnection) -> HubResult<CoachSignupResult> {
        let program_ids = distinct_program_ids(required(self.program_ids, "programIds")?)?;
        let comments = optional_text(self.comments);
        let applicant = NewVolunteer {
            first_name: Some(required_text(self.first_name, "firstName")?),
            last_name: Some(required_text(self.last_name, "lastName")?),
            email: Some(required_text(self.email, "email")?),
            phone: self.phone,
            interest_coaching: Some(true),
            comments: comments.clone(),
            ..Default::default()
        };

        for program_id in &program_ids {
            Program::ensure_exists(*program_id, conn).await?;
        }
        let volunteer = Volunteer::find_or_create(applicant, conn).await?;

        let mut signups = Vec::with_capacity(program_ids.len());
        for program_id in program_ids {
            let now = current_time();
            let inserted = sqlx::query(
                "INSERT INTO volunteer_signups
                 (volunteer_id, program_id, status, hours_worked, comments, created_at, updated_at)
                 VALUES (?, ?, 'pending', 0, ?, ?, ?)
                 ON CONFLICT(volunteer_id, program_id) DO NOTHING",
            )
            .bind(volunteer.id)
            .bind(program_id)
            .bind(&comments)
            .bind(now)
            .bind(now)
            .execute(&mut *conn)
            .await?;
            if inserted.rows_affected() == 0 {
                return Err(HubError::AlreadySignedUp);
            }

            check_coach_capacity(program_id, conn).await?;
            signups.push(VolunteerSignup::with_id(inserted.last_insert_rowid(), conn).await?);
        }

        tracing::info!(
            volunteer = volunteer.id,
            programs = signups.len(),
            "coach signed up"
        );
        Ok(CoachSignupResult { volunteer, signups })
    }
}

/// Collapses repeated ids, keeping the first-seen order, and checks the count.
fn distinct_program_ids(program_ids: Vec<i64>) -> HubResult<Vec<i64>> {
    let mut distinct = Vec::with_capacity(program_ids.len());
    for program_id in program_ids {
        if !distinct.contains(&program_id) {
            distinct.push(program_id);
        }
    }

    if distinct.is_empty() {
        Err(HubError::Validation(
            "choose at least one program to coach".to_owned(),
        ))
    } else if distinct.len() > MAX_COACH_PROGRAMS {
        Err(HubError::Validation(format!(
            "coaches can sign up for at most {} programs at once",
            MAX_COACH_PROGRAMS
        )))
    } else {
        Ok(distinct)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_programs_are_collapsed() {
        assert_eq!(distinct_program_ids(vec![3, 1, 3, 1]).unwrap(), vec![3, 1]);
        assert_eq!(
            distinct_program_ids(vec![1, 2, 3, 4, 4, 4]).unwrap(),
            vec![1, 2, 3, 4]
        );
    }

    #[test]
    fn program_count_is_capped() {
        assert!(distinct_program_ids(vec![]).is_err());
        assert!(distinct_program_ids(vec![1, 2, 3, 4, 5]).is_err());
    }
}

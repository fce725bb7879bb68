//! The Volunteers for Salesforce objects we import, and how they map onto
//! local records.
//!
//! Every field is optional on the way in; records missing what we need are
//! rejected with a reason rather than imported half-filled.

use std::collections::HashMap;

use serde::Deserialize;
use time::macros::format_description;
use time::Date;

use crate::models::opportunity::ExternalOpportunity;
use crate::models::signup::SignupStatus;
use crate::models::volunteer::ExternalVolunteer;

pub const JOB_QUERY: &str = "SELECT Id, Name, GW_Volunteers__Description__c, \
    GW_Volunteers__Location__c, GW_Volunteers__Skills_Needed__c \
    FROM GW_Volunteers__Volunteer_Job__c";

pub const SHIFT_QUERY: &str = "SELECT Id, Name, GW_Volunteers__Volunteer_Job__c, \
    GW_Volunteers__Start_Date_Time__c, GW_Volunteers__Duration__c, \
    GW_Volunteers__Total_Volunteers__c, GW_Volunteers__Number_of_Volunteers_Still_Needed__c, \
    GW_Volunteers__Description__c \
    FROM GW_Volunteers__Volunteer_Shift__c";

pub const HOURS_QUERY: &str = "SELECT Id, GW_Volunteers__Contact__c, \
    GW_Volunteers__Contact__r.FirstName, GW_Volunteers__Contact__r.LastName, \
    GW_Volunteers__Contact__r.Email, GW_Volunteers__Contact__r.Phone, \
    GW_Volunteers__Volunteer_Shift__c, GW_Volunteers__Status__c, \
    GW_Volunteers__Hours_Worked__c \
    FROM GW_Volunteers__Volunteer_Hours__c";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VolunteerJob {
    #[serde(rename = "Id")]
    pub id: Option<String>,
    #[serde(rename = "Name")]
    pub name: Option<String>,
    #[serde(rename = "GW_Volunteers__Description__c")]
    pub description: Option<String>,
    #[serde(rename = "GW_Volunteers__Location__c")]
    pub location: Option<String>,
    #[serde(rename = "GW_Volunteers__Skills_Needed__c")]
    pub skills_needed: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VolunteerShift {
    #[serde(rename = "Id")]
    pub id: Option<String>,
    #[serde(rename = "Name")]
    pub name: Option<String>,
    #[serde(rename = "GW_Volunteers__Volunteer_Job__c")]
    pub job_id: Option<String>,
    /// e.g. `2024-03-05T17:00:00.000+0000`
    #[serde(rename = "GW_Volunteers__Start_Date_Time__c")]
    pub start_date_time: Option<String>,
    #[serde(rename = "GW_Volunteers__Duration__c")]
    pub duration: Option<f64>,
    #[serde(rename = "GW_Volunteers__Total_Volunteers__c")]
    pub total_volunteers: Option<f64>,
    #[serde(rename = "GW_Volunteers__Number_of_Volunteers_Still_Needed__c")]
    pub still_needed: Option<f64>,
    #[serde(rename = "GW_Volunteers__Description__c")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Contact {
    #[serde(rename = "FirstName")]
    pub first_name: Option<String>,
    #[serde(rename = "LastName")]
    pub last_name: Option<String>,
    #[serde(rename = "Email")]
    pub email: Option<String>,
    #[serde(rename = "Phone")]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VolunteerHours {
    #[serde(rename = "Id")]
    pub id: Option<String>,
    #[serde(rename = "GW_Volunteers__Contact__c")]
    pub contact_id: Option<String>,
    #[serde(rename = "GW_Volunteers__Contact__r")]
    pub contact: Option<Contact>,
    #[serde(rename = "GW_Volunteers__Volunteer_Shift__c")]
    pub shift_id: Option<String>,
    #[serde(rename = "GW_Volunteers__Status__c")]
    pub status: Option<String>,
    #[serde(rename = "GW_Volunteers__Hours_Worked__c")]
    pub hours_worked: Option<f64>,
}

/// Why a CRM record was skipped.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{object} {id}: {reason}")]
pub struct InvalidRecord {
    pub object: &'static str,
    pub id: String,
    pub reason: String,
}

impl InvalidRecord {
    fn new(object: &'static str, id: &Option<String>, reason: impl Into<String>) -> Self {
        Self {
            object,
            id: id.clone().unwrap_or_else(|| "<no id>".to_owned()),
            reason: reason.into(),
        }
    }
}

fn present(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_owned)
}

impl VolunteerJob {
    pub fn external_id(&self) -> Result<String, InvalidRecord> {
        present(&self.id).ok_or_else(|| InvalidRecord::new("job", &self.id, "missing Id"))
    }
}

impl VolunteerShift {
    /// The opportunity this shift becomes, given the jobs fetched alongside it.
    pub fn to_opportunity(
        &self,
        jobs: &HashMap<String, VolunteerJob>,
    ) -> Result<ExternalOpportunity, InvalidRecord> {
        let invalid = |reason: &str| InvalidRecord::new("shift", &self.id, reason);

        let external_id = present(&self.id).ok_or_else(|| invalid("missing Id"))?;
        let job_id = present(&self.job_id).ok_or_else(|| invalid("missing volunteer job"))?;
        let job = jobs
            .get(&job_id)
            .ok_or_else(|| invalid("belongs to an unknown volunteer job"))?;
        let title = present(&job.name)
            .or_else(|| present(&self.name))
            .ok_or_else(|| invalid("neither the shift nor its job has a name"))?;

        let (date, start_time) = match present(&self.start_date_time) {
            Some(start) => {
                let (date, time) =
                    split_start(&start).ok_or_else(|| invalid("unreadable start time"))?;
                (Some(date), Some(time))
            }
            None => (None, None),
        };

        let (total_spots, filled_spots) = spot_counts(self.total_volunteers, self.still_needed);

        Ok(ExternalOpportunity {
            external_id,
            title,
            description: present(&self.description).or_else(|| present(&job.description)),
            category: present(&job.skills_needed),
            date,
            start_time,
            location: present(&job.location),
            total_spots,
            filled_spots,
        })
    }
}

impl VolunteerHours {
    pub fn to_volunteer(&self) -> Result<ExternalVolunteer, InvalidRecord> {
        let invalid = |reason: &str| InvalidRecord::new("hours", &self.id, reason);

        let external_id = present(&self.contact_id).ok_or_else(|| invalid("missing contact"))?;
        let contact = self
            .contact
            .as_ref()
            .ok_or_else(|| invalid("contact details weren't returned"))?;

        Ok(ExternalVolunteer {
            external_id,
            first_name: present(&contact.first_name)
                .ok_or_else(|| invalid("contact has no first name"))?,
            last_name: present(&contact.last_name)
                .ok_or_else(|| invalid("contact has no last name"))?,
            email: present(&contact.email).ok_or_else(|| invalid("contact has no email"))?,
            phone: present(&contact.phone),
        })
    }

    /// The hours id, the shift they were worked on, their status and amount.
    pub fn signup_parts(&self) -> Result<(String, String, SignupStatus, f64), InvalidRecord> {
        let invalid = |reason: &str| InvalidRecord::new("hours", &self.id, reason);

        let external_id = present(&self.id).ok_or_else(|| invalid("missing Id"))?;
        let shift_id = present(&self.shift_id).ok_or_else(|| invalid("missing shift"))?;
        let hours_worked = self.hours_worked.unwrap_or(0.0);
        if !hours_worked.is_finite() || hours_worked < 0.0 {
            return Err(invalid("negative hours worked"));
        }

        Ok((
            external_id,
            shift_id,
            signup_status(self.status.as_deref()),
            hours_worked,
        ))
    }
}

pub fn signup_status(status: Option<&str>) -> SignupStatus {
    match status.map(|status| status.trim().to_ascii_lowercase()).as_deref() {
        Some("completed") => SignupStatus::Completed,
        Some("confirmed") => SignupStatus::Confirmed,
        Some("canceled") | Some("cancelled") | Some("no-show") => SignupStatus::Cancelled,
        _ => SignupStatus::Pending,
    }
}

/// Total spots (at least one) and how many are filled, clamped to the total.
pub fn spot_counts(total_volunteers: Option<f64>, still_needed: Option<f64>) -> (i64, i64) {
    let total = total_volunteers.unwrap_or(1.0).round().max(1.0) as i64;
    let still_needed = still_needed.unwrap_or(0.0).round() as i64;

    (total, (total - still_needed).clamp(0, total))
}

/// Splits a Salesforce datetime into its date and `HH:MM` start time.
fn split_start(start: &str) -> Option<(Date, String)> {
    let date = Date::parse(start.get(0..10)?, format_description!("[year]-[month]-[day]")).ok()?;
    let time = start.get(11..16).filter(|time| time.as_bytes()[2] == b':')?;

    Some((date, time.to_owned()))
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use time::macros::date;

    use super::*;

    fn jobs() -> HashMap<String, VolunteerJob> {
        let job: VolunteerJob = serde_json::from_value(json!({
            "attributes": { "type": "GW_Volunteers__Volunteer_Job__c" },
            "Id": "a0J1",
            "Name": "Money Mentors",
            "GW_Volunteers__Description__c": "Coach teens through budgeting",
            "GW_Volunteers__Location__c": "Main Library",
            "GW_Volunteers__Skills_Needed__c": "Finance",
        }))
        .unwrap();

        HashMap::from([("a0J1".to_owned(), job)])
    }

    #[test]
    fn shifts_become_opportunities() {
        let shift: VolunteerShift = serde_json::from_value(json!({
            "Id": "a0K9",
            "Name": "VS-0001",
            "GW_Volunteers__Volunteer_Job__c": "a0J1",
            "GW_Volunteers__Start_Date_Time__c": "2024-03-05T17:00:00.000+0000",
            "GW_Volunteers__Duration__c": 2.0,
            "GW_Volunteers__Total_Volunteers__c": 5.0,
            "GW_Volunteers__Number_of_Volunteers_Still_Needed__c": 2.0,
            "GW_Volunteers__Description__c": null,
        }))
        .unwrap();

        let opportunity = shift.to_opportunity(&jobs()).unwrap();
        assert_eq!(opportunity.external_id, "a0K9");
        assert_eq!(opportunity.title, "Money Mentors");
        assert_eq!(
            opportunity.description.as_deref(),
            Some("Coach teens through budgeting")
        );
        assert_eq!(opportunity.location.as_deref(), Some("Main Library"));
        assert_eq!(opportunity.category.as_deref(), Some("Finance"));
        assert_eq!(opportunity.date, Some(date!(2024 - 03 - 05)));
        assert_eq!(opportunity.start_time.as_deref(), Some("17:00"));
        assert_eq!((opportunity.total_spots, opportunity.filled_spots), (5, 3));
    }

    #[test]
    fn shifts_of_unknown_jobs_are_rejected() {
        let shift = VolunteerShift {
            id: Some("a0K9".to_owned()),
            job_id: Some("a0J404".to_owned()),
            ..Default::default()
        };
        let error = shift.to_opportunity(&jobs()).unwrap_err();
        assert_eq!(error.id, "a0K9");

        let shift = VolunteerShift {
            job_id: Some("a0J1".to_owned()),
            ..Default::default()
        };
        assert_eq!(shift.to_opportunity(&jobs()).unwrap_err().id, "<no id>");
    }

    #[test]
    fn spot_counts_are_clamped() {
        assert_eq!(spot_counts(Some(5.0), Some(2.0)), (5, 3));
        assert_eq!(spot_counts(Some(5.0), Some(9.0)), (5, 0));
        assert_eq!(spot_counts(Some(5.0), Some(-1.0)), (5, 5));
        assert_eq!(spot_counts(None, None), (1, 1));
        assert_eq!(spot_counts(Some(0.0), Some(0.0)), (1, 1));
    }

    #[test]
    fn hours_need_a_contact_with_an_email() {
        let hours: VolunteerHours = serde_json::from_value(json!({
            "Id": "a0H1",
            "GW_Volunteers__Contact__c": "0031",
            "GW_Volunteers__Contact__r": {
                "attributes": { "type": "Contact" },
                "FirstName": "Grace",
                "LastName": "Hopper",
                "Email": "Grace@Example.org",
                "Phone": null,
            },
            "GW_Volunteers__Volunteer_Shift__c": "a0K9",
            "GW_Volunteers__Status__c": "Completed",
            "GW_Volunteers__Hours_Worked__c": 2.5,
        }))
        .unwrap();

        let volunteer = hours.to_volunteer().unwrap();
        assert_eq!(volunteer.external_id, "0031");
        assert_eq!(volunteer.email, "Grace@Example.org");
        assert_eq!(volunteer.phone, None);

        let (external_id, shift_id, status, hours_worked) = hours.signup_parts().unwrap();
        assert_eq!(external_id, "a0H1");
        assert_eq!(shift_id, "a0K9");
        assert_eq!(status, SignupStatus::Completed);
        assert_eq!(hours_worked, 2.5);

        let mut no_email = hours.clone();
        if let Some(contact) = no_email.contact.as_mut() {
            contact.email = Some("  ".to_owned());
        }
        assert!(no_email.to_volunteer().is_err());
    }

    #[test]
    fn crm_statuses_map_onto_signup_statuses() {
        assert_eq!(signup_status(Some("Completed")), SignupStatus::Completed);
        assert_eq!(signup_status(Some("Confirmed")), SignupStatus::Confirmed);
        assert_eq!(signup_status(Some("Canceled")), SignupStatus::Cancelled);
        assert_eq!(signup_status(Some("No-Show")), SignupStatus::Cancelled);
        assert_eq!(signup_status(Some("Web Sign Up")), SignupStatus::Pending);
        assert_eq!(signup_status(None), SignupStatus::Pending);
    }

    #[test]
    fn start_times_are_split() {
        assert_eq!(
            split_start("2024-11-30T09:30:00.000+0000"),
            Some((date!(2024 - 11 - 30), "09:30".to_owned()))
        );
        assert_eq!(split_start("2024-11-30"), None);
        assert_eq!(split_start("2024-11-30T0930Z"), None);
        assert_eq!(split_start("yesterday"), None);
    }
}

use serde::Serialize;
use sqlx::{FromRow, SqliteConnection};
use time::Date;

use crate::error::HubResult;
use crate::models::{add_months, first_of_month};

/// Headline numbers for the dashboard.
#[derive(Debug, PartialEq, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub active_volunteers: i64,
    pub total_volunteers: i64,
    /// Opportunities with spots left that haven't already happened
    pub open_opportunities: i64,
    /// Hours worked on signups in the current calendar month
    pub monthly_hours: f64,
    pub active_programs: i64,
    pub upcoming_workshops: i64,
}

impl Stats {
    pub async fn as_of(today: Date, conn: &mut SqliteConnection) -> HubResult<Self> {
        let month_start = first_of_month(today.year(), today.month() as u8);
        let next_month_start = add_months(month_start, 1);

        sqlx::query_as::<_, Self>(
            "SELECT
                (SELECT COUNT(*) FROM volunteers WHERE status = 'active') AS active_volunteers,
                (SELECT COUNT(*) FROM volunteers) AS total_volunteers,
                (SELECT COUNT(*) FROM opportunities
                 WHERE filled_spots < total_spots AND (date IS NULL OR date >= ?1))
                    AS open_opportunities,
                (SELECT COALESCE(SUM(s.hours_worked), 0.0)
                 FROM volunteer_signups s
                 LEFT JOIN opportunities o ON o.id = s.opportunity_id
                 WHERE COALESCE(o.date, SUBSTR(s.created_at, 1, 10)) >= ?2
                   AND COALESCE(o.date, SUBSTR(s.created_at, 1, 10)) < ?3) AS monthly_hours,
                (SELECT COUNT(*) FROM programs WHERE status = 'active') AS active_programs,
                (SELECT COUNT(*) FROM workshops WHERE date >= ?1) AS upcoming_workshops",
        )
        .bind(today)
        .bind(month_start)
        .bind(next_month_start)
        .fetch_one(&mut *conn)
        .await
        .map_err(Into::into)
    }
}

use serde::Serialize;
use sqlx::{Encode, QueryBuilder, Sqlite, SqliteConnection, Type};
use time::{Date, Duration, Month};

use crate::error::{HubError, HubResult};
use crate::util::current_time;

pub mod opportunity;
pub mod participant;
pub mod participant_workshop;
pub mod program;
pub mod signup;
pub mod stats;
pub mod volunteer;
pub mod workshop;

/// How many volunteers are returned per page.
pub const PAGE_SIZE: i64 = 10;

/// Declares a lowercase string enum stored as `TEXT` and sent as a JSON string.
macro_rules! status_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $( $(#[$variant_meta:meta])* $variant:ident => $text:literal, )+
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize, sqlx::Type)]
        #[serde(rename_all = "lowercase")]
        #[sqlx(rename_all = "lowercase")]
        pub enum $name {
            $( $(#[$variant_meta])* $variant, )+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $( Self::$variant => $text, )+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = crate::error::HubError;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                match value.trim().to_ascii_lowercase().as_str() {
                    $( $text => Ok(Self::$variant), )+
                    other => Err(crate::error::HubError::Validation(format!(
                        "{:?} is not a valid {}",
                        other,
                        stringify!($name)
                    ))),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

pub(crate) use status_enum;

/// One page of a paginated listing.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    /// The number of rows matching the filters, across all pages
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
    pub total_pages: i64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: i64, page: i64) -> Self {
        Self {
            items,
            total,
            page,
            page_size: PAGE_SIZE,
            total_pages: (total + PAGE_SIZE - 1) / PAGE_SIZE,
        }
    }

    pub fn offset(page: i64) -> i64 {
        (page - 1) * PAGE_SIZE
    }
}

/// Parses a filter value, dropping it if it's missing, blank, `all`, or malformed.
pub fn parse_filter<T: std::str::FromStr>(value: Option<&str>) -> Option<T> {
    let value = value?.trim();
    if value.is_empty() || value.eq_ignore_ascii_case("all") {
        return None;
    }

    value.parse().ok()
}

/// The requested page, defaulting to the first for anything that isn't a positive number.
pub fn parse_page(value: Option<&str>) -> i64 {
    parse_filter::<i64>(value)
        .filter(|page| *page >= 1)
        .unwrap_or(1)
}

/// Builds a `LIKE` pattern for a case-insensitive substring search.
/// Only ASCII letters are folded, the same as SQLite's `LOWER()`.
pub fn search_pattern(value: Option<&str>) -> Option<String> {
    let value = value?.trim();
    if value.is_empty() {
        return None;
    }

    let mut pattern = String::with_capacity(value.len() + 2);
    pattern.push('%');
    for c in value.to_ascii_lowercase().chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');

    Some(pattern)
}

/// Appends `AND (LOWER(a) LIKE ? OR LOWER(b) LIKE ? ...)`.
pub fn push_search(builder: &mut QueryBuilder<'_, Sqlite>, columns: &[&str], pattern: &str) {
    builder.push(" AND (");
    for (index, column) in columns.iter().enumerate() {
        if index > 0 {
            builder.push(" OR ");
        }
        builder.push(format_args!("LOWER({}) LIKE ", column));
        builder.push_bind(pattern.to_owned());
        builder.push(" ESCAPE '\\'");
    }
    builder.push(")");
}

/// Appends `AND column = ?` when the filter is present.
pub fn push_eq<'args, T>(builder: &mut QueryBuilder<'args, Sqlite>, column: &str, value: Option<T>)
where
    T: 'args + Encode<'args, Sqlite> + Send + Type<Sqlite>,
{
    if let Some(value) = value {
        builder.push(format_args!(" AND {} = ", column));
        builder.push_bind(value);
    }
}

/// A required field of a new record, rejecting it if missing.
pub fn required<T>(value: Option<T>, field: &str) -> HubResult<T> {
    value.ok_or_else(|| HubError::Validation(format!("{} is required", field)))
}

/// A required text field, rejecting it if missing or blank.
pub fn required_text(value: Option<String>, field: &str) -> HubResult<String> {
    let value = required(value, field)?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(HubError::Validation(format!("{} cannot be blank", field)));
    }

    Ok(trimmed.to_owned())
}

/// Blank optional text is stored as `NULL`.
pub fn optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

/// Accumulates the `SET` clauses of a partial update.
pub struct UpdateBuilder<'args> {
    builder: QueryBuilder<'args, Sqlite>,
    entity: &'static str,
}

impl<'args> UpdateBuilder<'args> {
    pub fn new(table: &'static str, entity: &'static str) -> Self {
        let mut builder = QueryBuilder::new(format!("UPDATE {} SET updated_at = ", table));
        builder.push_bind(current_time());

        Self { builder, entity }
    }

    pub fn set<T>(&mut self, column: &str, value: T) -> &mut Self
    where
        T: 'args + Encode<'args, Sqlite> + Send + Type<Sqlite>,
    {
        self.builder.push(format_args!(", {} = ", column));
        self.builder.push_bind(value);
        self
    }

    /// Sets the column only if the patch supplied a value for it.
    pub fn set_opt<T>(&mut self, column: &str, value: Option<T>) -> &mut Self
    where
        T: 'args + Encode<'args, Sqlite> + Send + Type<Sqlite>,
    {
        if let Some(value) = value {
            self.set(column, value);
        }
        self
    }

    /// Runs the update against the row with the given id, failing if there isn't one.
    pub async fn execute(mut self, id: i64, conn: &mut SqliteConnection) -> HubResult<()> {
        self.builder.push(" WHERE id = ");
        self.builder.push_bind(id);

        let result = self.builder.build().execute(&mut *conn).await?;
        if result.rows_affected() == 0 {
            return Err(HubError::not_found(self.entity, id));
        }

        Ok(())
    }
}

/// Coarse windows for filtering programs by their dates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DateRange {
    CurrentQuarter,
    NextThreeMonths,
    Upcoming,
}

impl std::str::FromStr for DateRange {
    type Err = HubError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "current-quarter" => Ok(Self::CurrentQuarter),
            "next-3-months" => Ok(Self::NextThreeMonths),
            "upcoming" => Ok(Self::Upcoming),
            other => Err(HubError::Validation(format!(
                "{:?} is not a valid date range",
                other
            ))),
        }
    }
}

impl DateRange {
    /// Appends the window's conditions on `start_date`/`end_date` columns.
    pub fn push_condition(
        &self,
        builder: &mut QueryBuilder<'_, Sqlite>,
        start_column: &str,
        end_column: &str,
        today: Date,
    ) {
        match self {
            DateRange::CurrentQuarter => {
                let (quarter_start, quarter_end) = quarter_bounds(today);
                builder.push(format_args!(
                    " AND {} IS NOT NULL AND {} <= ",
                    start_column, start_column
                ));
                builder.push_bind(quarter_end);
                builder.push(format_args!(
                    " AND ({} IS NULL OR {} >= ",
                    end_column, end_column
                ));
                builder.push_bind(quarter_start);
                builder.push(")");
            }
            DateRange::NextThreeMonths => {
                builder.push(format_args!(" AND {} >= ", start_column));
                builder.push_bind(today);
                builder.push(format_args!(" AND {} <= ", start_column));
                builder.push_bind(add_months(today, 3));
            }
            DateRange::Upcoming => {
                builder.push(format_args!(" AND {} > ", start_column));
                builder.push_bind(today);
            }
        }
    }
}

/// The first and last days of the calendar quarter containing `day`.
pub fn quarter_bounds(day: Date) -> (Date, Date) {
    let first_month = (day.month() as u8 - 1) / 3 * 3 + 1;
    let start = first_of_month(day.year(), first_month);
    let end = add_months(start, 3) - Duration::days(1);

    (start, end)
}

/// Adds calendar months, clamping the day to the end of shorter months.
pub fn add_months(day: Date, months: u8) -> Date {
    let zero_based = day.month() as i32 - 1 + months as i32;
    let year = day.year() + zero_based / 12;
    let month = month_from_number((zero_based % 12 + 1) as u8);
    let last_day = time::util::days_in_year_month(year, month);

    Date::from_calendar_date(year, month, day.day().min(last_day)).unwrap_or(day)
}

/// The first day of the given month, where `month` is 1-based.
pub fn first_of_month(year: i32, month: u8) -> Date {
    let month = month_from_number(month);
    Date::from_calendar_date(year, month, 1).unwrap_or(Date::MIN)
}

fn month_from_number(month: u8) -> Month {
    Month::try_from(month).unwrap_or(Month::January)
}

#[cfg(test)]
mod tests {
    use time::macros::date;

    use super::*;
    use crate::models::volunteer::VolunteerStatus;

    #[test]
    fn all_and_invalid_filters_are_ignored() {
        assert_eq!(parse_filter::<VolunteerStatus>(Some("all")), None);
        assert_eq!(parse_filter::<VolunteerStatus>(Some("ALL")), None);
        assert_eq!(parse_filter::<VolunteerStatus>(Some("retired")), None);
        assert_eq!(parse_filter::<VolunteerStatus>(Some("  ")), None);
        assert_eq!(parse_filter::<VolunteerStatus>(None), None);
        assert_eq!(
            parse_filter::<VolunteerStatus>(Some("Active")),
            Some(VolunteerStatus::Active)
        );
        assert_eq!(parse_filter::<i64>(Some("abc")), None);
        assert_eq!(parse_filter::<i64>(Some("12")), Some(12));
    }

    #[test]
    fn pages_default_to_the_first() {
        assert_eq!(parse_page(None), 1);
        assert_eq!(parse_page(Some("0")), 1);
        assert_eq!(parse_page(Some("-3")), 1);
        assert_eq!(parse_page(Some("two")), 1);
        assert_eq!(parse_page(Some("4")), 4);
        assert_eq!(Page::<()>::offset(3), 20);
    }

    #[test]
    fn page_counts_round_up() {
        assert_eq!(Page::<()>::new(vec![], 0, 1).total_pages, 0);
        assert_eq!(Page::<()>::new(vec![], 10, 1).total_pages, 1);
        assert_eq!(Page::<()>::new(vec![], 21, 1).total_pages, 3);
    }

    #[test]
    fn search_patterns_escape_wildcards() {
        assert_eq!(search_pattern(Some("  ")), None);
        assert_eq!(search_pattern(Some("Fin")), Some("%fin%".to_owned()));
        assert_eq!(search_pattern(Some("Éco")), Some("%Éco%".to_owned()));
        assert_eq!(
            search_pattern(Some("100%_a\\b")),
            Some("%100\\%\\_a\\\\b%".to_owned())
        );
    }

    #[test]
    fn blank_required_text_is_rejected() {
        assert!(required_text(None, "name").is_err());
        assert!(required_text(Some("   ".to_owned()), "name").is_err());
        assert_eq!(
            required_text(Some(" Ada ".to_owned()), "name").unwrap(),
            "Ada"
        );
        assert_eq!(optional_text(Some(" ".to_owned())), None);
    }

    #[test]
    fn quarters_cover_three_months() {
        assert_eq!(
            quarter_bounds(date!(2024 - 02 - 14)),
            (date!(2024 - 01 - 01), date!(2024 - 03 - 31))
        );
        assert_eq!(
            quarter_bounds(date!(2024 - 12 - 31)),
            (date!(2024 - 10 - 01), date!(2024 - 12 - 31))
        );
    }

    #[test]
    fn adding_months_clamps_the_day() {
        assert_eq!(add_months(date!(2024 - 11 - 30), 3), date!(2025 - 02 - 28));
        assert_eq!(add_months(date!(2024 - 01 - 15), 3), date!(2024 - 04 - 15));
        assert_eq!(add_months(date!(2023 - 12 - 31), 2), date!(2024 - 02 - 29));
    }

    #[test]
    fn date_ranges_parse_permissively() {
        assert_eq!(
            parse_filter::<DateRange>(Some("current-quarter")),
            Some(DateRange::CurrentQuarter)
        );
        assert_eq!(
            parse_filter::<DateRange>(Some("next-3-months")),
            Some(DateRange::NextThreeMonths)
        );
        assert_eq!(parse_filter::<DateRange>(Some("all")), None);
        assert_eq!(parse_filter::<DateRange>(Some("someday")), None);
    }
}

//! Extra utilities for use elsewhere in the API.

use time::{Date, OffsetDateTime};

/// The current time, in UTC. All stored timestamps use this.
pub fn current_time() -> OffsetDateTime {
    OffsetDateTime::now_utc()
}

pub fn today() -> Date {
    current_time().date()
}

/// Lowercases and trims an email so lookups are case-insensitive.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// A loose sanity check; the CRM and the mail server do the real validation.
pub fn looks_like_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.contains(char::is_whitespace)
        }
        None => false,
    }
}

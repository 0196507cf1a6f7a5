//! Nanosecond-precision string timestamps with an empty "never" sentinel.

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// An RFC3339 timestamp with nanosecond precision, stored in its textual
/// form.
///
/// Stamps are always rendered in UTC with a `Z` suffix and a fixed-width
/// nanosecond fraction, so the lexicographic order of non-empty stamps is
/// their chronological order. The empty string is the sentinel for "never".
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(String);

impl Timestamp {
    /// The "never" sentinel.
    pub const EMPTY: Self = Self(String::new());

    /// Current wall-clock time.
    #[must_use]
    pub fn now() -> Self {
        Self::from_date_time(Utc::now())
    }

    /// Renders a concrete instant as a stamp.
    #[must_use]
    pub fn from_date_time(instant: DateTime<Utc>) -> Self {
        Self(instant.to_rfc3339_opts(SecondsFormat::Nanos, true))
    }

    /// Parses the stamp back into an instant. Returns `None` for the empty
    /// sentinel and for anything that is not valid RFC3339.
    #[must_use]
    pub fn to_date_time(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.0)
            .ok()
            .map(|instant| instant.with_timezone(&Utc))
    }

    /// Whether this is the "never" sentinel.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The textual form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

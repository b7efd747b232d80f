//! Due dates and publish times.
//!
//! Callers send wall-clock time as they see it plus their UTC offset; rows
//! store unix seconds in UTC.

use chrono::{FixedOffset, NaiveDateTime, TimeZone};

use crate::error::{ClassroomError, Result};

const INPUT_FORMATS: [&str; 3] = ["%Y-%m-%dT%H:%M", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];

/// A wall-clock time in the caller's zone
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LocalTime {
    pub at: NaiveDateTime,
    /// Minutes east of UTC
    pub utc_offset_minutes: i32,
}

impl LocalTime {
    pub fn new(at: NaiveDateTime, utc_offset_minutes: i32) -> Self {
        Self {
            at,
            utc_offset_minutes,
        }
    }

    /// Parse `YYYY-MM-DDTHH:MM[:SS]` as entered in a form
    pub fn parse(input: &str, utc_offset_minutes: i32) -> Result<Self> {
        let input = input.trim();
        INPUT_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(input, fmt).ok())
            .map(|at| Self::new(at, utc_offset_minutes))
            .ok_or_else(|| ClassroomError::invalid(format!("unrecognised date/time '{}'", input)))
    }

    /// Unix seconds (UTC)
    pub fn to_timestamp(&self) -> Result<i64> {
        let offset = self
            .utc_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| {
                ClassroomError::invalid(format!("UTC offset {} minutes is out of range", self.utc_offset_minutes))
            })?;
        offset
            .from_local_datetime(&self.at)
            .single()
            .map(|dt| dt.timestamp())
            .ok_or_else(|| ClassroomError::invalid("ambiguous local time"))
    }
}

pub(crate) fn normalize(time: Option<LocalTime>) -> Result<Option<i64>> {
    time.map(|t| t.to_timestamp()).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset_is_removed() {
        let utc = LocalTime::parse("2024-03-01T12:00", 0).unwrap().to_timestamp().unwrap();
        let manila = LocalTime::parse("2024-03-01T20:00", 8 * 60).unwrap().to_timestamp().unwrap();
        let new_york = LocalTime::parse("2024-03-01 07:00", -5 * 60).unwrap().to_timestamp().unwrap();

        assert_eq!(utc, 1_709_294_400);
        assert_eq!(manila, utc);
        assert_eq!(new_york, utc);
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(LocalTime::parse("tomorrow", 0).is_err());

        let bad_offset = LocalTime::parse("2024-03-01T12:00", 24 * 60).unwrap();
        assert!(bad_offset.to_timestamp().is_err());

        let huge_offset = LocalTime::parse("2024-03-01T12:00", 100_000_000).unwrap();
        assert!(matches!(huge_offset.to_timestamp(), Err(ClassroomError::InvalidRequest(_))));
    }
}

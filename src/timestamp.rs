use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use crate::error::TacError;

/// Absolute acquisition instant of one series image, microsecond precision.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AcquisitionTime(NaiveDateTime);

impl AcquisitionTime {
    /// Parse a DICOM date (`YYYYMMDD`) and time (`HHMMSS[.ffffff]`) pair.
    ///
    /// Fractional seconds are right-padded with zeros to six digits, so
    /// `133040.8` reads as 13:30:40.800000. Digits beyond the sixth are dropped.
    pub fn parse(date: &str, time: &str) -> Result<Self, TacError> {
        let malformed = |reason| TacError::MalformedTimestamp {
            date: date.to_string(),
            time: time.to_string(),
            reason,
        };

        let date_digits = date.trim();
        if date_digits.len() != 8 || !date_digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(malformed("date must be 8 digits (YYYYMMDD)"));
        }

        let time_digits = time.trim();
        let (whole, fraction) = match time_digits.split_once('.') {
            Some((whole, fraction)) => (whole, fraction),
            None => (time_digits, ""),
        };
        if whole.len() < 6 || !whole.bytes().all(|b| b.is_ascii_digit()) {
            return Err(malformed("time must contain at least HHMMSS"));
        }
        if !fraction.bytes().all(|b| b.is_ascii_digit()) {
            return Err(malformed("fractional seconds must be digits"));
        }

        let field = |s: &str| s.parse::<u32>().map_err(|_| malformed("non-numeric field"));
        let year = date_digits[0..4]
            .parse::<i32>()
            .map_err(|_| malformed("non-numeric year"))?;
        let month = field(&date_digits[4..6])?;
        let day = field(&date_digits[6..8])?;
        let hour = field(&whole[0..2])?;
        let minute = field(&whole[2..4])?;
        let second = field(&whole[4..6])?;

        let micros = if fraction.is_empty() {
            0
        } else {
            let truncated = &fraction[..fraction.len().min(6)];
            field(&format!("{truncated:0<6}"))?
        };

        let date = NaiveDate::from_ymd_opt(year, month, day).ok_or_else(|| malformed("invalid calendar date"))?;
        let time = NaiveTime::from_hms_micro_opt(hour, minute, second, micros)
            .ok_or_else(|| malformed("invalid time of day"))?;
        Ok(Self(NaiveDateTime::new(date, time)))
    }

    pub fn datetime(&self) -> NaiveDateTime {
        self.0
    }

    /// Seconds elapsed since `reference`, fractional part preserved.
    pub fn seconds_since(&self, reference: &AcquisitionTime) -> f64 {
        let delta = self.0 - reference.0;
        match delta.num_microseconds() {
            Some(micros) => micros as f64 / 1_000_000.0,
            // Only reachable for spans of several hundred thousand years.
            None => delta.num_milliseconds() as f64 / 1_000.0,
        }
    }
}

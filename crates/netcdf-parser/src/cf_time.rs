//! CF-convention time units (`<unit> since <reference>`).

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};

use crate::error::{NetCdfError, NetCdfResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Days,
    Hours,
    Minutes,
    Seconds,
}

impl TimeUnit {
    fn seconds(&self) -> f64 {
        match self {
            TimeUnit::Days => 86_400.0,
            TimeUnit::Hours => 3_600.0,
            TimeUnit::Minutes => 60.0,
            TimeUnit::Seconds => 1.0,
        }
    }
}

/// Parsed `units` attribute of a CF time variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CfTimeUnits {
    pub unit: TimeUnit,
    pub reference: NaiveDateTime,
}

const REFERENCE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

impl CfTimeUnits {
    /// Parse e.g. `"days since 1970-01-01 00:00:00"`.
    pub fn parse(units: &str) -> NetCdfResult<Self> {
        let invalid = || NetCdfError::InvalidFormat(format!("unsupported time units '{}'", units));

        let (unit, reference) = units.trim().split_once(" since ").ok_or_else(invalid)?;
        let unit = match unit.trim().to_lowercase().as_str() {
            "days" | "day" | "d" => TimeUnit::Days,
            "hours" | "hour" | "h" => TimeUnit::Hours,
            "minutes" | "minute" | "min" => TimeUnit::Minutes,
            "seconds" | "second" | "s" | "sec" => TimeUnit::Seconds,
            _ => return Err(invalid()),
        };

        let reference = reference
            .trim()
            .trim_end_matches("UTC")
            .trim_end_matches('Z')
            .trim();
        let reference = REFERENCE_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(reference, fmt).ok())
            .or_else(|| {
                NaiveDate::parse_from_str(reference, "%Y-%m-%d")
                    .ok()
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
            })
            .ok_or_else(invalid)?;

        Ok(Self { unit, reference })
    }

    /// Convert an offset in these units to a timestamp. Non-finite offsets
    /// and results outside chrono's range yield `None`.
    pub fn to_datetime(&self, offset: f64) -> Option<NaiveDateTime> {
        if !offset.is_finite() {
            return None;
        }
        let millis = (offset * self.unit.seconds() * 1000.0).round();
        if millis.abs() > i64::MAX as f64 {
            return None;
        }
        let delta = TimeDelta::try_milliseconds(millis as i64)?;
        self.reference.checked_add_signed(delta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_days_since_epoch() {
        let units = CfTimeUnits::parse("days since 1970-01-01 00:00:00").unwrap();
        assert_eq!(units.unit, TimeUnit::Days);
        assert_eq!(units.to_datetime(19723.0).unwrap().date(), date(2024, 1, 1));
    }

    #[test]
    fn test_hours_with_iso_reference() {
        let units = CfTimeUnits::parse("hours since 2024-01-01T00:00:00Z").unwrap();
        let dt = units.to_datetime(36.0).unwrap();
        assert_eq!(dt.date(), date(2024, 1, 2));
        assert_eq!(dt.format("%H").to_string(), "12");
    }

    #[test]
    fn test_date_only_reference() {
        let units = CfTimeUnits::parse("seconds since 2000-01-01").unwrap();
        assert_eq!(units.to_datetime(86_400.0).unwrap().date(), date(2000, 1, 2));
    }

    #[test]
    fn test_rejects_unknown_units() {
        assert!(CfTimeUnits::parse("fortnights since 2000-01-01").is_err());
        assert!(CfTimeUnits::parse("days").is_err());
        assert!(CfTimeUnits::parse("days since yesterday").is_err());
    }

    #[test]
    fn test_non_finite_offset() {
        let units = CfTimeUnits::parse("days since 1970-01-01").unwrap();
        assert!(units.to_datetime(f64::NAN).is_none());
    }

    #[test]
    fn test_offsets_outside_timedelta_range() {
        let units = CfTimeUnits::parse("seconds since 1970-01-01").unwrap();
        assert!(units.to_datetime(-(2f64.powi(63)) / 1000.0).is_none());
        assert!(units.to_datetime(2f64.powi(63) / 1000.0).is_none());
        assert!(units.to_datetime(1e300).is_none());
    }
}

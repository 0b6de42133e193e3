//! `TimeAmount`: a discrete unit of time ("1 minute", "30 seconds", "1 day")
//! and the trendrr-epoch bucket arithmetic that turns a wall-clock instant
//! into "how many of these units have elapsed since the trendrr epoch".
//!
//! Ported from the original's `timeamount/timeamount.go`. Weeks/months/years
//! are intentionally unsupported there and stay unsupported here.

use chrono::{DateTime, TimeZone, Utc};

use crate::error::StatsError;

/// `Fri Dec 31 21:00:00 PST 1999`, the anchor every bucket epoch counts
/// from. PST is UTC-8 with no daylight adjustment, giving `1999-12-31
/// 21:00:00-08:00` = `2000-01-01 05:00:00 UTC`.
pub fn trendrr_epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2000, 1, 1, 5, 0, 0).single().expect("valid fixed timestamp")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Timeframe {
    Milliseconds,
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl Timeframe {
    fn suffix(self) -> &'static str {
        match self {
            Timeframe::Milliseconds => "milli",
            Timeframe::Seconds => "s",
            Timeframe::Minutes => "min",
            Timeframe::Hours => "hr",
            Timeframe::Days => "d",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeAmount {
    pub amount: i64,
    pub timeframe: Timeframe,
}

impl TimeAmount {
    pub fn new(amount: i64, timeframe: Timeframe) -> Self {
        TimeAmount { amount, timeframe }
    }

    /// Parses strings of the form `"1 minute"`, `"30s"`, `"1 day"`: leading
    /// digits are the amount, the first run of letters decides the
    /// timeframe by prefix (`mil` -> milliseconds, `s` -> seconds, `min` ->
    /// minutes, `h` -> hours, `d` -> days), matching the original's
    /// `timeamount.Parse`.
    pub fn parse(input: &str) -> Result<Self, StatsError> {
        let digits_end = input.find(|c: char| !c.is_ascii_digit() && c != ' ').unwrap_or(input.len());
        let amount: i64 = input[..digits_end]
            .trim()
            .parse()
            .map_err(|_| StatsError::MissingAmount { input: input.to_string() })?;

        let letters: String = input[digits_end..]
            .chars()
            .skip_while(|c| c.is_whitespace())
            .take_while(|c| c.is_ascii_alphabetic())
            .collect::<String>()
            .to_lowercase();

        let timeframe = if letters.starts_with("mil") {
            Timeframe::Milliseconds
        } else if letters.starts_with('s') {
            Timeframe::Seconds
        } else if letters.starts_with("min") {
            Timeframe::Minutes
        } else if letters.starts_with('h') {
            Timeframe::Hours
        } else if letters.starts_with('d') {
            Timeframe::Days
        } else {
            return Err(StatsError::UnknownTimeframe { input: input.to_string() });
        };

        Ok(TimeAmount { amount, timeframe })
    }

    /// Bucket index: `floor((now - trendrr_epoch) / (amount * timeframe))`.
    pub fn to_trendrr_epoch(&self, now: DateTime<Utc>) -> i64 {
        let dur = now - trendrr_epoch();
        let raw = match self.timeframe {
            Timeframe::Milliseconds => dur.num_milliseconds(),
            Timeframe::Seconds => dur.num_seconds(),
            Timeframe::Minutes => dur.num_minutes(),
            Timeframe::Hours => dur.num_hours(),
            Timeframe::Days => dur.num_hours() / 24,
        };
        raw.div_euclid(self.amount.max(1))
    }
}

impl std::fmt::Display for TimeAmount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.amount, self.timeframe.suffix())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_amount_and_timeframe() {
        assert_eq!(
            TimeAmount::parse("1 minute").unwrap(),
            TimeAmount::new(1, Timeframe::Minutes)
        );
        assert_eq!(
            TimeAmount::parse("30s").unwrap(),
            TimeAmount::new(30, Timeframe::Seconds)
        );
        assert_eq!(
            TimeAmount::parse("1 day").unwrap(),
            TimeAmount::new(1, Timeframe::Days)
        );
    }

    #[test]
    fn rejects_unknown_timeframe() {
        assert!(matches!(
            TimeAmount::parse("1 fortnight"),
            Err(StatsError::UnknownTimeframe { .. })
        ));
    }

    #[test]
    fn bucket_advances_by_one_per_amount_elapsed() {
        let ta = TimeAmount::new(1, Timeframe::Minutes);
        let t0 = trendrr_epoch();
        assert_eq!(ta.to_trendrr_epoch(t0), 0);
        assert_eq!(ta.to_trendrr_epoch(t0 + chrono::Duration::minutes(5)), 5);
    }

    #[test]
    fn larger_amount_divides_bucket_width() {
        let ta = TimeAmount::new(30, Timeframe::Minutes);
        let t0 = trendrr_epoch();
        assert_eq!(ta.to_trendrr_epoch(t0 + chrono::Duration::minutes(59)), 1);
        assert_eq!(ta.to_trendrr_epoch(t0 + chrono::Duration::minutes(60)), 2);
    }
}

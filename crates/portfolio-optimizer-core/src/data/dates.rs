use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::OptimizerError;
use crate::OptimizerResult;

/// Half-open calendar range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> OptimizerResult<Self> {
        if start >= end {
            return Err(OptimizerError::DateError(format!(
                "Start date {} must be before end date {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date < self.end
    }

    /// Calendar days covered.
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days()
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} .. {}", self.start, self.end)
    }
}

/// Trailing windows ending today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RangePreset {
    SixMonths,
    OneYear,
    TwoYears,
    FiveYears,
}

impl RangePreset {
    pub fn days(&self) -> u64 {
        match self {
            RangePreset::SixMonths => 180,
            RangePreset::OneYear => 365,
            RangePreset::TwoYears => 730,
            RangePreset::FiveYears => 1825,
        }
    }

    /// `[today - days, today)`.
    pub fn resolve(&self, today: NaiveDate) -> OptimizerResult<DateRange> {
        let start = today.checked_sub_days(Days::new(self.days())).ok_or_else(|| {
            OptimizerError::DateError(format!("{} days before {} is out of range", self.days(), today))
        })?;
        DateRange::new(start, today)
    }
}

impl FromStr for RangePreset {
    type Err = OptimizerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "6m" | "six_months" => Ok(RangePreset::SixMonths),
            "1y" | "one_year" => Ok(RangePreset::OneYear),
            "2y" | "two_years" => Ok(RangePreset::TwoYears),
            "5y" | "five_years" => Ok(RangePreset::FiveYears),
            other => Err(OptimizerError::DateError(format!(
                "Unknown range preset '{}' (expected 6m, 1y, 2y or 5y)",
                other
            ))),
        }
    }
}

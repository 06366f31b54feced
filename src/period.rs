use crate::error::{FinancialHealthError, Result};
use crate::utils::last_day_of_month;
use chrono::{Datelike, NaiveDate};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// A fiscal period as printed in a column header.
///
/// Periods of different granularity share one timeline: they are ordered by
/// their end date first and their start date second, so `2023` sorts before
/// `2023-Q4`, which sorts before `2023-12`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Period {
    Month { year: i32, month: u32 },
    Quarter { year: i32, quarter: u32 },
    Year { year: i32 },
}

impl Period {
    pub fn month(year: i32, month: u32) -> Result<Self> {
        if !(1..=12).contains(&month) {
            return Err(FinancialHealthError::DateError(format!(
                "Invalid month {} in period {}-{:02}",
                month, year, month
            )));
        }
        Ok(Period::Month { year, month })
    }

    pub fn quarter(year: i32, quarter: u32) -> Result<Self> {
        if !(1..=4).contains(&quarter) {
            return Err(FinancialHealthError::DateError(format!(
                "Invalid quarter {} in period {}-Q{}",
                quarter, year, quarter
            )));
        }
        Ok(Period::Quarter { year, quarter })
    }

    pub fn year(year: i32) -> Self {
        Period::Year { year }
    }

    /// The month containing `date`.
    pub fn containing(date: NaiveDate) -> Self {
        Period::Month {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn start_date(&self) -> NaiveDate {
        let (year, month) = match *self {
            Period::Month { year, month } => (year, month),
            Period::Quarter { year, quarter } => (year, (quarter - 1) * 3 + 1),
            Period::Year { year } => (year, 1),
        };
        NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(NaiveDate::MIN)
    }

    pub fn end_date(&self) -> NaiveDate {
        match *self {
            Period::Month { year, month } => last_day_of_month(year, month),
            Period::Quarter { year, quarter } => last_day_of_month(year, quarter * 3),
            Period::Year { year } => last_day_of_month(year, 12),
        }
    }

    pub fn days(&self) -> i64 {
        (self.end_date() - self.start_date()).num_days() + 1
    }

    /// Days from the end of this period to the end of `as_of`.
    pub fn days_until_end_of(&self, as_of: &Period) -> i64 {
        (as_of.end_date() - self.end_date()).num_days()
    }

    /// Parses a period label, accepting `YYYY-MM`, `MM.YYYY`, `YYYY-Qn`,
    /// `Qn YYYY`, `YYYY` and full dates (`YYYY-MM-DD`, `DD.MM.YYYY`), which map
    /// to their month. Trailing words such as "FY" or a "year" suffix are not
    /// accepted: header cells that are not periods must stay labels.
    pub fn parse(text: &str) -> Result<Self> {
        let raw = text.trim();
        let upper = raw.to_uppercase();
        let invalid = || {
            FinancialHealthError::DateError(format!(
                "Invalid period '{}'. Expected YYYY-MM, YYYY-Qn or YYYY",
                raw
            ))
        };

        if raw.is_empty() {
            return Err(invalid());
        }

        if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
            return Ok(Period::containing(date));
        }
        if let Ok(date) = NaiveDate::parse_from_str(raw, "%d.%m.%Y") {
            return Ok(Period::containing(date));
        }

        if let Some((left, right)) = upper.split_once("-Q") {
            let year = parse_year(left).ok_or_else(invalid)?;
            let quarter = right.parse::<u32>().map_err(|_| invalid())?;
            return Period::quarter(year, quarter);
        }

        if let Some(rest) = upper.strip_prefix('Q') {
            let mut parts = rest.split_whitespace();
            if let (Some(q), Some(y), None) = (parts.next(), parts.next(), parts.next()) {
                let quarter = q.parse::<u32>().map_err(|_| invalid())?;
                let year = parse_year(y).ok_or_else(invalid)?;
                return Period::quarter(year, quarter);
            }
            return Err(invalid());
        }

        if let Some((left, right)) = raw.split_once('-') {
            let year = parse_year(left).ok_or_else(invalid)?;
            let month = parse_month(right).ok_or_else(invalid)?;
            return Period::month(year, month);
        }

        if let Some((left, right)) = raw.split_once('.') {
            let month = parse_month(left).ok_or_else(invalid)?;
            let year = parse_year(right).ok_or_else(invalid)?;
            return Period::month(year, month);
        }

        parse_year(raw).map(Period::year).ok_or_else(invalid)
    }

    fn sort_key(&self) -> (NaiveDate, NaiveDate) {
        (self.end_date(), self.start_date())
    }
}

fn parse_year(text: &str) -> Option<i32> {
    let text = text.trim();
    if text.len() != 4 || !text.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}

fn parse_month(text: &str) -> Option<u32> {
    let text = text.trim();
    if text.is_empty() || text.len() > 2 || !text.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}

impl Ord for Period {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

impl PartialOrd for Period {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Period::Month { year, month } => write!(f, "{:04}-{:02}", year, month),
            Period::Quarter { year, quarter } => write!(f, "{:04}-Q{}", year, quarter),
            Period::Year { year } => write!(f, "{:04}", year),
        }
    }
}

impl FromStr for Period {
    type Err = FinancialHealthError;

    fn from_str(s: &str) -> Result<Self> {
        Period::parse(s)
    }
}

impl From<Period> for String {
    fn from(period: Period) -> Self {
        period.to_string()
    }
}

impl TryFrom<String> for Period {
    type Error = FinancialHealthError;

    fn try_from(value: String) -> Result<Self> {
        Period::parse(&value)
    }
}

impl JsonSchema for Period {
    fn schema_name() -> String {
        "Period".to_string()
    }

    fn json_schema(gen: &mut schemars::gen::SchemaGenerator) -> schemars::schema::Schema {
        String::json_schema(gen)
    }
}

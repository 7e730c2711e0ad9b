//! Calendar quarter keys and month partition descriptors.

use std::fmt;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// Calendar quarter key, totally ordered by `(year, quarter)`.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Quarter {
    /// Calendar year.
    pub year: i32,
    /// Quarter ordinal in `1..=4`.
    pub quarter: u8,
}

impl Quarter {
    /// Quarter containing `date`.
    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            quarter: ((date.month() - 1) / 3 + 1) as u8,
        }
    }

    /// Next quarter, rolling Q4 into Q1 of the following year.
    pub fn succ(self) -> Self {
        if self.quarter >= 4 {
            Self {
                year: self.year + 1,
                quarter: 1,
            }
        } else {
            Self {
                year: self.year,
                quarter: self.quarter + 1,
            }
        }
    }

    /// Label form used in reports, e.g. `2024-Q1`.
    pub fn label(&self) -> String {
        format!("{}-Q{}", self.year, self.quarter)
    }
}

impl fmt::Display for Quarter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-Q{}", self.year, self.quarter)
    }
}

/// One disjoint unit of producer work: a single calendar month.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct MonthPartition {
    /// Calendar year.
    pub year: i32,
    /// Month in `1..=12`.
    pub month: u32,
}

impl MonthPartition {
    /// Partition containing `date`.
    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    /// Parse a `YYYY-MM` label such as `2023-09`. Returns `None` when the
    /// label is malformed or the month is out of range.
    pub fn parse_label(label: &str) -> Option<Self> {
        let (year_str, month_str) = label.split_once('-')?;
        if year_str.len() != 4 || month_str.len() != 2 {
            return None;
        }
        let year = year_str.parse::<i32>().ok()?;
        let month = month_str.parse::<u32>().ok()?;
        if (1..=12).contains(&month) {
            Some(Self { year, month })
        } else {
            None
        }
    }

    /// Quarter this month falls in.
    pub fn quarter(&self) -> Quarter {
        Quarter {
            year: self.year,
            quarter: ((self.month - 1) / 3 + 1) as u8,
        }
    }

    /// Next calendar month, rolling December into January.
    pub fn succ(self) -> Self {
        if self.month >= 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    /// Whether `date` falls inside this month.
    pub fn contains(&self, date: NaiveDate) -> bool {
        date.year() == self.year && date.month() == self.month
    }

    /// First day of the month. `None` only for years chrono cannot represent.
    pub fn first_day(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
    }

    /// Number of days in the month, leap years included.
    pub fn day_count(&self) -> Option<u32> {
        let first = self.first_day()?;
        let next = self.succ().first_day()?;
        Some(next.signed_duration_since(first).num_days() as u32)
    }

    /// Label form used for shard names, e.g. `2023-09`.
    pub fn label(&self) -> String {
        format!("{}-{:02}", self.year, self.month)
    }
}

impl fmt::Display for MonthPartition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:02}", self.year, self.month)
    }
}

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Full lowercase month names, indexed by `month - 1`.
pub const MONTH_NAMES: [&str; 12] = [
    "january",
    "february",
    "march",
    "april",
    "may",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
];

#[derive(Debug, Error)]
#[error("invalid period token: {0}")]
pub struct PeriodParseError(pub String);

/// A calendar month, the unit every filing is keyed on.
///
/// Serialized as its `YYYY-MM` token so the persisted state document stays
/// readable and stable across restarts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Period {
    year: i32,
    month: u32,
}

impl Period {
    pub fn new(year: i32, month: u32) -> Result<Self, PeriodParseError> {
        if !(1..=12).contains(&month) || !(1900..=9999).contains(&year) {
            return Err(PeriodParseError(format!("{year}-{month:02}")));
        }
        Ok(Self { year, month })
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    #[allow(dead_code)]
    pub fn month(&self) -> u32 {
        self.month
    }

    /// The immediately preceding calendar month.
    pub fn prev(&self) -> Period {
        if self.month == 1 {
            Period {
                year: self.year - 1,
                month: 12,
            }
        } else {
            Period {
                year: self.year,
                month: self.month - 1,
            }
        }
    }

    /// Canonical `YYYY-MM` token.
    pub fn token(&self) -> String {
        format!("{:04}-{:02}", self.year, self.month)
    }

    pub fn month_name(&self) -> &'static str {
        MONTH_NAMES[(self.month - 1) as usize]
    }

    /// The label formats the remote application has been observed to render
    /// for a period, already in normalized form. Import-row matching compares
    /// normalized row text against this set.
    pub fn label_candidates(&self) -> Vec<String> {
        vec![
            format!("{} {}", self.month_name(), self.year),
            self.token(),
            format!("{:02}/{:04}", self.month, self.year),
            format!("{:04}/{:02}", self.year, self.month),
        ]
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.token())
    }
}

impl FromStr for Period {
    type Err = PeriodParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || PeriodParseError(s.to_string());
        let (y, m) = s.trim().split_once('-').ok_or_else(err)?;
        let year: i32 = y.parse().map_err(|_| err())?;
        let month: u32 = m.parse().map_err(|_| err())?;
        Period::new(year, month).map_err(|_| err())
    }
}

impl TryFrom<String> for Period {
    type Error = PeriodParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Period> for String {
    fn from(p: Period) -> String {
        p.token()
    }
}

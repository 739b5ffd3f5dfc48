use crate::error::{RankError, Result};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

lazy_static! {
    // Extraordinary-session houses (ABX1, SBX2) need a separator before the number.
    static ref EXTRAORDINARY: Regex = Regex::new(r"(?i)^([a-z]+x\d+)[\s_]+0*(\d+)$").expect("valid regex");
    static ref REGULAR: Regex = Regex::new(r"(?i)^([a-z]+)[\s_]*0*(\d+)$").expect("valid regex");
}

/// A bill as identified by its house of origin and number, e.g. AB 12.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MeasureId {
    pub house: String,
    pub number: u32,
}

impl MeasureId {
    pub fn new(house: impl Into<String>, number: u32) -> Self {
        Self { house: house.into().to_ascii_uppercase(), number }
    }

    /// Accepts `AB 383`, `ab_383`, `AB383`, `ABX1 2` and `abx1_2`.
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        let caps = EXTRAORDINARY
            .captures(trimmed)
            .or_else(|| REGULAR.captures(trimmed))
            .ok_or_else(|| RankError::InvalidMeasure(input.to_string()))?;
        let number: u32 = caps[2].parse().map_err(|_| RankError::InvalidMeasure(input.to_string()))?;
        if number == 0 {
            return Err(RankError::InvalidMeasure(input.to_string()));
        }
        Ok(Self::new(&caps[1], number))
    }

    /// Key under which the bill row is stored, e.g. `AB_12`.
    pub fn storage_key(&self) -> String {
        format!("{}_{}", self.house, self.number)
    }
}

impl fmt::Display for MeasureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.house, self.number)
    }
}

impl FromStr for MeasureId {
    type Err = RankError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Ord for MeasureId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.house.cmp(&other.house).then(self.number.cmp(&other.number))
    }
}

impl PartialOrd for MeasureId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// The two-year legislative session containing `year`, as `"yy-yy"`.
/// Sessions begin on odd years.
pub fn leg_session(year: i32) -> String {
    let start = if year % 2 == 0 { year - 1 } else { year };
    let start = start.rem_euclid(100);
    format!("{:02}-{:02}", start, (start + 1) % 100)
}

/// The session in progress today (UTC).
pub fn current_leg_session() -> String {
    leg_session(time::OffsetDateTime::now_utc().year())
}

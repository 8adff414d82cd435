//! Domain primitives: WalletAddress, PoolName, Month.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Wallet address (base58 string, case-sensitive).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WalletAddress(pub String);

impl WalletAddress {
    /// Create a WalletAddress, trimming surrounding whitespace.
    pub fn new(addr: impl AsRef<str>) -> Self {
        WalletAddress(addr.as_ref().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WalletAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stake pool name in canonical casing.
///
/// Pool identity is case-insensitive upstream; every name is folded to a
/// single casing where each alphanumeric word starts upper-case and the rest
/// is lower-case ("marinade finance" and "MARINADE FINANCE" both become
/// "Marinade Finance").
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PoolName(String);

impl PoolName {
    /// Create a PoolName from any casing of the raw name.
    pub fn canonical(raw: impl AsRef<str>) -> Self {
        let mut out = String::with_capacity(raw.as_ref().len());
        let mut word_start = true;
        for c in raw.as_ref().trim().chars() {
            if c.is_alphanumeric() {
                if word_start {
                    out.extend(c.to_uppercase());
                } else {
                    out.extend(c.to_lowercase());
                }
                word_start = false;
            } else {
                out.push(c);
                word_start = true;
            }
        }
        PoolName(out)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PoolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid month '{0}', expected YYYY-MM")]
pub struct MonthParseError(pub String);

/// A calendar month (`YYYY-MM`), ordered chronologically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Month {
    year: i32,
    month: u32,
}

impl Month {
    /// Create a Month; `month` is 1-based.
    pub fn new(year: i32, month: u32) -> Option<Self> {
        (1..=12).contains(&month).then_some(Month { year, month })
    }

    pub fn of(date: NaiveDate) -> Self {
        Month {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn first_day(&self) -> NaiveDate {
        // Month invariants guarantee a valid first day.
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or(NaiveDate::MIN)
    }

    pub fn last_day(&self) -> NaiveDate {
        self.next()
            .first_day()
            .pred_opt()
            .unwrap_or(NaiveDate::MAX)
    }

    pub fn next(&self) -> Self {
        if self.month == 12 {
            Month {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Month {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    pub fn prev(&self) -> Self {
        if self.month == 1 {
            Month {
                year: self.year - 1,
                month: 12,
            }
        } else {
            Month {
                year: self.year,
                month: self.month - 1,
            }
        }
    }

    /// Every month from `from` through `to`, both inclusive. Empty if `from > to`.
    pub fn range_inclusive(from: Month, to: Month) -> impl Iterator<Item = Month> {
        let mut cursor = Some(from);
        std::iter::from_fn(move || {
            let current = cursor?;
            if current > to {
                cursor = None;
                return None;
            }
            cursor = Some(current.next());
            Some(current)
        })
    }
}

impl fmt::Display for Month {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for Month {
    type Err = MonthParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let err = || MonthParseError(s.to_string());
        let (year, month) = trimmed.split_once('-').ok_or_else(err)?;
        if year.len() != 4 || month.len() != 2 {
            return Err(err());
        }
        let year = year.parse::<i32>().map_err(|_| err())?;
        let month = month.parse::<u32>().map_err(|_| err())?;
        Month::new(year, month).ok_or_else(err)
    }
}

impl TryFrom<String> for Month {
    type Error = MonthParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Month> for String {
    fn from(value: Month) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_name_canonical_casing() {
        assert_eq!(PoolName::canonical("marinade").as_str(), "Marinade");
        assert_eq!(PoolName::canonical("JPOOL").as_str(), "Jpool");
        assert_eq!(
            PoolName::canonical("  socean stake-pool ").as_str(),
            "Socean Stake-Pool"
        );
        assert_eq!(PoolName::canonical("jito"), PoolName::canonical("Jito"));
        assert_ne!(PoolName::canonical("jito"), PoolName::canonical("jitosol"));
    }

    #[test]
    fn test_month_parse_and_display() {
        let m: Month = "2022-03".parse().unwrap();
        assert_eq!(m.year(), 2022);
        assert_eq!(m.month(), 3);
        assert_eq!(m.to_string(), "2022-03");

        assert!("2022-13".parse::<Month>().is_err());
        assert!("2022-3".parse::<Month>().is_err());
        assert!("march".parse::<Month>().is_err());
    }

    #[test]
    fn test_month_navigation() {
        let dec: Month = "2021-12".parse().unwrap();
        assert_eq!(dec.next().to_string(), "2022-01");
        assert_eq!(dec.next().prev(), dec);
        assert_eq!(
            Month::new(2024, 2).unwrap().last_day(),
            NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()
        );
    }

    #[test]
    fn test_month_range_inclusive() {
        let from: Month = "2021-11".parse().unwrap();
        let to: Month = "2022-02".parse().unwrap();
        let months: Vec<String> = Month::range_inclusive(from, to)
            .map(|m| m.to_string())
            .collect();
        assert_eq!(months, vec!["2021-11", "2021-12", "2022-01", "2022-02"]);
        assert_eq!(Month::range_inclusive(to, from).count(), 0);
    }

    #[test]
    fn test_month_serde_as_string() {
        let m: Month = "2022-07".parse().unwrap();
        let json = serde_json::to_string(&m).unwrap();
        assert_eq!(json, "\"2022-07\"");
        let back: Month = serde_json::from_str(&json).unwrap();
        assert_eq!(back, m);
    }
}

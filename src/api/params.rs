//! Query-string parsing shared by the handlers.

use crate::dataset::Dataset;
use crate::domain::Month;
use crate::engine::PoolFilter;
use crate::error::AppError;
use chrono::{NaiveDate, Utc};

/// `pools=a,b,c`. Absent or blank means every pool.
pub fn pool_filter(raw: Option<&str>) -> PoolFilter {
    let names: Vec<&str> = raw
        .unwrap_or("")
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    if names.is_empty() {
        PoolFilter::All
    } else {
        PoolFilter::any_of(names)
    }
}

pub fn month(name: &str, raw: &str) -> Result<Month, AppError> {
    raw.trim()
        .parse::<Month>()
        .map_err(|_| AppError::BadRequest(format!("{} must be YYYY-MM", name)))
}

pub fn date(name: &str, raw: &str) -> Result<NaiveDate, AppError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| AppError::BadRequest(format!("{} must be YYYY-MM-DD", name)))
}

/// The month a snapshot query defaults to: the last month with data, or the
/// current month for an empty log.
pub fn latest_month(dataset: &Dataset) -> Month {
    dataset
        .actions
        .month_span()
        .map(|(_, last)| last)
        .unwrap_or_else(|| Month::of(Utc::now().date_naive()))
}

/// `month=` when present, else [`latest_month`].
pub fn month_or_latest(raw: Option<&str>, dataset: &Dataset) -> Result<Month, AppError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => month("month", raw),
        None => Ok(latest_month(dataset)),
    }
}

/// Inclusive month range, clamped to the span of the log.
///
/// Months outside the span carry no activity, so a wide range never costs more
/// than the log itself. `None` when the range and the log do not overlap.
pub fn month_range(
    from: Option<&str>,
    to: Option<&str>,
    dataset: &Dataset,
) -> Result<Option<(Month, Month)>, AppError> {
    let from = from
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|raw| month("from", raw))
        .transpose()?;
    let to = to
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|raw| month("to", raw))
        .transpose()?;
    if let (Some(from), Some(to)) = (from, to) {
        if from > to {
            return Err(AppError::BadRequest("from must be <= to".to_string()));
        }
    }

    let Some((first, last)) = dataset.actions.month_span() else {
        return Ok(None);
    };
    let from = from.map_or(first, |m| m.max(first));
    let to = to.map_or(last, |m| m.min(last));
    Ok((from <= to).then_some((from, to)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_filter_parsing() {
        assert_eq!(pool_filter(None), PoolFilter::All);
        assert_eq!(pool_filter(Some(" , ")), PoolFilter::All);
        assert_eq!(
            pool_filter(Some("jito, MARINADE")),
            PoolFilter::any_of(["Jito", "Marinade"])
        );
    }

    #[test]
    fn test_month_range_defaults_to_log_span() {
        let dataset = Dataset::empty();
        assert_eq!(month_range(None, None, &dataset).unwrap(), None);
        assert!(matches!(
            month_range(Some("2022-05"), Some("2022-01"), &dataset),
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(month("month", "2022-13"), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn test_month_range_is_clamped_to_log_span() {
        let raw = crate::dataset::RawSnapshot {
            actions: ["2022-02-10", "2022-05-10"]
                .iter()
                .enumerate()
                .map(|(i, day)| crate::domain::RawActionRow {
                    transaction_id: format!("tx{}", i),
                    timestamp: day.to_string(),
                    wallet_address: "W1".to_string(),
                    pool_name: "alpha".to_string(),
                    action: "deposit".to_string(),
                    amount: "1000000000".to_string(),
                    succeeded: "true".to_string(),
                })
                .collect(),
            ..Default::default()
        };
        let dataset = Dataset::from_raw(&raw, Utc::now()).unwrap();
        let m = |s: &str| -> Month { s.parse().unwrap() };

        assert_eq!(
            month_range(Some("1000-01"), Some("9999-12"), &dataset).unwrap(),
            Some((m("2022-02"), m("2022-05")))
        );
        assert_eq!(
            month_range(Some("2022-03"), None, &dataset).unwrap(),
            Some((m("2022-03"), m("2022-05")))
        );
        assert_eq!(month_range(Some("2023-01"), Some("2023-06"), &dataset).unwrap(), None);
    }
}

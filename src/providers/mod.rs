pub mod cae;
pub mod ecb;
pub mod http;
pub mod markup;
pub mod rcb;
pub mod util;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, Utc};

use crate::core::ExchangeRate;

pub use cae::CaeSource;
pub use ecb::EcbSource;
pub use rcb::RcbSource;

/// A publisher of exchange rates.
///
/// Implementations fetch their feed, decode it and return the full pairwise
/// table (see [`crate::core::triangulate`]). Any error is treated as
/// retryable by the caller.
#[async_trait]
pub trait RateSource: Send + Sync {
    async fn fetch_latest(&self) -> Result<Vec<ExchangeRate>>;

    /// Symbols this source can express, whether or not the last fetch
    /// returned them.
    fn exchangeable(&self) -> &[&'static str];
}

/// A decoded anchor-relative feed: `(symbol, units of symbol per one anchor
/// unit)` as of `time`.
#[derive(Debug, Clone, PartialEq)]
pub struct AnchorFeed {
    pub time: DateTime<Utc>,
    pub quotes: Vec<(String, f64)>,
}

pub(crate) fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

/// Calendar date at `now` for a publisher `utc_offset_secs` east of UTC,
/// formatted as the `date_req` query value (`dd/mm/yyyy`).
pub(crate) fn publisher_date(now: DateTime<Utc>, utc_offset_secs: i32) -> String {
    let date = FixedOffset::east_opt(utc_offset_secs)
        .map(|tz| now.with_timezone(&tz).date_naive())
        .unwrap_or_else(|| now.date_naive());
    date.format("%d/%m/%Y").to_string()
}

/// Parses a positive decimal, accepting a comma as the decimal separator.
pub(crate) fn parse_rate(raw: &str) -> Result<f64> {
    let value: f64 = raw
        .trim()
        .replace(',', ".")
        .parse()
        .map_err(|e| anyhow!("Invalid rate '{}': {}", raw, e))?;
    if !value.is_finite() || value <= 0.0 {
        return Err(anyhow!("Invalid rate '{}': must be positive", raw));
    }
    Ok(value)
}

//! Exchange rate records shared by sources, the merge table and responses

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::currency::Currency;

/// Provider priority. Higher values win under the priority merge strategy.
pub type Priority = i32;

/// One unit of `from` buys `rate` units of `to`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Default)]
pub struct ExchangeRate {
    pub time: DateTime<Utc>,
    pub from: Currency,
    pub to: Currency,
    pub rate: f64,
    pub priority: Priority,
}

impl ExchangeRate {
    pub fn new(time: DateTime<Utc>, from: Currency, to: Currency, rate: f64) -> Self {
        ExchangeRate {
            time,
            from,
            to,
            rate,
            priority: 0,
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn symbols(&self) -> (&'static str, &'static str) {
        (self.from.symbol, self.to.symbol)
    }
}

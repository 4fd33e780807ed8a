//! Errors returned by the conversion API.

use thiserror::Error;

use crate::core::Currency;
use crate::fetch::SourceInfo;

#[derive(Debug, Error)]
pub enum ExchangeError {
    /// Symbol is not in the currency catalog.
    #[error("Currency not found: {0}")]
    UnknownCurrency(String),

    /// Symbol is catalogued but no registered provider can quote it.
    #[error("Currency not exchangeable: {0}")]
    NotExchangeable(String),

    /// The round finished without a rate for the pair. `info` holds the
    /// per-provider outcome of that round.
    #[error("No rate from {from} to {to} for value {value}")]
    NoRate {
        from: Currency,
        to: Currency,
        value: f64,
        info: Vec<SourceInfo>,
    },
}

impl ExchangeError {
    pub fn is_currency_not_found(&self) -> bool {
        matches!(
            self,
            ExchangeError::UnknownCurrency(_) | ExchangeError::NotExchangeable(_)
        )
    }
}

pub type ExchangeResult<T> = Result<T, ExchangeError>;

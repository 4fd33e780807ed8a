//! Core rate types and the shared triangulation routine

pub mod config;
pub mod currency;
pub mod log;
pub mod rate;
pub mod triangulate;

pub use currency::Currency;
pub use rate::{ExchangeRate, Priority};
pub use triangulate::{per_anchor_from_prices, triangulate};

//! Aggregates exchange rates published by several central banks into one
//! pairwise rate table and converts amounts between currencies.
//!
//! ```no_run
//! # async fn demo() -> anyhow::Result<()> {
//! use xfx::{Exchanger, ExchangerOptions};
//!
//! let exchanger = Exchanger::with_default_providers(ExchangerOptions::default())?;
//! let conversion = exchanger.convert("USD", "EUR", 100.0).await?;
//! println!("{conversion}");
//! # Ok(())
//! # }
//! ```

pub mod core;
pub mod error;
pub mod exchanger;
pub mod fetch;
pub mod merge;
pub mod providers;
pub mod registry;

use std::time::Duration;

pub use crate::core::{Currency, ExchangeRate, Priority};
pub use error::{ExchangeError, ExchangeResult};
pub use exchanger::{Conversion, Exchanger, ExchangerOptions, LatestResponse};
pub use fetch::{ProviderStatus, SourceInfo};
pub use merge::{MergePolicy, MergeStrategy, RateTable};
pub use providers::RateSource;
pub use registry::{Provider, ProviderRegistry};

pub const DEFAULT_RETRIES: usize = 1;
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(5);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

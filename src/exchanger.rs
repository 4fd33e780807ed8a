//! The aggregation engine's public face: provider registry, fetch rounds and
//! conversions.

use anyhow::Result;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tracing::{debug, info};

use crate::core::config::AppConfig;
use crate::core::{Currency, ExchangeRate, Priority, currency};
use crate::error::{ExchangeError, ExchangeResult};
use crate::fetch::{SourceInfo, fetch_round};
use crate::merge::{MergeStrategy, RateTable};
use crate::providers::util::RetryPolicy;
use crate::providers::{
    CaeSource, EcbSource, RateSource, RcbSource, cae::CAE_BASE_URL, ecb::ECB_BASE_URL,
    rcb::RCB_BASE_URL,
};
use crate::registry::{Provider, ProviderRegistry};

pub const ECB: &str = "ecb";
pub const RCB: &str = "rcb";
pub const CAE: &str = "cae";

#[derive(Debug, Clone)]
pub struct ExchangerOptions {
    /// Retries after a failed fetch, per provider and round.
    pub retries: usize,
    pub retry_backoff: Duration,
    /// Deadline for a whole round, retries included.
    pub request_timeout: Duration,
    pub strategy: MergeStrategy,
}

impl Default for ExchangerOptions {
    fn default() -> Self {
        ExchangerOptions {
            retries: crate::DEFAULT_RETRIES,
            retry_backoff: crate::DEFAULT_RETRY_BACKOFF,
            request_timeout: crate::DEFAULT_REQUEST_TIMEOUT,
            strategy: MergeStrategy::default(),
        }
    }
}

/// Result of one fetch round.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatestResponse {
    /// Every symbol a registered provider claims to support.
    pub expected: Vec<&'static str>,
    /// Symbols of `expected` that appear in no rate of `result`.
    pub unreceived: Vec<&'static str>,
    pub info: Vec<SourceInfo>,
    pub result: Vec<ExchangeRate>,
}

impl LatestResponse {
    pub fn is_complete(&self) -> bool {
        self.unreceived.is_empty()
    }

    pub fn rate(&self, from: &str, to: &str) -> Option<&ExchangeRate> {
        self.result
            .iter()
            .find(|r| r.from.symbol == from && r.to.symbol == to)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Conversion {
    pub value: f64,
    pub from: Currency,
    pub to: Currency,
    pub rate: ExchangeRate,
    pub amount: f64,
    pub info: Vec<SourceInfo>,
}

impl fmt::Display for Conversion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} = {:.prec$} {} (rate {})",
            self.value,
            self.from,
            self.amount,
            self.to,
            self.rate.rate,
            prec = self.to.minor_units as usize
        )
    }
}

pub struct Exchanger {
    registry: RwLock<ProviderRegistry>,
    exchangeable: RwLock<Option<Arc<Vec<&'static str>>>>,
    options: ExchangerOptions,
}

impl Exchanger {
    /// An engine with no providers.
    pub fn new(options: ExchangerOptions) -> Self {
        Exchanger {
            registry: RwLock::new(ProviderRegistry::new()),
            exchangeable: RwLock::new(None),
            options,
        }
    }

    /// An engine with the ECB, CBR and CBUAE sources at their public URLs.
    pub fn with_default_providers(options: ExchangerOptions) -> Result<Self> {
        let exchanger = Self::new(options);
        exchanger.register(ECB, 0, Arc::new(EcbSource::new(ECB_BASE_URL)?));
        exchanger.register(RCB, 1, Arc::new(RcbSource::new(RCB_BASE_URL)?));
        exchanger.register(CAE, 2, Arc::new(CaeSource::new(CAE_BASE_URL)?));
        Ok(exchanger)
    }

    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let exchanger = Self::new(config.options());
        let providers = &config.providers;
        if let Some(ecb) = &providers.ecb {
            exchanger.register(ECB, ecb.priority, Arc::new(EcbSource::new(&ecb.base_url)?));
        }
        if let Some(rcb) = &providers.rcb {
            exchanger.register(RCB, rcb.priority, Arc::new(RcbSource::new(&rcb.base_url)?));
        }
        if let Some(cae) = &providers.cae {
            exchanger.register(CAE, cae.priority, Arc::new(CaeSource::new(&cae.base_url)?));
        }
        debug!(providers = exchanger.providers().len(), "Exchanger configured");
        Ok(exchanger)
    }

    pub fn options(&self) -> &ExchangerOptions {
        &self.options
    }

    /// Binds `source` under `name`, replacing any provider of that name.
    pub fn register(&self, name: impl Into<String>, priority: Priority, source: Arc<dyn RateSource>) {
        let mut registry = self.registry.write().unwrap_or_else(PoisonError::into_inner);
        registry.register(name, priority, source);
        self.refresh_exchangeable(&registry);
    }

    /// Removes the named providers and returns how many were bound.
    pub fn remove<S: AsRef<str>>(&self, names: &[S]) -> usize {
        let mut registry = self.registry.write().unwrap_or_else(PoisonError::into_inner);
        let removed = registry.remove(names);
        self.refresh_exchangeable(&registry);
        removed
    }

    /// Returns false when no provider is bound to `name`.
    pub fn set_priority(&self, name: &str, priority: Priority) -> bool {
        let mut registry = self.registry.write().unwrap_or_else(PoisonError::into_inner);
        let found = registry.set_priority(name, priority);
        self.refresh_exchangeable(&registry);
        found
    }

    /// Registered providers, highest priority first.
    pub fn providers(&self) -> Vec<Provider> {
        let registry = self.registry.read().unwrap_or_else(PoisonError::into_inner);
        registry.iter().cloned().collect()
    }

    /// Sorted union of the symbols the registered providers can quote.
    pub fn get_exchangeable(&self) -> Arc<Vec<&'static str>> {
        let registry = self.registry.read().unwrap_or_else(PoisonError::into_inner);
        self.exchangeable_locked(&registry)
    }

    /// Providers and their exchangeable union as of the same registry state.
    fn snapshot(&self) -> (Vec<Provider>, Arc<Vec<&'static str>>) {
        let registry = self.registry.read().unwrap_or_else(PoisonError::into_inner);
        let providers = registry.iter().cloned().collect();
        (providers, self.exchangeable_locked(&registry))
    }

    /// Caller holds the registry lock, so the cache cannot go stale under it.
    fn exchangeable_locked(&self, registry: &ProviderRegistry) -> Arc<Vec<&'static str>> {
        if let Some(cached) = self
            .exchangeable
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            return Arc::clone(cached);
        }

        let mut cache = self.exchangeable.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(cache.get_or_insert_with(|| Arc::new(registry.exchangeable())))
    }

    /// Runs one fetch round across the providers registered when it starts.
    /// Registry changes made while the round runs apply to the next one.
    pub async fn get_latest(&self) -> LatestResponse {
        let (providers, expected) = self.snapshot();
        let table = Arc::new(RateTable::new(self.options.strategy.clone()));
        let policy = RetryPolicy {
            retries: self.options.retries,
            backoff: self.options.retry_backoff,
        };

        let info = fetch_round(&providers, Arc::clone(&table), policy, self.options.request_timeout).await;
        if table.dropped() > 0 {
            debug!(dropped = table.dropped(), "Unresolvable rates dropped this round");
        }

        let result = table.flatten();
        let received: BTreeSet<&str> = result
            .iter()
            .flat_map(|r| [r.from.symbol, r.to.symbol])
            .collect();
        let expected = expected.as_ref().clone();
        let unreceived: Vec<&'static str> = expected
            .iter()
            .copied()
            .filter(|symbol| !received.contains(symbol))
            .collect();
        if !unreceived.is_empty() {
            info!(count = unreceived.len(), ?unreceived, "Symbols not received this round");
        }

        LatestResponse {
            expected,
            unreceived,
            info,
            result,
        }
    }

    /// Converts `value` units of `from` into `to` using a fresh round.
    pub async fn convert(&self, from: &str, to: &str, value: f64) -> ExchangeResult<Conversion> {
        self.convert_with(from, to, value, || self.get_latest()).await
    }

    /// Like [`Exchanger::convert`], with the rates taken from `fetch`. Both
    /// symbols are validated before `fetch` is called.
    pub async fn convert_with<F, Fut>(
        &self,
        from: &str,
        to: &str,
        value: f64,
        fetch: F,
    ) -> ExchangeResult<Conversion>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = LatestResponse>,
    {
        let from_ccy =
            currency::lookup(from).ok_or_else(|| ExchangeError::UnknownCurrency(from.to_string()))?;
        let to_ccy =
            currency::lookup(to).ok_or_else(|| ExchangeError::UnknownCurrency(to.to_string()))?;

        let exchangeable = self.get_exchangeable();
        for symbol in [from_ccy.symbol, to_ccy.symbol] {
            if exchangeable.binary_search(&symbol).is_err() {
                return Err(ExchangeError::NotExchangeable(symbol.to_string()));
            }
        }

        let latest = fetch().await;
        let Some(rate) = latest.rate(from_ccy.symbol, to_ccy.symbol).copied() else {
            return Err(ExchangeError::NoRate {
                from: from_ccy,
                to: to_ccy,
                value,
                info: latest.info,
            });
        };

        Ok(Conversion {
            value,
            from: from_ccy,
            to: to_ccy,
            amount: rate.rate * value,
            rate,
            info: latest.info,
        })
    }

    fn refresh_exchangeable(&self, registry: &ProviderRegistry) {
        let symbols = Arc::new(registry.exchangeable());
        debug!(count = symbols.len(), "Exchangeable symbols recomputed");
        *self.exchangeable.write().unwrap_or_else(PoisonError::into_inner) = Some(symbols);
    }
}

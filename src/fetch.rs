//! One fetch round: every registered provider fetched concurrently, results
//! merged into a shared [`RateTable`] as they arrive.

use futures::future::join_all;
use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::merge::RateTable;
use crate::providers::util::{RetryPolicy, with_retry};
use crate::registry::Provider;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderStatus {
    Ok,
    Failed,
}

/// Outcome of one provider in one round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceInfo {
    pub name: String,
    pub status: ProviderStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SourceInfo {
    pub fn ok(name: impl Into<String>) -> Self {
        SourceInfo {
            name: name.into(),
            status: ProviderStatus::Ok,
            error: None,
        }
    }

    pub fn failed(name: impl Into<String>, error: impl Into<String>) -> Self {
        SourceInfo {
            name: name.into(),
            status: ProviderStatus::Failed,
            error: Some(error.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == ProviderStatus::Ok
    }
}

/// Fetches every provider in `providers` under one deadline of `timeout` from
/// now and merges the successful batches into `table`.
///
/// Returns one status per provider, in the order of `providers`. Failures,
/// including a panicking source, are reported there and never returned as
/// an error.
pub async fn fetch_round(
    providers: &[Provider],
    table: Arc<RateTable>,
    policy: RetryPolicy,
    timeout: Duration,
) -> Vec<SourceInfo> {
    let started = Instant::now();
    let deadline = started
        .checked_add(timeout)
        .unwrap_or_else(|| started + Duration::from_secs(86_400));
    let statuses = Arc::new(Mutex::new(Vec::with_capacity(providers.len())));

    let handles = providers.iter().cloned().map(|provider| {
        let table = Arc::clone(&table);
        let statuses = Arc::clone(&statuses);
        tokio::spawn(async move {
            let result =
                with_retry(|| provider.source().fetch_latest(), policy, deadline).await;

            let info = match result {
                Ok(rates) => {
                    let count = rates.len();
                    let priority = provider.priority();
                    table.merge(rates.into_iter().map(|r| r.with_priority(priority)).collect());
                    debug!(provider = provider.name(), count, "Merged provider rates");
                    SourceInfo::ok(provider.name())
                }
                Err(err) => {
                    let message = format!("{err:#}");
                    warn!(provider = provider.name(), error = %message, "Provider failed");
                    SourceInfo::failed(provider.name(), message)
                }
            };
            statuses
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(info);
        })
    });
    let joined = join_all(handles).await;

    let mut statuses = std::mem::take(&mut *statuses.lock().unwrap_or_else(PoisonError::into_inner));
    for (provider, joined) in providers.iter().zip(joined) {
        if let Err(err) = joined {
            warn!(provider = provider.name(), error = %err, "Provider task aborted");
            statuses.push(SourceInfo::failed(provider.name(), format!("task failed: {err}")));
        }
    }
    statuses.sort_by_key(|info| {
        providers
            .iter()
            .position(|p| p.name() == info.name)
            .unwrap_or(usize::MAX)
    });

    let failed = statuses.iter().filter(|s| !s.is_ok()).count();
    info!(
        providers = providers.len(),
        failed,
        rates = table.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Fetch round complete"
    );
    statuses
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ExchangeRate, currency};
    use crate::merge::MergeStrategy;
    use crate::providers::RateSource;
    use anyhow::{Result, anyhow};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedSource {
        rate: f64,
        calls: AtomicUsize,
        fail_first: usize,
    }

    impl FixedSource {
        fn new(rate: f64, fail_first: usize) -> Self {
            FixedSource {
                rate,
                calls: AtomicUsize::new(0),
                fail_first,
            }
        }
    }

    #[async_trait]
    impl RateSource for FixedSource {
        async fn fetch_latest(&self) -> Result<Vec<ExchangeRate>> {
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.fail_first {
                return Err(anyhow!("connection reset"));
            }
            let usd = currency::lookup("USD").unwrap();
            let eur = currency::lookup("EUR").unwrap();
            Ok(vec![ExchangeRate::new(Utc::now(), usd, eur, self.rate)])
        }

        fn exchangeable(&self) -> &[&'static str] {
            &["USD", "EUR"]
        }
    }

    struct PanickingSource;

    #[async_trait]
    impl RateSource for PanickingSource {
        async fn fetch_latest(&self) -> Result<Vec<ExchangeRate>> {
            panic!("decoder bug");
        }

        fn exchangeable(&self) -> &[&'static str] {
            &[]
        }
    }

    struct SlowSource;

    #[async_trait]
    impl RateSource for SlowSource {
        async fn fetch_latest(&self) -> Result<Vec<ExchangeRate>> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Vec::new())
        }

        fn exchangeable(&self) -> &[&'static str] {
            &[]
        }
    }

    fn src(source: impl RateSource + 'static) -> Arc<dyn RateSource> {
        Arc::new(source)
    }

    fn providers(list: Vec<(&str, i32, Arc<dyn RateSource>)>) -> Vec<Provider> {
        let mut registry = crate::registry::ProviderRegistry::new();
        for (name, priority, source) in list {
            registry.register(name, priority, source);
        }
        registry.iter().cloned().collect()
    }

    fn quick_retry() -> RetryPolicy {
        RetryPolicy {
            retries: 1,
            backoff: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn test_round_stamps_priority_and_reports_in_order() {
        let providers = providers(vec![
            ("low", 1, src(FixedSource::new(1.0, 0))),
            ("high", 7, src(FixedSource::new(2.0, 1))),
        ]);
        let table = Arc::new(RateTable::new(MergeStrategy::Priority));

        let info = fetch_round(&providers, Arc::clone(&table), quick_retry(), Duration::from_secs(5)).await;

        assert_eq!(info, vec![SourceInfo::ok("high"), SourceInfo::ok("low")]);
        let rate = table.get("USD", "EUR").unwrap();
        assert_eq!(rate.rate, 2.0);
        assert_eq!(rate.priority, 7);
    }

    #[tokio::test]
    async fn test_round_isolates_failures() {
        let providers = providers(vec![
            ("flaky", 2, src(FixedSource::new(1.0, 5))),
            ("panics", 1, src(PanickingSource)),
            ("good", 0, src(FixedSource::new(1.5, 0))),
        ]);
        let table = Arc::new(RateTable::new(MergeStrategy::Race));

        let info = fetch_round(&providers, Arc::clone(&table), quick_retry(), Duration::from_secs(5)).await;

        assert_eq!(info.len(), 3);
        assert_eq!(info[0].name, "flaky");
        assert_eq!(info[0].status, ProviderStatus::Failed);
        assert_eq!(info[0].error.as_deref(), Some("connection reset"));
        assert_eq!(info[1].name, "panics");
        assert_eq!(info[1].status, ProviderStatus::Failed);
        assert_eq!(info[2], SourceInfo::ok("good"));
        assert_eq!(table.get("USD", "EUR").unwrap().rate, 1.5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_round_deadline() {
        let providers = providers(vec![("slow", 0, src(SlowSource))]);
        let table = Arc::new(RateTable::new(MergeStrategy::Race));

        let info = fetch_round(&providers, Arc::clone(&table), quick_retry(), Duration::from_secs(2)).await;

        assert_eq!(info[0].status, ProviderStatus::Failed);
        assert!(info[0].error.as_deref().unwrap().contains("deadline exceeded"));
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn test_empty_round() {
        let table = Arc::new(RateTable::new(MergeStrategy::Race));
        let info = fetch_round(&[], table, quick_retry(), Duration::from_secs(1)).await;
        assert!(info.is_empty());
    }
}

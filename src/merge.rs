//! Reconciles rates reported by several providers for the same currency pair.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

use crate::core::ExchangeRate;

/// Custom conflict resolver. Receives `(current, incoming)` and returns the
/// rate to keep, or `None` when the two cannot be reconciled.
pub type MergeFn = dyn Fn(&ExchangeRate, &ExchangeRate) -> Option<ExchangeRate> + Send + Sync;

/// Built-in policies selectable from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergePolicy {
    /// First writer wins.
    #[default]
    Race,
    /// Arithmetic mean of the conflicting rates.
    Average,
    /// Rate from the provider with the higher priority wins.
    Priority,
}

#[derive(Clone, Default)]
pub enum MergeStrategy {
    #[default]
    Race,
    Average,
    Priority,
    Custom(Arc<MergeFn>),
}

impl MergeStrategy {
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&ExchangeRate, &ExchangeRate) -> Option<ExchangeRate> + Send + Sync + 'static,
    {
        MergeStrategy::Custom(Arc::new(f))
    }

    /// Resolves a conflict on an occupied cell.
    pub fn resolve(&self, current: &ExchangeRate, incoming: &ExchangeRate) -> Option<ExchangeRate> {
        match self {
            MergeStrategy::Race => {
                if !current.from.is_empty() {
                    Some(*current)
                } else if !incoming.to.is_empty() {
                    Some(*incoming)
                } else {
                    None
                }
            }
            MergeStrategy::Average => {
                if current.from.is_empty() || incoming.to.is_empty() {
                    return None;
                }
                Some(ExchangeRate {
                    rate: (current.rate + incoming.rate) / 2.0,
                    ..*current
                })
            }
            MergeStrategy::Priority => {
                if current.priority < incoming.priority {
                    Some(*incoming)
                } else {
                    Some(*current)
                }
            }
            MergeStrategy::Custom(f) => f(current, incoming),
        }
    }
}

impl From<MergePolicy> for MergeStrategy {
    fn from(policy: MergePolicy) -> Self {
        match policy {
            MergePolicy::Race => MergeStrategy::Race,
            MergePolicy::Average => MergeStrategy::Average,
            MergePolicy::Priority => MergeStrategy::Priority,
        }
    }
}

impl fmt::Debug for MergeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MergeStrategy::Race => write!(f, "Race"),
            MergeStrategy::Average => write!(f, "Average"),
            MergeStrategy::Priority => write!(f, "Priority"),
            MergeStrategy::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

type Cells = BTreeMap<&'static str, BTreeMap<&'static str, ExchangeRate>>;

/// from-symbol -> to-symbol -> rate, shared by all provider tasks of a round.
///
/// A single mutex guards the whole table, so one batch is merged atomically
/// with respect to any other batch.
pub struct RateTable {
    cells: Mutex<Cells>,
    strategy: MergeStrategy,
    dropped: AtomicU64,
}

impl RateTable {
    pub fn new(strategy: MergeStrategy) -> Self {
        Self {
            cells: Mutex::new(BTreeMap::new()),
            strategy,
            dropped: AtomicU64::new(0),
        }
    }

    /// Absorbs one provider's batch.
    pub fn merge(&self, rates: Vec<ExchangeRate>) {
        let mut cells = self.cells.lock().unwrap_or_else(PoisonError::into_inner);

        for incoming in rates {
            let (from, to) = incoming.symbols();
            let mut cell = match cells.entry(from).or_default().entry(to) {
                Entry::Vacant(cell) => {
                    cell.insert(incoming);
                    continue;
                }
                Entry::Occupied(cell) => cell,
            };

            match self.strategy.resolve(cell.get(), &incoming) {
                Some(resolved) => {
                    cell.insert(resolved);
                }
                None => {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    debug!(
                        from,
                        to,
                        rate = incoming.rate,
                        strategy = ?self.strategy,
                        "Dropped unresolvable rate"
                    );
                }
            }
        }
    }

    /// Copies the table into a list ordered by (from, to).
    pub fn flatten(&self) -> Vec<ExchangeRate> {
        let cells = self.cells.lock().unwrap_or_else(PoisonError::into_inner);
        cells.values().flat_map(|row| row.values().copied()).collect()
    }

    pub fn get(&self, from: &str, to: &str) -> Option<ExchangeRate> {
        let cells = self.cells.lock().unwrap_or_else(PoisonError::into_inner);
        cells.get(from).and_then(|row| row.get(to)).copied()
    }

    pub fn len(&self) -> usize {
        let cells = self.cells.lock().unwrap_or_else(PoisonError::into_inner);
        cells.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of incoming rates discarded as unresolvable.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

//! Named, prioritized bindings of rate sources.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use crate::core::Priority;
use crate::providers::RateSource;

#[derive(Clone)]
pub struct Provider {
    name: String,
    priority: Priority,
    source: Arc<dyn RateSource>,
}

impl Provider {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn source(&self) -> &Arc<dyn RateSource> {
        &self.source
    }
}

impl fmt::Debug for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provider")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}

/// Providers kept in descending priority order. Providers with equal
/// priority keep their registration order.
#[derive(Debug, Clone, Default)]
pub struct ProviderRegistry {
    providers: Vec<Provider>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `source` under `name`. An existing binding with the same name is
    /// replaced.
    pub fn register(&mut self, name: impl Into<String>, priority: Priority, source: Arc<dyn RateSource>) {
        let name = name.into();
        self.providers.retain(|p| p.name != name);
        self.providers.push(Provider {
            name,
            priority,
            source,
        });
        self.sort();
    }

    /// Removes every provider whose name is listed. Unknown names are ignored.
    /// Returns how many providers were removed.
    pub fn remove<S: AsRef<str>>(&mut self, names: &[S]) -> usize {
        let before = self.providers.len();
        self.providers
            .retain(|p| !names.iter().any(|name| name.as_ref() == p.name));
        before - self.providers.len()
    }

    /// Returns false when no provider is bound under `name`.
    pub fn set_priority(&mut self, name: &str, priority: Priority) -> bool {
        let Some(provider) = self.providers.iter_mut().find(|p| p.name == name) else {
            return false;
        };
        provider.priority = priority;
        self.sort();
        true
    }

    pub fn get(&self, name: &str) -> Option<&Provider> {
        self.providers.iter().find(|p| p.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Provider> {
        self.providers.iter()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Union of every provider's exchangeable symbols, sorted.
    pub fn exchangeable(&self) -> Vec<&'static str> {
        self.providers
            .iter()
            .flat_map(|p| p.source.exchangeable().iter().copied())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    fn sort(&mut self) {
        self.providers.sort_by(|a, b| b.priority.cmp(&a.priority));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ExchangeRate;
    use anyhow::Result;
    use async_trait::async_trait;

    struct StubSource(&'static [&'static str]);

    #[async_trait]
    impl RateSource for StubSource {
        async fn fetch_latest(&self) -> Result<Vec<ExchangeRate>> {
            Ok(vec![])
        }

        fn exchangeable(&self) -> &[&'static str] {
            self.0
        }
    }

    fn names(registry: &ProviderRegistry) -> Vec<&str> {
        registry.iter().map(Provider::name).collect()
    }

    fn registry() -> ProviderRegistry {
        let mut registry = ProviderRegistry::new();
        registry.register("ecb", 0, Arc::new(StubSource(&["EUR", "USD"])));
        registry.register("rcb", 1, Arc::new(StubSource(&["RUB", "USD"])));
        registry.register("cae", 2, Arc::new(StubSource(&["AED", "USD", "AUD"])));
        registry
    }

    #[test]
    fn test_register_sorts_by_descending_priority() {
        let registry = registry();
        assert_eq!(names(&registry), vec!["cae", "rcb", "ecb"]);
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_equal_priorities_keep_registration_order() {
        let mut registry = ProviderRegistry::new();
        registry.register("a", 1, Arc::new(StubSource(&[])));
        registry.register("b", 1, Arc::new(StubSource(&[])));
        registry.register("c", 3, Arc::new(StubSource(&[])));
        assert_eq!(names(&registry), vec!["c", "a", "b"]);
    }

    #[test]
    fn test_register_replaces_existing_name() {
        let mut registry = registry();
        registry.register("ecb", 5, Arc::new(StubSource(&["EUR", "CHF"])));

        assert_eq!(registry.len(), 3);
        assert_eq!(names(&registry), vec!["ecb", "cae", "rcb"]);
        assert_eq!(registry.get("ecb").unwrap().priority(), 5);
        assert!(registry.exchangeable().contains(&"CHF"));
    }

    #[test]
    fn test_remove() {
        let mut registry = registry();
        assert_eq!(registry.remove(&["ecb", "cae", "unknown"]), 2);
        assert_eq!(names(&registry), vec!["rcb"]);

        let none: [&str; 0] = [];
        assert_eq!(registry.remove(&none), 0);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_set_priority_resorts() {
        let mut registry = registry();
        assert!(registry.set_priority("ecb", 10));
        assert_eq!(names(&registry), vec!["ecb", "cae", "rcb"]);
        assert!(!registry.set_priority("missing", 1));
    }

    #[test]
    fn test_exchangeable_union() {
        let registry = registry();
        assert_eq!(
            registry.exchangeable(),
            vec!["AED", "AUD", "EUR", "RUB", "USD"]
        );
        assert!(ProviderRegistry::new().exchangeable().is_empty());
    }
}

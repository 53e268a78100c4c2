use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use crate::config::{CapacityConfig, ClientConfig};
use crate::context::CapacityLane;
use crate::util::{read_unpoisoned, write_unpoisoned};

/// Identifies one logical endpoint variant sharing a retry budget.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CapacityKey(String);

impl CapacityKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn for_config(config: &ClientConfig) -> Self {
        if let Some(service_url) = config.service_url() {
            return Self(service_url.trim_end_matches('/').to_owned());
        }
        Self(format!(
            "{}|{}|{}|fips={}|dualstack={}",
            config.scheme(),
            config.region().unwrap_or_default(),
            config.service_name(),
            config.use_fips(),
            config.use_dual_stack()
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CapacityKey {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(&self.0)
    }
}

/// A bounded, lane-costed token pool.
#[derive(Debug)]
pub struct RetryCapacity {
    config: CapacityConfig,
    balance: AtomicUsize,
}

impl RetryCapacity {
    pub fn new(config: CapacityConfig) -> Self {
        Self {
            config,
            balance: AtomicUsize::new(config.configured_max_capacity()),
        }
    }

    pub fn available(&self) -> usize {
        self.balance.load(Ordering::Acquire)
    }

    pub fn max_capacity(&self) -> usize {
        self.config.configured_max_capacity()
    }

    pub fn cost(&self, lane: CapacityLane) -> usize {
        match lane {
            CapacityLane::Throttling => self.config.configured_throttling_cost(),
            CapacityLane::Timeout => self.config.configured_timeout_cost(),
            CapacityLane::Generic => self.config.configured_retry_cost(),
        }
    }

    pub fn try_acquire(&self, lane: CapacityLane) -> bool {
        let cost = self.cost(lane);
        self.balance
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |balance| {
                balance.checked_sub(cost)
            })
            .is_ok()
    }

    /// Refunds what a retry on `lane` consumed.
    pub fn release(&self, lane: CapacityLane) {
        self.deposit(self.cost(lane));
    }

    /// Credits a call that succeeded without retrying.
    pub fn release_first_try(&self) {
        self.deposit(self.config.configured_first_try_refund());
    }

    fn deposit(&self, amount: usize) {
        if amount == 0 {
            return;
        }
        let max = self.max_capacity();
        let _ = self
            .balance
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |balance| {
                if balance >= max {
                    None
                } else {
                    Some(balance.saturating_add(amount).min(max))
                }
            });
    }
}

/// Retry capacities keyed by endpoint variant, created on first use.
#[derive(Debug)]
pub struct CapacityRegistry {
    config: CapacityConfig,
    capacities: RwLock<HashMap<CapacityKey, Arc<RetryCapacity>>>,
}

impl CapacityRegistry {
    pub fn new(config: CapacityConfig) -> Self {
        Self {
            config,
            capacities: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> CapacityConfig {
        self.config
    }

    pub fn capacity_for(&self, key: &CapacityKey) -> Arc<RetryCapacity> {
        if let Some(capacity) = read_unpoisoned(&self.capacities).get(key) {
            return Arc::clone(capacity);
        }
        let mut capacities = write_unpoisoned(&self.capacities);
        Arc::clone(
            capacities
                .entry(key.clone())
                .or_insert_with(|| Arc::new(RetryCapacity::new(self.config))),
        )
    }

    pub fn try_acquire(&self, key: &CapacityKey, lane: CapacityLane) -> bool {
        self.capacity_for(key).try_acquire(lane)
    }

    pub fn release(&self, key: &CapacityKey, lane: CapacityLane) {
        self.capacity_for(key).release(lane);
    }

    pub fn release_first_try(&self, key: &CapacityKey) {
        self.capacity_for(key).release_first_try();
    }

    pub fn available(&self, key: &CapacityKey) -> usize {
        self.capacity_for(key).available()
    }
}

impl Default for CapacityRegistry {
    fn default() -> Self {
        Self::new(CapacityConfig::standard())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use proptest::prelude::*;

    use super::{CapacityKey, CapacityRegistry, RetryCapacity};
    use crate::config::{CapacityConfig, ClientConfig};
    use crate::context::CapacityLane;

    fn lane_strategy() -> impl Strategy<Value = CapacityLane> {
        prop_oneof![
            Just(CapacityLane::Throttling),
            Just(CapacityLane::Timeout),
            Just(CapacityLane::Generic),
        ]
    }

    #[test]
    fn acquire_is_denied_when_balance_is_below_lane_cost() {
        let capacity = RetryCapacity::new(CapacityConfig::standard().max_capacity(12));
        assert!(capacity.try_acquire(CapacityLane::Timeout));
        assert_eq!(capacity.available(), 2);
        assert!(!capacity.try_acquire(CapacityLane::Generic));
        assert_eq!(capacity.available(), 2);
    }

    #[test]
    fn release_is_clamped_to_max_capacity() {
        let capacity = RetryCapacity::new(CapacityConfig::standard().max_capacity(20));
        capacity.release(CapacityLane::Timeout);
        capacity.release_first_try();
        assert_eq!(capacity.available(), 20);

        assert!(capacity.try_acquire(CapacityLane::Generic));
        capacity.release(CapacityLane::Timeout);
        assert_eq!(capacity.available(), 20);
    }

    #[test]
    fn keys_separate_fips_and_dual_stack_variants() {
        let base = ClientConfig::new("kv").with_region("us-east-1");
        let plain = CapacityKey::for_config(&base);
        let fips = CapacityKey::for_config(&base.clone().with_fips(true));
        let dual = CapacityKey::for_config(&base.clone().with_dual_stack(true));
        let url = CapacityKey::for_config(&base.with_service_url("http://localhost:8000/"));

        assert_ne!(plain, fips);
        assert_ne!(plain, dual);
        assert_ne!(fips, dual);
        assert_eq!(url.as_str(), "http://localhost:8000");
    }

    #[test]
    fn registry_shares_one_capacity_per_key() {
        let registry = CapacityRegistry::default();
        let key = CapacityKey::new("a");
        let first = registry.capacity_for(&key);
        let second = registry.capacity_for(&key);
        assert!(Arc::ptr_eq(&first, &second));
        assert!(!Arc::ptr_eq(&first, &registry.capacity_for(&CapacityKey::new("b"))));
    }

    #[test]
    fn concurrent_acquire_never_overdraws() {
        let registry = Arc::new(CapacityRegistry::new(
            CapacityConfig::standard().max_capacity(100),
        ));
        let key = CapacityKey::new("shared");
        let mut workers = Vec::new();
        for _ in 0..8 {
            let registry = Arc::clone(&registry);
            let key = key.clone();
            workers.push(thread::spawn(move || {
                let mut granted = 0_usize;
                for _ in 0..50 {
                    if registry.try_acquire(&key, CapacityLane::Generic) {
                        granted += 1;
                    }
                }
                granted
            }));
        }
        let granted: usize = workers
            .into_iter()
            .map(|worker| worker.join().expect("worker should not panic"))
            .sum();

        assert_eq!(granted, 20);
        assert_eq!(registry.available(&key), 0);
    }

    proptest! {
        #[test]
        fn balance_stays_within_bounds(
            ops in proptest::collection::vec((any::<bool>(), lane_strategy()), 0..200),
            max in 1_usize..64,
        ) {
            let capacity = RetryCapacity::new(CapacityConfig::standard().max_capacity(max));
            for (acquire, lane) in ops {
                let before = capacity.available();
                if acquire {
                    let granted = capacity.try_acquire(lane);
                    prop_assert_eq!(granted, before >= capacity.cost(lane));
                } else {
                    capacity.release(lane);
                }
                prop_assert!(capacity.available() <= max);
            }
        }
    }
}

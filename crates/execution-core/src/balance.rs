//! Per-asset balance mirror.
//!
//! Two writers feed this view: the polling loop replaces the whole picture
//! after every successful fetch (evicting assets the exchange no longer
//! reports), and the user stream overwrites single assets as they change.
//! Readers always see either the complete old picture or the complete new one.

use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Total and available amount of one asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Balance {
    pub total: Decimal,
    pub available: Decimal,
}

impl Balance {
    pub fn new(total: Decimal, available: Decimal) -> Self {
        Self { total, available }
    }

    /// Amount reserved by open orders.
    pub fn locked(&self) -> Decimal {
        (self.total - self.available).max(Decimal::ZERO)
    }
}

#[derive(Debug, Default)]
struct BalanceMaps {
    total: HashMap<String, Decimal>,
    available: HashMap<String, Decimal>,
    initialized: bool,
}

/// Thread-safe `asset -> (total, available)` view.
#[derive(Debug, Default)]
pub struct BalanceView {
    inner: RwLock<BalanceMaps>,
}

/// Shared handle to a balance view.
pub type SharedBalanceView = Arc<BalanceView>;

pub fn create_balance_view() -> SharedBalanceView {
    Arc::new(BalanceView::new())
}

impl BalanceView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace every balance with a fresh fetch.
    ///
    /// Assets missing from `balances` are removed from both maps. The new maps
    /// are built outside the lock and swapped in under a single write.
    /// Returns the evicted assets, sorted.
    pub fn replace_from_fetch(&self, balances: HashMap<String, Balance>) -> Vec<String> {
        let mut total = HashMap::with_capacity(balances.len());
        let mut available = HashMap::with_capacity(balances.len());
        for (asset, balance) in balances {
            total.insert(asset.clone(), balance.total);
            available.insert(asset, balance.available);
        }

        let mut inner = self.inner.write();
        let mut evicted: Vec<String> = inner
            .total
            .keys()
            .chain(inner.available.keys())
            .filter(|asset| !total.contains_key(*asset))
            .cloned()
            .collect();
        evicted.sort();
        evicted.dedup();

        inner.total = total;
        inner.available = available;
        inner.initialized = true;
        evicted
    }

    /// Overwrite one asset from a push update. Never evicts other assets.
    pub fn apply_delta(&self, asset: &str, total: Decimal, available: Decimal) {
        let mut inner = self.inner.write();
        inner.total.insert(asset.to_string(), total);
        inner.available.insert(asset.to_string(), available);
    }

    pub fn total(&self, asset: &str) -> Option<Decimal> {
        self.inner.read().total.get(asset).copied()
    }

    pub fn available(&self, asset: &str) -> Option<Decimal> {
        self.inner.read().available.get(asset).copied()
    }

    pub fn get(&self, asset: &str) -> Option<Balance> {
        let inner = self.inner.read();
        match (inner.total.get(asset), inner.available.get(asset)) {
            (Some(total), Some(available)) => Some(Balance::new(*total, *available)),
            _ => None,
        }
    }

    /// Consistent copy of every balance.
    pub fn snapshot(&self) -> HashMap<String, Balance> {
        let inner = self.inner.read();
        inner
            .total
            .iter()
            .map(|(asset, total)| {
                let available = inner.available.get(asset).copied().unwrap_or_default();
                (asset.clone(), Balance::new(*total, available))
            })
            .collect()
    }

    /// Assets currently held, sorted.
    pub fn assets(&self) -> Vec<String> {
        let mut assets: Vec<String> = self.inner.read().total.keys().cloned().collect();
        assets.sort();
        assets
    }

    /// True once a full fetch has been applied.
    pub fn is_initialized(&self) -> bool {
        self.inner.read().initialized
    }
}

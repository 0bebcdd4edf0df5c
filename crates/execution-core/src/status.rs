//! Exchange status vocabulary translation.
//!
//! Each exchange names order states differently (`NEW`, `open`, `closed`,
//! `cancelled`, ...). A [`StatusTable`] maps those tokens onto the shared
//! [`OrderState`] enum so the state machine is written once.

use crate::order::OrderState;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Token -> state map. Lookups are case-insensitive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "HashMap<String, OrderState>", into = "HashMap<String, OrderState>")]
pub struct StatusTable {
    entries: HashMap<String, OrderState>,
}

impl StatusTable {
    /// Empty table (every token is unknown).
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from `(token, state)` pairs.
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, OrderState)>) -> Self {
        let mut table = Self::new();
        for (token, state) in pairs {
            table.insert(token, state);
        }
        table
    }

    /// Table understanding the canonical state names plus the most common
    /// exchange spellings.
    pub fn canonical() -> Self {
        Self::from_pairs([
            ("PENDING_CREATE", OrderState::PendingCreate),
            ("OPEN", OrderState::Open),
            ("NEW", OrderState::Open),
            ("PARTIALLY_FILLED", OrderState::PartiallyFilled),
            ("FILLED", OrderState::Filled),
            ("CANCELED", OrderState::Canceled),
            ("CANCELLED", OrderState::Canceled),
            ("FAILED", OrderState::Failed),
            ("REJECTED", OrderState::Failed),
            ("EXPIRED", OrderState::Expired),
        ])
    }

    pub fn insert(&mut self, token: &str, state: OrderState) {
        self.entries.insert(token.to_ascii_uppercase(), state);
    }

    /// Translate an exchange token. `None` means the token is not in the table.
    pub fn translate(&self, token: &str) -> Option<OrderState> {
        self.entries.get(&token.trim().to_ascii_uppercase()).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl From<HashMap<String, OrderState>> for StatusTable {
    fn from(map: HashMap<String, OrderState>) -> Self {
        let mut table = Self::new();
        for (token, state) in map {
            table.insert(&token, state);
        }
        table
    }
}

impl From<StatusTable> for HashMap<String, OrderState> {
    fn from(table: StatusTable) -> Self {
        table.entries
    }
}

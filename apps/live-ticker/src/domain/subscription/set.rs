use std::collections::HashSet;

use crate::domain::ticker::Symbol;

/// Ordered, deduplicated set of symbols multiplexed into one stream
/// connection.
///
/// Iteration follows first-insertion order; equality ignores order.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionSet {
    ordered: Vec<Symbol>,
    members: HashSet<Symbol>,
}

impl SubscriptionSet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a symbol, returning `false` if it was already present.
    pub fn insert(&mut self, symbol: Symbol) -> bool {
        if self.members.insert(symbol.clone()) {
            self.ordered.push(symbol);
            true
        } else {
            false
        }
    }

    /// Whether `symbol` is in the set.
    #[must_use]
    pub fn contains(&self, symbol: &str) -> bool {
        self.members.contains(symbol)
    }

    /// Symbols in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Symbol> {
        self.ordered.iter()
    }

    /// Symbols in insertion order.
    #[must_use]
    pub fn as_slice(&self) -> &[Symbol] {
        &self.ordered
    }

    /// Number of symbols.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    /// Whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    /// Symbols present in `self` but not in `other`, in order.
    #[must_use]
    pub fn difference(&self, other: &Self) -> Vec<Symbol> {
        self.ordered
            .iter()
            .filter(|s| !other.contains(s.as_str()))
            .cloned()
            .collect()
    }
}

impl PartialEq for SubscriptionSet {
    fn eq(&self, other: &Self) -> bool {
        self.members == other.members
    }
}

impl Eq for SubscriptionSet {}

impl FromIterator<Symbol> for SubscriptionSet {
    fn from_iter<I: IntoIterator<Item = Symbol>>(iter: I) -> Self {
        let mut set = Self::new();
        for symbol in iter {
            set.insert(symbol);
        }
        set
    }
}

impl<'a> IntoIterator for &'a SubscriptionSet {
    type Item = &'a Symbol;
    type IntoIter = std::slice::Iter<'a, Symbol>;

    fn into_iter(self) -> Self::IntoIter {
        self.ordered.iter()
    }
}

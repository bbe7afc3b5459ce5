//! Process-wide string interning.
//!
//! Stored strings (host names, check commands, plugin output prefixes)
//! repeat heavily across peers; the interner shares one allocation per
//! distinct string. It holds its own sharded lock and never touches a
//! table lock.

use std::sync::Arc;

use dashmap::DashMap;

/// A shared string pool. Cloning the handle is cheap.
#[derive(Debug, Default)]
pub struct Interner {
    pool: DashMap<Arc<str>, ()>,
}

impl Interner {
    /// Creates an empty pool.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the canonical shared allocation for `s`.
    #[must_use]
    pub fn intern(&self, s: &str) -> Arc<str> {
        if let Some(entry) = self.pool.get(s) {
            return Arc::clone(entry.key());
        }
        let arc: Arc<str> = Arc::from(s);
        self.pool.insert(Arc::clone(&arc), ());
        arc
    }

    /// Number of distinct strings currently pooled.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pool.len()
    }

    /// Returns true if the pool is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pool.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_shares_allocation() {
        let interner = Interner::new();
        let a = interner.intern("testhost_1");
        let b = interner.intern("testhost_1");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(interner.len(), 1);
    }

    #[test]
    fn test_intern_distinct() {
        let interner = Interner::new();
        let a = interner.intern("a");
        let b = interner.intern("b");
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(interner.len(), 2);
    }
}

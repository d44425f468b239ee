//! Bounded cache of parsed template plans.
//!
//! The cache is a pure performance optimization: a miss (or a disabled
//! cache) parses the template inline and renders identically. Reads take a
//! shared lock; inserts are serialized behind the write lock. When the
//! cache is full, new templates bypass it while cached ones stay
//! hit-eligible.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use super::parser::{parse, TemplatePlan};

pub const DEFAULT_CACHE_CAPACITY: usize = 128;

pub struct TemplateCache {
    capacity: AtomicUsize,
    plans: RwLock<HashMap<String, Arc<TemplatePlan>>>,
}

impl TemplateCache {
    pub fn new(capacity: usize) -> Self {
        TemplateCache {
            capacity: AtomicUsize::new(capacity),
            plans: RwLock::new(HashMap::new()),
        }
    }

    /// Fetch the plan for a template, parsing and (capacity permitting)
    /// caching it on a miss. Capacity zero disables caching entirely.
    pub fn get_or_parse(&self, template: &str) -> Arc<TemplatePlan> {
        let capacity = self.capacity.load(Ordering::Relaxed);
        if capacity == 0 {
            return Arc::new(parse(template));
        }

        if let Some(plan) = self.plans.read().get(template) {
            return Arc::clone(plan);
        }

        let plan = Arc::new(parse(template));
        let mut plans = self.plans.write();
        if let Some(existing) = plans.get(template) {
            return Arc::clone(existing);
        }
        if plans.len() < capacity {
            plans.insert(template.to_string(), Arc::clone(&plan));
        }
        plan
    }

    /// Change the capacity. Shrinking below the current population drops
    /// the cached plans (they re-enter on next use).
    pub fn set_capacity(&self, capacity: usize) {
        self.capacity.store(capacity, Ordering::Relaxed);
        let mut plans = self.plans.write();
        if plans.len() > capacity {
            plans.clear();
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.plans.read().len()
    }
}

impl Default for TemplateCache {
    fn default() -> Self {
        TemplateCache::new(DEFAULT_CACHE_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_returns_same_plan() {
        let cache = TemplateCache::new(8);
        let a = cache.get_or_parse("User {name}");
        let b = cache.get_or_parse("User {name}");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_full_cache_bypasses_new_entries() {
        let cache = TemplateCache::new(1);
        let first = cache.get_or_parse("one {a}");
        let _ = cache.get_or_parse("two {b}");
        assert_eq!(cache.len(), 1);
        // The cached template still hits.
        assert!(Arc::ptr_eq(&first, &cache.get_or_parse("one {a}")));
        // The bypassed one still parses correctly.
        assert_eq!(cache.get_or_parse("two {b}").placeholder_count(), 1);
    }

    #[test]
    fn test_zero_capacity_disables_cache() {
        let cache = TemplateCache::new(0);
        let _ = cache.get_or_parse("x {y}");
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_shrink_clears() {
        let cache = TemplateCache::new(8);
        cache.get_or_parse("a");
        cache.get_or_parse("b");
        cache.set_capacity(1);
        assert_eq!(cache.len(), 0);
    }
}

// Copyright (c) 2025 Mesa Research Ltd. All rights reserved.

//! Counters and distributions for model observability.
//!
//! Every stat is registered by name in a [`StatsRegistry`] exactly once, at
//! construction time. Models only ever call [`Counter::inc`] /
//! [`Counter::set`] / [`Distribution::sample`]; reporting tools read the
//! registry. The names are part of the device's external interface and must
//! stay stable.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::io;
use std::rc::Rc;

/// A scalar event counter.
#[derive(Default)]
pub struct Counter {
    value: Cell<u64>,
}

impl Counter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc(&self) {
        self.value.set(self.value.get() + 1);
    }

    pub fn add(&self, amount: u64) {
        self.value.set(self.value.get() + amount);
    }

    /// Overwrite the value. Used for gauge-like stats that track a level
    /// rather than a count.
    pub fn set(&self, value: u64) {
        self.value.set(value);
    }

    #[must_use]
    pub fn value(&self) -> u64 {
        self.value.get()
    }
}

/// A histogram of `u64` samples over fixed-width buckets.
///
/// Samples below `min` land in the underflow bucket and samples above `max`
/// in the overflow bucket, so no sample is ever lost.
pub struct Distribution {
    min: u64,
    max: u64,
    bucket_size: u64,
    buckets: RefCell<Vec<u64>>,
    underflow: Cell<u64>,
    overflow: Cell<u64>,
    count: Cell<u64>,
    sum: Cell<u64>,
    min_sample: Cell<Option<u64>>,
    max_sample: Cell<Option<u64>>,
}

impl Distribution {
    /// Create a distribution covering `min..=max` in buckets of
    /// `bucket_size`.
    ///
    /// **Panics** if the range is inverted or the bucket size is zero.
    #[must_use]
    pub fn new(min: u64, max: u64, bucket_size: u64) -> Self {
        assert!(max >= min, "Inverted distribution range");
        assert_ne!(bucket_size, 0, "Unsupported zero bucket size");
        let num_buckets = (max - min + 1).div_ceil(bucket_size) as usize;
        Self {
            min,
            max,
            bucket_size,
            buckets: RefCell::new(vec![0; num_buckets]),
            underflow: Cell::new(0),
            overflow: Cell::new(0),
            count: Cell::new(0),
            sum: Cell::new(0),
            min_sample: Cell::new(None),
            max_sample: Cell::new(None),
        }
    }

    pub fn sample(&self, value: u64) {
        if value < self.min {
            self.underflow.set(self.underflow.get() + 1);
        } else if value > self.max {
            self.overflow.set(self.overflow.get() + 1);
        } else {
            let index = ((value - self.min) / self.bucket_size) as usize;
            self.buckets.borrow_mut()[index] += 1;
        }

        self.count.set(self.count.get() + 1);
        self.sum.set(self.sum.get() + value);
        let new_min = self.min_sample.get().map_or(value, |m| m.min(value));
        self.min_sample.set(Some(new_min));
        let new_max = self.max_sample.get().map_or(value, |m| m.max(value));
        self.max_sample.set(Some(new_max));
    }

    #[must_use]
    pub fn count(&self) -> u64 {
        self.count.get()
    }

    #[must_use]
    pub fn sum(&self) -> u64 {
        self.sum.get()
    }

    #[must_use]
    pub fn mean(&self) -> f64 {
        if self.count.get() == 0 {
            0.0
        } else {
            self.sum.get() as f64 / self.count.get() as f64
        }
    }

    #[must_use]
    pub fn min_sample(&self) -> Option<u64> {
        self.min_sample.get()
    }

    #[must_use]
    pub fn max_sample(&self) -> Option<u64> {
        self.max_sample.get()
    }

    #[must_use]
    pub fn underflow(&self) -> u64 {
        self.underflow.get()
    }

    #[must_use]
    pub fn overflow(&self) -> u64 {
        self.overflow.get()
    }
}

/// A plain mapping from stat name to stat object.
///
/// Populated once when the models are constructed and read by reporting
/// tools afterwards.
#[derive(Default)]
pub struct StatsRegistry {
    counters: RefCell<BTreeMap<String, Rc<Counter>>>,
    distributions: RefCell<BTreeMap<String, Rc<Distribution>>>,
}

impl StatsRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and register a counter.
    ///
    /// **Panics** if the name is already taken.
    pub fn counter(&self, name: &str) -> Rc<Counter> {
        let counter = Rc::new(Counter::new());
        let previous = self
            .counters
            .borrow_mut()
            .insert(name.to_owned(), counter.clone());
        assert!(previous.is_none(), "Duplicate counter '{name}'");
        counter
    }

    /// Create and register a distribution.
    ///
    /// **Panics** if the name is already taken.
    pub fn distribution(&self, name: &str, min: u64, max: u64, bucket_size: u64) -> Rc<Distribution> {
        let dist = Rc::new(Distribution::new(min, max, bucket_size));
        let previous = self
            .distributions
            .borrow_mut()
            .insert(name.to_owned(), dist.clone());
        assert!(previous.is_none(), "Duplicate distribution '{name}'");
        dist
    }

    #[must_use]
    pub fn counter_named(&self, name: &str) -> Option<Rc<Counter>> {
        self.counters.borrow().get(name).cloned()
    }

    #[must_use]
    pub fn distribution_named(&self, name: &str) -> Option<Rc<Distribution>> {
        self.distributions.borrow().get(name).cloned()
    }

    /// Write a human-readable report of every registered stat.
    pub fn write_report(&self, writer: &mut dyn io::Write) -> io::Result<()> {
        for (name, counter) in self.counters.borrow().iter() {
            writeln!(writer, "{name}: {}", counter.value())?;
        }
        for (name, dist) in self.distributions.borrow().iter() {
            writeln!(
                writer,
                "{name}: count={} sum={} mean={:.2} min={:?} max={:?}",
                dist.count(),
                dist.sum(),
                dist.mean(),
                dist.min_sample(),
                dist.max_sample(),
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_counts() {
        let counter = Counter::new();
        counter.inc();
        counter.inc();
        counter.add(3);
        assert_eq!(counter.value(), 5);
        counter.set(1);
        assert_eq!(counter.value(), 1);
    }

    #[test]
    fn distribution_buckets() {
        let dist = Distribution::new(0, 49, 10);
        dist.sample(0);
        dist.sample(9);
        dist.sample(10);
        dist.sample(49);
        dist.sample(50);

        assert_eq!(dist.count(), 5);
        assert_eq!(dist.overflow(), 1);
        assert_eq!(dist.underflow(), 0);
        assert_eq!(dist.min_sample(), Some(0));
        assert_eq!(dist.max_sample(), Some(50));
        assert_eq!(*dist.buckets.borrow(), vec![2, 1, 0, 0, 1]);
    }

    #[test]
    fn distribution_underflow() {
        let dist = Distribution::new(10, 19, 5);
        dist.sample(3);
        assert_eq!(dist.underflow(), 1);
        assert_eq!(dist.count(), 1);
    }

    #[test]
    #[should_panic(expected = "Duplicate counter 'x'")]
    fn duplicate_counter_name() {
        let registry = StatsRegistry::new();
        let _a = registry.counter("x");
        let _b = registry.counter("x");
    }

    #[test]
    fn registry_lookup_and_report() {
        let registry = StatsRegistry::new();
        let counter = registry.counter("events");
        counter.inc();
        let dist = registry.distribution("lat", 0, 9, 1);
        dist.sample(4);

        assert_eq!(registry.counter_named("events").unwrap().value(), 1);
        assert_eq!(registry.distribution_named("lat").unwrap().count(), 1);
        assert!(registry.counter_named("missing").is_none());

        let mut out = Vec::new();
        registry.write_report(&mut out).unwrap();
        let report = String::from_utf8(out).unwrap();
        assert!(report.contains("events: 1"));
        assert!(report.contains("lat: count=1"));
    }
}

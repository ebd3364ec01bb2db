//! Single-writer running totals shared between stations.
//!
//! One station owns the [`Counter`] and adds to it; any number of stations
//! hold a [`CounterReader`] for the same cell and may gate on it. The control
//! loop is single-threaded, so the cell is not synchronized.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

/// Write handle. Not `Clone`: there is exactly one writer per counter.
pub struct Counter {
    name: String,
    value: Rc<Cell<u64>>,
}

impl Counter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: Rc::new(Cell::new(0)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self) -> u64 {
        self.value.get()
    }

    /// Totals only grow; gates built on a counter never close again.
    pub fn add(&self, amount: u64) {
        self.value.set(self.value.get().saturating_add(amount));
    }

    pub fn reader(&self) -> CounterReader {
        CounterReader {
            name: self.name.clone(),
            value: Rc::clone(&self.value),
        }
    }
}

impl fmt::Debug for Counter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Counter")
            .field("name", &self.name)
            .field("value", &self.get())
            .finish()
    }
}

/// Read-only view of a [`Counter`].
#[derive(Clone)]
pub struct CounterReader {
    name: String,
    value: Rc<Cell<u64>>,
}

impl CounterReader {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self) -> u64 {
        self.value.get()
    }
}

impl fmt::Debug for CounterReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CounterReader")
            .field("name", &self.name)
            .field("value", &self.get())
            .finish()
    }
}

/// Readiness precondition: open once the watched counter has grown by
/// `threshold` since the gate was armed.
///
/// A gate that is never re-armed measures from zero and, since counters only
/// grow, never closes again once open.
#[derive(Debug, Clone)]
pub struct Gate {
    reader: CounterReader,
    threshold: u64,
    baseline: u64,
}

impl Gate {
    pub fn new(reader: CounterReader, threshold: u64) -> Self {
        Self {
            reader,
            threshold,
            baseline: 0,
        }
    }

    pub fn is_open(&self) -> bool {
        self.reader.get().saturating_sub(self.baseline) >= self.threshold
    }

    /// Measure from the counter's current value.
    pub fn rearm(&mut self) {
        self.baseline = self.reader.get();
    }
}

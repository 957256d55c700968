//! Test doubles for the `Query` capability.
//!
//! `StubQuery` reports fixed predicate values and records every call made to
//! it, so schedulers built on this crate can assert on ingest fan-out and
//! predicate reads without a mocking framework.

use crate::query::{FieldFilter, Query};
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::sync::atomic::{AtomicUsize, Ordering};
use hashbrown::HashMap;
use triage_core::{Error, Record, Result, Value};

/// Predicate values of a stub query.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Flags {
    pub done: bool,
    pub rate_limited: bool,
    pub closed: bool,
    pub has_data: bool,
}

impl Flags {
    pub fn new(done: bool, rate_limited: bool, closed: bool, has_data: bool) -> Self {
        Self {
            done,
            rate_limited,
            closed,
            has_data,
        }
    }
}

/// How many times each predicate of a stub was read.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PredicateReads {
    pub done: usize,
    pub rate_limited: usize,
    pub closed: usize,
    pub has_data: usize,
}

impl PredicateReads {
    pub fn total(&self) -> usize {
        self.done + self.rate_limited + self.closed + self.has_data
    }
}

/// A query with fixed predicates that records every call made to it.
#[derive(Debug, Default)]
pub struct StubQuery {
    flags: Flags,
    /// Replaces `flags` on the first successful ingest.
    after_ingest: Option<Flags>,
    /// Returned by every `ingest` call when set.
    ingest_error: Option<Error>,
    /// Makes every `ingest` call panic.
    panics: bool,
    /// Equality filter reported through `FieldFilter`.
    filter: Option<(String, Value)>,
    ingested: Vec<Record>,
    attempts: usize,
    /// Thread of every `ingest` call, failed ones included.
    #[cfg(feature = "std")]
    ingest_threads: Vec<std::thread::ThreadId>,
    // Atomic so stubs stay `Sync` for parallel fan-out
    reads: [AtomicUsize; 4],
}

impl StubQuery {
    /// Creates a stub with the given `(done, rate_limited, closed, has_data)` flags.
    pub fn new(done: bool, rate_limited: bool, closed: bool, has_data: bool) -> Self {
        Self::with_flags(Flags::new(done, rate_limited, closed, has_data))
    }

    /// Creates a stub with every predicate false.
    pub fn idle() -> Self {
        Self::default()
    }

    pub fn with_flags(flags: Flags) -> Self {
        Self {
            flags,
            ..Self::default()
        }
    }

    /// Switches to the given flags once a record has been ingested.
    pub fn after_ingest(
        mut self,
        done: bool,
        rate_limited: bool,
        closed: bool,
        has_data: bool,
    ) -> Self {
        self.after_ingest = Some(Flags::new(done, rate_limited, closed, has_data));
        self
    }

    /// Makes every `ingest` call fail with `error`.
    pub fn failing(mut self, error: Error) -> Self {
        self.ingest_error = Some(error);
        self
    }

    /// Makes every `ingest` call panic with "stub ingest panicked".
    pub fn panicking(mut self) -> Self {
        self.panics = true;
        self
    }

    /// Reports an equality filter `field = value`.
    pub fn with_filter(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter = Some((field.into(), value.into()));
        self
    }

    /// Current predicate values.
    pub fn flags(&self) -> Flags {
        self.flags
    }

    /// Records applied successfully, in order.
    pub fn ingested(&self) -> &[Record] {
        &self.ingested
    }

    /// Number of records applied successfully.
    pub fn ingest_count(&self) -> usize {
        self.ingested.len()
    }

    /// Number of `ingest` calls, failed ones included.
    pub fn ingest_attempts(&self) -> usize {
        self.attempts
    }

    /// Thread of every `ingest` call, in order.
    #[cfg(feature = "std")]
    pub fn ingest_threads(&self) -> &[std::thread::ThreadId] {
        &self.ingest_threads
    }

    /// Predicate read counters.
    pub fn predicate_reads(&self) -> PredicateReads {
        let [done, rate_limited, closed, has_data] =
            [0, 1, 2, 3].map(|i| self.reads[i].load(Ordering::Relaxed));
        PredicateReads {
            done,
            rate_limited,
            closed,
            has_data,
        }
    }

    fn read(&self, slot: usize, value: bool) -> bool {
        self.reads[slot].fetch_add(1, Ordering::Relaxed);
        value
    }
}

impl Query for StubQuery {
    fn ingest(&mut self, record: &Record) -> Result<()> {
        self.attempts += 1;
        #[cfg(feature = "std")]
        self.ingest_threads.push(std::thread::current().id());
        if self.panics {
            panic!("stub ingest panicked");
        }
        if let Some(error) = &self.ingest_error {
            return Err(error.clone());
        }
        self.ingested.push(record.clone());
        if let Some(flags) = self.after_ingest.take() {
            self.flags = flags;
        }
        Ok(())
    }

    fn is_done(&self) -> bool {
        self.read(0, self.flags.done)
    }

    fn is_exceeding_rate_limit(&self) -> bool {
        self.read(1, self.flags.rate_limited)
    }

    fn is_closed(&self) -> bool {
        self.read(2, self.flags.closed)
    }

    fn has_new_data(&self) -> bool {
        self.read(3, self.flags.has_data)
    }
}

impl FieldFilter for StubQuery {
    fn equality_value(&self, field: &str) -> Option<Value> {
        match &self.filter {
            Some((name, value)) if name == field => Some(value.clone()),
            _ => None,
        }
    }
}

/// Keys queries by their position: `"0"`, `"1"`, ...
pub fn keyed<Q>(queries: impl IntoIterator<Item = Q>) -> HashMap<String, Q> {
    queries
        .into_iter()
        .enumerate()
        .map(|(i, query)| (i.to_string(), query))
        .collect()
}

//! The query capability consumed by the categorizer.
//!
//! A `Query` is a long-lived, stateful object representing one active
//! streaming computation. The engine feeds it records through `ingest` and
//! then reads four independent predicates to decide what to do with it.

use alloc::boxed::Box;
use triage_core::{Record, Result, Value};

/// One active streaming query.
///
/// The predicates are pure observers: they must not have side effects and
/// must reflect the state as of the most recent `ingest`. They must also stay
/// stable for the duration of one categorization call.
pub trait Query {
    /// Applies one record to the query's internal state.
    ///
    /// Whether ingesting into a query that is already done or closed is a
    /// no-op is up to the implementation; the categorizer always calls it.
    fn ingest(&mut self, record: &Record) -> Result<()>;

    /// The query has produced its final result and must be retired.
    fn is_done(&self) -> bool;

    /// The query has violated a throughput or resource quota.
    fn is_exceeding_rate_limit(&self) -> bool;

    /// The query's underlying window or channel was closed by the engine.
    fn is_closed(&self) -> bool;

    /// The query has a partial result ready to emit.
    fn has_new_data(&self) -> bool;
}

impl<Q: Query + ?Sized> Query for &mut Q {
    #[inline]
    fn ingest(&mut self, record: &Record) -> Result<()> {
        (**self).ingest(record)
    }

    #[inline]
    fn is_done(&self) -> bool {
        (**self).is_done()
    }

    #[inline]
    fn is_exceeding_rate_limit(&self) -> bool {
        (**self).is_exceeding_rate_limit()
    }

    #[inline]
    fn is_closed(&self) -> bool {
        (**self).is_closed()
    }

    #[inline]
    fn has_new_data(&self) -> bool {
        (**self).has_new_data()
    }
}

impl<Q: Query + ?Sized> Query for Box<Q> {
    #[inline]
    fn ingest(&mut self, record: &Record) -> Result<()> {
        (**self).ingest(record)
    }

    #[inline]
    fn is_done(&self) -> bool {
        (**self).is_done()
    }

    #[inline]
    fn is_exceeding_rate_limit(&self) -> bool {
        (**self).is_exceeding_rate_limit()
    }

    #[inline]
    fn is_closed(&self) -> bool {
        (**self).is_closed()
    }

    #[inline]
    fn has_new_data(&self) -> bool {
        (**self).has_new_data()
    }
}

/// Exposes a query's equality filter on a record field.
///
/// Used by `FieldPartitioner` to route records only to the queries that can
/// possibly match them.
pub trait FieldFilter {
    /// Returns the value this query requires `field` to equal, if any.
    fn equality_value(&self, field: &str) -> Option<Value>;
}

impl<F: FieldFilter + ?Sized> FieldFilter for Box<F> {
    fn equality_value(&self, field: &str) -> Option<Value> {
        (**self).equality_value(field)
    }
}

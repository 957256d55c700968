//! Record routing for `QueryManager`.
//!
//! A partitioner places each query into one or more partitions and maps each
//! record to the partitions it can affect. Only queries in those partitions
//! receive the record.

use crate::query::FieldFilter;
use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;
use triage_core::{Record, Value};

/// A partition of the query population.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum PartitionKey {
    /// Queries that must see every record.
    Any,
    /// Queries that only match records carrying this value.
    Value(Value),
}

/// Maps queries and records to partitions.
pub trait Partitioner<Q: ?Sized> {
    /// Partitions `query` lives in. Must be stable for the query's lifetime.
    fn query_keys(&self, query: &Q) -> Vec<PartitionKey>;

    /// Partitions whose queries must receive `record`.
    fn record_keys(&self, record: &Record) -> Vec<PartitionKey>;

    /// True if every record reaches every query, which lets the manager skip
    /// its partition index entirely.
    fn is_trivial(&self) -> bool {
        false
    }
}

/// Routes every record to every query.
#[derive(Clone, Copy, Debug, Default)]
pub struct AllQueries;

impl<Q: ?Sized> Partitioner<Q> for AllQueries {
    fn query_keys(&self, _query: &Q) -> Vec<PartitionKey> {
        vec![PartitionKey::Any]
    }

    fn record_keys(&self, _record: &Record) -> Vec<PartitionKey> {
        vec![PartitionKey::Any]
    }

    fn is_trivial(&self) -> bool {
        true
    }
}

/// Partitions on the value of one record field.
///
/// A query that filters `field = v` lives in `Value(v)`; any other query lives
/// in `Any`. A record reaches `Any` plus `Value(record[field])` when the field
/// is present.
#[derive(Clone, Debug)]
pub struct FieldPartitioner {
    field: String,
}

impl FieldPartitioner {
    /// Creates a partitioner on `field`.
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
        }
    }

    /// Returns the partitioning field.
    #[inline]
    pub fn field(&self) -> &str {
        &self.field
    }
}

impl<Q: FieldFilter + ?Sized> Partitioner<Q> for FieldPartitioner {
    fn query_keys(&self, query: &Q) -> Vec<PartitionKey> {
        match query.equality_value(&self.field) {
            Some(value) => vec![PartitionKey::Value(value)],
            None => vec![PartitionKey::Any],
        }
    }

    fn record_keys(&self, record: &Record) -> Vec<PartitionKey> {
        let mut keys = vec![PartitionKey::Any];
        if let Some(value) = record.get(&self.field) {
            keys.push(PartitionKey::Value(value.clone()));
        }
        keys
    }
}

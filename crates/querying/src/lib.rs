//! Triage Querying - Per-cycle ingestion and triage of active streaming queries.
//!
//! A streaming engine holds many concurrently active, stateful queries. For
//! each incoming record it feeds the record to every query, then sorts the
//! queries into action buckets so a scheduler can act on each one:
//!
//! - `done`: final result produced; emit and retire
//! - `rate_limited`: over quota; abort
//! - `closed`: underlying window or channel closed, or ingest failed
//! - `has_data`: partial result ready; emit and keep alive
//!
//! A query matching several predicates lands in exactly one bucket, chosen by
//! the fixed order `done > rate_limited > closed > has_data`. A query matching
//! none is left for the next cycle.
//!
//! # Core Concepts
//!
//! - `Query`: The capability a query object exposes (one mutator, four predicates)
//! - `Category`: The buckets and their priority order
//! - `Categorizer`: The stateless triage routine
//! - `Categorized`: The four disjoint buckets of one pass
//! - `QueryManager`: Owns the query population and routes records by partition
//!
//! # Example
//!
//! ```
//! use hashbrown::HashMap;
//! use triage_core::Record;
//! use triage_querying::testing::StubQuery;
//! use triage_querying::{Categorizer, QueryCollection};
//!
//! let mut queries: QueryCollection<u64, StubQuery> = HashMap::new();
//! queries.insert(1, StubQuery::new(false, true, false, true));
//! queries.insert(2, StubQuery::new(true, true, true, true));
//! queries.insert(3, StubQuery::new(false, false, true, true));
//!
//! let categorized = Categorizer::new().categorize_record(&Record::new(), &mut queries);
//! assert!(categorized.rate_limited().contains_key(&1u64));
//! assert!(categorized.done().contains_key(&2u64));
//! assert!(categorized.closed().contains_key(&3u64));
//! ```

#![no_std]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

pub mod categorized;
pub mod categorizer;
pub mod category;
pub mod manager;
#[cfg(feature = "std")]
pub mod parallel;
pub mod partition;
pub mod query;
pub mod testing;

pub use categorized::{Categorized, CategorizedKeys, CategoryCounts, IngestFailure};
pub use categorizer::{Categorizer, CategorizerConfig};
pub use category::Category;
pub use manager::QueryManager;
pub use partition::{AllQueries, FieldPartitioner, PartitionKey, Partitioner};
pub use query::{FieldFilter, Query};

// Re-export commonly used types from dependencies
pub use triage_core::{Error, Record, Result, Value};

/// Identifier-keyed collection of active queries, owned by the scheduler.
pub type QueryCollection<K, Q> = hashbrown::HashMap<K, Q>;

//! The triage routine.
//!
//! `Categorizer` feeds a record to a collection of queries and sorts the
//! queries into action buckets. It holds no state besides its configuration,
//! so one instance can serve every cycle.

use crate::categorized::Categorized;
use crate::category::Category;
use crate::query::Query;
use alloc::vec::Vec;
use core::hash::{BuildHasher, Hash};
use hashbrown::HashMap;
use triage_core::{Error, Record, Result};

/// Configuration for the categorizer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CategorizerConfig {
    /// Number of worker shards for parallel fan-out (default: 4)
    pub shards: usize,
    /// Collections smaller than this are ingested on the calling thread (default: 1024)
    pub min_parallel_queries: usize,
}

impl Default for CategorizerConfig {
    fn default() -> Self {
        Self {
            shards: 4,
            min_parallel_queries: 1024,
        }
    }
}

impl CategorizerConfig {
    /// Checks the configuration for values the categorizer cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.shards == 0 {
            return Err(Error::invalid_config("shards must be at least 1"));
        }
        Ok(())
    }
}

/// Sorts queries into `done`, `rate_limited`, `closed` and `has_data`.
///
/// # Example
///
/// ```
/// use hashbrown::HashMap;
/// use triage_core::Record;
/// use triage_querying::testing::StubQuery;
/// use triage_querying::Categorizer;
///
/// let mut queries = HashMap::new();
/// queries.insert("finished", StubQuery::new(true, false, false, false));
/// queries.insert("streaming", StubQuery::new(false, false, false, true));
/// queries.insert("idle", StubQuery::idle());
///
/// let categorizer = Categorizer::new();
/// let categorized = categorizer.categorize_record(&Record::new(), &mut queries);
///
/// assert!(categorized.done().contains_key(&"finished"));
/// assert!(categorized.has_data().contains_key(&"streaming"));
/// assert_eq!(categorized.category_of(&"idle"), None);
/// ```
#[derive(Clone, Debug, Default)]
pub struct Categorizer {
    pub(crate) config: CategorizerConfig,
}

impl Categorizer {
    /// Creates a categorizer with the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a categorizer with a custom configuration.
    pub fn with_config(config: CategorizerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Returns the configuration.
    #[inline]
    pub fn config(&self) -> &CategorizerConfig {
        &self.config
    }

    /// Categorizes every query of the collection without ingesting anything.
    pub fn categorize<'a, K, Q, S>(&self, queries: &'a HashMap<K, Q, S>) -> Categorized<'a, K, Q>
    where
        K: Eq + Hash,
        Q: Query,
        S: BuildHasher,
    {
        self.categorize_entries(queries.iter())
    }

    /// Categorizes the given `(key, query)` entries without ingesting anything.
    ///
    /// A key that appears more than once keeps the bucket it was first placed in.
    pub fn categorize_entries<'a, K, Q, I>(&self, entries: I) -> Categorized<'a, K, Q>
    where
        K: Eq + Hash + 'a,
        Q: Query + 'a,
        I: IntoIterator<Item = (&'a K, &'a Q)>,
    {
        let mut categorized = Categorized::new();
        for (key, query) in entries {
            if categorized.category_of(key).is_some() {
                tracing::warn!("query key repeated in one pass, keeping its first placement");
                continue;
            }
            if let Some(category) = Category::classify(query) {
                categorized.insert(category, key, query);
            }
        }
        log_counts(&categorized);
        categorized
    }

    /// Ingests `record` into every query of the collection, then categorizes them.
    ///
    /// A query whose `ingest` fails is placed in `closed` and reported in
    /// `Categorized::failures`; the remaining queries are unaffected.
    pub fn categorize_record<'a, K, Q, S>(
        &self,
        record: &Record,
        queries: &'a mut HashMap<K, Q, S>,
    ) -> Categorized<'a, K, Q>
    where
        K: Eq + Hash,
        Q: Query,
        S: BuildHasher,
    {
        self.categorize_record_entries(record, queries.iter_mut())
    }

    /// Ingests `record` into every given entry, then categorizes them.
    ///
    /// Every entry is ingested. A key that appears more than once keeps the
    /// bucket it was first placed in.
    pub fn categorize_record_entries<'a, K, Q, I>(
        &self,
        record: &Record,
        entries: I,
    ) -> Categorized<'a, K, Q>
    where
        K: Eq + Hash + 'a,
        Q: Query + 'a,
        I: IntoIterator<Item = (&'a K, &'a mut Q)>,
    {
        let categorized = ingest_and_classify(record, entries);
        log_counts(&categorized);
        categorized
    }
}

/// Feeds `record` to every entry, then classifies each one.
///
/// Every ingest completes before the first predicate is read.
pub(crate) fn ingest_and_classify<'a, K, Q, I>(
    record: &Record,
    entries: I,
) -> Categorized<'a, K, Q>
where
    K: Eq + Hash + 'a,
    Q: Query + 'a,
    I: IntoIterator<Item = (&'a K, &'a mut Q)>,
{
    let ingested: Vec<(&'a K, &'a Q, Result<()>)> = entries
        .into_iter()
        .map(|(key, query)| {
            let outcome = query.ingest(record);
            let query: &'a Q = query;
            (key, query, outcome)
        })
        .collect();

    let mut categorized = Categorized::new();
    for (key, query, outcome) in ingested {
        if categorized.category_of(key).is_some() {
            tracing::warn!("query key repeated in one pass, keeping its first placement");
            continue;
        }
        match outcome {
            Ok(()) => {
                if let Some(category) = Category::classify(query) {
                    categorized.insert(category, key, query);
                }
            }
            Err(error) => {
                tracing::warn!(%error, "query failed to ingest record, routing to closed");
                categorized.insert_failure(key, query, error);
            }
        }
    }
    categorized
}

fn log_counts<K: Eq + Hash, Q>(categorized: &Categorized<'_, K, Q>) {
    let counts = categorized.counts();
    tracing::debug!(
        done = counts.done,
        rate_limited = counts.rate_limited,
        closed = counts.closed,
        has_data = counts.has_data,
        failed = counts.failed,
        "categorized queries"
    );
}

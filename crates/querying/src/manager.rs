//! Query manager.
//!
//! This module provides `QueryManager` which owns the live query population
//! between cycles and routes each record to the queries that can be affected
//! by it.

use crate::categorized::{Categorized, CategorizedKeys};
use crate::categorizer::Categorizer;
use crate::partition::{AllQueries, PartitionKey, Partitioner};
use crate::query::Query;
use alloc::string::ToString;
use alloc::vec::Vec;
use core::fmt;
use core::hash::Hash;
use hashbrown::{HashMap, HashSet};
use triage_core::{Error, Record, Result};

/// Owns the active queries and runs triage cycles over them.
///
/// The manager keeps a mapping from partition to the keys of the queries
/// living in it. When a record arrives, only the queries in the partitions
/// the record maps to are ingested and categorized.
///
/// # Example
///
/// ```
/// use triage_core::Record;
/// use triage_querying::testing::StubQuery;
/// use triage_querying::QueryManager;
///
/// let mut manager = QueryManager::new();
/// manager.add_query("q-1".to_string(), StubQuery::new(true, false, false, false)).unwrap();
/// manager.add_query("q-2".to_string(), StubQuery::new(false, false, false, true)).unwrap();
///
/// let keys = manager.categorize(&Record::new()).into_keys();
/// assert_eq!(keys.done(), &["q-1".to_string()]);
///
/// // Done, rate limited and closed queries leave the live set
/// let retired = manager.retire(&keys);
/// assert_eq!(retired.len(), 1);
/// assert_eq!(manager.len(), 1);
/// ```
pub struct QueryManager<K, Q, P = AllQueries> {
    /// Query key -> query
    queries: HashMap<K, Q>,
    /// Partition -> keys of the queries living in it
    partitions: HashMap<PartitionKey, HashSet<K>>,
    /// Query key -> partitions it lives in (for removal)
    query_partitions: HashMap<K, Vec<PartitionKey>>,
    partitioner: P,
    categorizer: Categorizer,
}

impl<K, Q> Default for QueryManager<K, Q, AllQueries>
where
    K: Eq + Hash + Clone + fmt::Display,
    Q: Query,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, Q> QueryManager<K, Q, AllQueries>
where
    K: Eq + Hash + Clone + fmt::Display,
    Q: Query,
{
    /// Creates a manager that routes every record to every query.
    pub fn new() -> Self {
        Self::with_partitioner(AllQueries)
    }
}

impl<K, Q, P> QueryManager<K, Q, P>
where
    K: Eq + Hash + Clone + fmt::Display,
    Q: Query,
    P: Partitioner<Q>,
{
    /// Creates a manager routing records with `partitioner`.
    pub fn with_partitioner(partitioner: P) -> Self {
        Self {
            queries: HashMap::new(),
            partitions: HashMap::new(),
            query_partitions: HashMap::new(),
            partitioner,
            categorizer: Categorizer::new(),
        }
    }

    /// Replaces the categorizer used for each cycle.
    pub fn with_categorizer(mut self, categorizer: Categorizer) -> Self {
        self.categorizer = categorizer;
        self
    }

    /// Registers a query under `key`.
    ///
    /// Fails without modifying the manager if the key is already taken.
    pub fn add_query(&mut self, key: K, query: Q) -> Result<()> {
        if self.queries.contains_key(&key) {
            return Err(Error::duplicate_query(key.to_string()));
        }

        if !self.partitioner.is_trivial() {
            let partitions = self.partitioner.query_keys(&query);
            for partition in &partitions {
                self.partitions
                    .entry(partition.clone())
                    .or_default()
                    .insert(key.clone());
            }
            self.query_partitions.insert(key.clone(), partitions);
        }

        tracing::trace!(%key, "query registered");
        self.queries.insert(key, query);
        Ok(())
    }

    /// Unregisters a query and returns it.
    pub fn remove_query(&mut self, key: &K) -> Option<Q> {
        let query = self.queries.remove(key)?;

        if let Some(partitions) = self.query_partitions.remove(key) {
            for partition in partitions {
                if let Some(keys) = self.partitions.get_mut(&partition) {
                    keys.remove(key);
                    if keys.is_empty() {
                        self.partitions.remove(&partition);
                    }
                }
            }
        }

        tracing::trace!(%key, "query removed");
        Some(query)
    }

    /// Unregisters every query in `keys` and returns the ones that existed.
    pub fn remove_queries<'k, I>(&mut self, keys: I) -> Vec<(K, Q)>
    where
        I: IntoIterator<Item = &'k K>,
        K: 'k,
    {
        keys.into_iter()
            .filter_map(|key| self.remove_query(key).map(|query| (key.clone(), query)))
            .collect()
    }

    /// Removes the queries that leave the live set after a cycle: every
    /// query in `done`, `rate_limited` and `closed`. `has_data` stays.
    pub fn retire(&mut self, keys: &CategorizedKeys<K>) -> Vec<(K, Q)> {
        self.remove_queries(keys.retiring())
    }

    /// Returns the query registered under `key`.
    pub fn get_query(&self, key: &K) -> Result<&Q> {
        self.queries
            .get(key)
            .ok_or_else(|| Error::query_not_found(key.to_string()))
    }

    /// Returns the query registered under `key` for mutation.
    pub fn get_query_mut(&mut self, key: &K) -> Result<&mut Q> {
        self.queries
            .get_mut(key)
            .ok_or_else(|| Error::query_not_found(key.to_string()))
    }

    /// Returns true if a query is registered under `key`.
    #[inline]
    pub fn has_query(&self, key: &K) -> bool {
        self.queries.contains_key(key)
    }

    /// Returns the number of registered queries.
    #[inline]
    pub fn len(&self) -> usize {
        self.queries.len()
    }

    /// Returns true if there are no registered queries.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    /// Iterates over the registered keys.
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.queries.keys()
    }

    /// Returns the number of queries in each partition.
    pub fn partition_stats(&self) -> Vec<(PartitionKey, usize)> {
        if self.partitioner.is_trivial() {
            if self.queries.is_empty() {
                return Vec::new();
            }
            return alloc::vec![(PartitionKey::Any, self.queries.len())];
        }
        self.partitions
            .iter()
            .map(|(partition, keys)| (partition.clone(), keys.len()))
            .collect()
    }

    /// Categorizes every registered query without ingesting anything.
    pub fn categorize_all(&self) -> Categorized<'_, K, Q> {
        self.categorizer.categorize(&self.queries)
    }

    /// Ingests `record` into the queries it can affect, then categorizes them.
    ///
    /// Queries in partitions the record does not map to are neither ingested
    /// nor categorized.
    pub fn categorize(&mut self, record: &Record) -> Categorized<'_, K, Q> {
        let entries = Self::routed(&mut self.queries, &self.partitions, &self.partitioner, record);
        self.categorizer.categorize_record_entries(record, entries)
    }

    /// Unregisters every query.
    pub fn clear(&mut self) {
        self.queries.clear();
        self.partitions.clear();
        self.query_partitions.clear();
    }

    /// Picks the queries `record` is routed to.
    fn routed<'q>(
        queries: &'q mut HashMap<K, Q>,
        partitions: &HashMap<PartitionKey, HashSet<K>>,
        partitioner: &P,
        record: &Record,
    ) -> Vec<(&'q K, &'q mut Q)> {
        if partitioner.is_trivial() {
            return queries.iter_mut().collect();
        }

        let mut relevant: HashSet<&K> = HashSet::new();
        for partition in partitioner.record_keys(record) {
            if let Some(keys) = partitions.get(&partition) {
                relevant.extend(keys.iter());
            }
        }

        if relevant.len() == queries.len() {
            return queries.iter_mut().collect();
        }
        queries
            .iter_mut()
            .filter(|(key, _)| relevant.contains(*key))
            .collect()
    }
}

#[cfg(feature = "std")]
impl<K, Q, P> QueryManager<K, Q, P>
where
    K: Eq + Hash + Clone + fmt::Display + Sync,
    Q: Query + Send + Sync,
    P: Partitioner<Q>,
{
    /// Same as `categorize`, with ingestion spread over the categorizer's
    /// worker shards once enough queries are routed.
    pub fn categorize_parallel(&mut self, record: &Record) -> Categorized<'_, K, Q> {
        let entries = Self::routed(&mut self.queries, &self.partitions, &self.partitioner, record);
        self.categorizer
            .categorize_record_entries_parallel(record, entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::category::Category;
    use crate::partition::FieldPartitioner;
    use crate::testing::StubQuery;
    use alloc::string::String;
    use alloc::vec;
    use triage_core::Value;

    fn key(s: &str) -> String {
        s.to_string()
    }

    #[test]
    fn test_query_manager_new() {
        let manager: QueryManager<String, StubQuery> = QueryManager::new();
        assert!(manager.is_empty());
        assert_eq!(manager.len(), 0);
        assert!(manager.partition_stats().is_empty());
    }

    #[test]
    fn test_add_query() {
        let mut manager = QueryManager::new();
        manager.add_query(key("a"), StubQuery::idle()).unwrap();

        assert_eq!(manager.len(), 1);
        assert!(manager.has_query(&key("a")));
        assert!(manager.get_query(&key("a")).is_ok());
        assert_eq!(manager.partition_stats(), vec![(PartitionKey::Any, 1)]);
    }

    #[test]
    fn test_add_duplicate_query() {
        let mut manager = QueryManager::new();
        manager
            .add_query(key("a"), StubQuery::new(true, false, false, false))
            .unwrap();

        let err = manager.add_query(key("a"), StubQuery::idle()).unwrap_err();
        assert_eq!(err, Error::duplicate_query("a"));

        // Original query untouched
        assert_eq!(manager.len(), 1);
        assert!(manager.get_query(&key("a")).unwrap().flags().done);
    }

    #[test]
    fn test_remove_query() {
        let mut manager = QueryManager::new();
        manager.add_query(key("a"), StubQuery::idle()).unwrap();

        assert!(manager.remove_query(&key("a")).is_some());
        assert!(manager.remove_query(&key("a")).is_none());
        assert!(manager.is_empty());
    }

    #[test]
    fn test_get_missing_query() {
        let mut manager: QueryManager<String, StubQuery> = QueryManager::new();
        assert_eq!(
            manager.get_query(&key("missing")).unwrap_err(),
            Error::query_not_found("missing")
        );
        assert!(manager.get_query_mut(&key("missing")).is_err());
    }

    #[test]
    fn test_remove_queries() {
        let mut manager = QueryManager::new();
        manager.add_query(key("a"), StubQuery::idle()).unwrap();
        manager.add_query(key("b"), StubQuery::idle()).unwrap();
        manager.add_query(key("c"), StubQuery::idle()).unwrap();

        let wanted = vec![key("a"), key("c"), key("zzz")];
        let mut removed: Vec<String> = manager
            .remove_queries(&wanted)
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        removed.sort();

        assert_eq!(removed, vec![key("a"), key("c")]);
        assert_eq!(manager.len(), 1);
        assert!(manager.has_query(&key("b")));
    }

    #[test]
    fn test_categorize_all_does_not_ingest() {
        let mut manager = QueryManager::new();
        manager
            .add_query(key("done"), StubQuery::new(true, false, false, false))
            .unwrap();
        manager.add_query(key("idle"), StubQuery::idle()).unwrap();

        let categorized = manager.categorize_all();
        assert_eq!(categorized.category_of(&key("done")), Some(Category::Done));
        assert_eq!(categorized.category_of(&key("idle")), None);
        drop(categorized);

        assert_eq!(manager.get_query(&key("done")).unwrap().ingest_count(), 0);
    }

    #[test]
    fn test_categorize_ingests_every_query() {
        let mut manager = QueryManager::new();
        manager
            .add_query(key("done"), StubQuery::new(true, false, false, false))
            .unwrap();
        manager
            .add_query(key("data"), StubQuery::new(false, false, false, true))
            .unwrap();
        manager.add_query(key("idle"), StubQuery::idle()).unwrap();

        let record = Record::new().with_field("x", 1i64);
        let keys = manager.categorize(&record).into_keys();

        assert_eq!(keys.done(), &[key("done")]);
        assert_eq!(keys.has_data(), &[key("data")]);
        for k in ["done", "data", "idle"] {
            assert_eq!(manager.get_query(&key(k)).unwrap().ingest_count(), 1);
        }
    }

    #[test]
    fn test_retire() {
        let mut manager = QueryManager::new();
        manager
            .add_query(key("done"), StubQuery::new(true, false, false, false))
            .unwrap();
        manager
            .add_query(key("limited"), StubQuery::new(false, true, false, false))
            .unwrap();
        manager
            .add_query(key("closed"), StubQuery::new(false, false, true, false))
            .unwrap();
        manager
            .add_query(key("data"), StubQuery::new(false, false, false, true))
            .unwrap();
        manager.add_query(key("idle"), StubQuery::idle()).unwrap();

        let keys = manager.categorize(&Record::new()).into_keys();
        let mut retired: Vec<String> =
            manager.retire(&keys).into_iter().map(|(k, _)| k).collect();
        retired.sort();

        assert_eq!(retired, vec![key("closed"), key("done"), key("limited")]);
        assert_eq!(manager.len(), 2);
        assert!(manager.has_query(&key("data")));
        assert!(manager.has_query(&key("idle")));
    }

    #[test]
    fn test_failed_ingest_is_retired() {
        let mut manager = QueryManager::new();
        manager
            .add_query(
                key("broken"),
                StubQuery::new(false, false, false, true).failing(Error::ingest_failed("bad")),
            )
            .unwrap();
        manager
            .add_query(key("data"), StubQuery::new(false, false, false, true))
            .unwrap();

        let keys = manager.categorize(&Record::new()).into_keys();
        assert_eq!(keys.closed(), &[key("broken")]);
        assert_eq!(keys.failures().len(), 1);

        manager.retire(&keys);
        assert!(!manager.has_query(&key("broken")));
        assert!(manager.has_query(&key("data")));
    }

    #[test]
    fn test_field_partition_routing() {
        let mut manager = QueryManager::with_partitioner(FieldPartitioner::new("region"));
        let streaming = || StubQuery::new(false, false, false, true);
        manager
            .add_query(key("eu"), streaming().with_filter("region", "eu"))
            .unwrap();
        manager
            .add_query(key("us"), streaming().with_filter("region", "us"))
            .unwrap();
        manager
            .add_query(key("all"), StubQuery::new(false, false, false, true))
            .unwrap();

        let record = Record::new().with_field("region", "eu");
        let keys = manager.categorize(&record).into_keys();

        let mut has_data = keys.has_data().to_vec();
        has_data.sort();
        assert_eq!(has_data, vec![key("all"), key("eu")]);

        assert_eq!(manager.get_query(&key("eu")).unwrap().ingest_count(), 1);
        assert_eq!(manager.get_query(&key("us")).unwrap().ingest_count(), 0);
        assert_eq!(manager.get_query(&key("all")).unwrap().ingest_count(), 1);
    }

    #[test]
    fn test_field_partition_record_without_field() {
        let mut manager = QueryManager::with_partitioner(FieldPartitioner::new("region"));
        manager
            .add_query(key("eu"), StubQuery::idle().with_filter("region", "eu"))
            .unwrap();
        manager.add_query(key("all"), StubQuery::idle()).unwrap();

        manager.categorize(&Record::new().with_field("host", "h1"));

        assert_eq!(manager.get_query(&key("eu")).unwrap().ingest_count(), 0);
        assert_eq!(manager.get_query(&key("all")).unwrap().ingest_count(), 1);
    }

    #[test]
    fn test_partition_stats_and_cleanup() {
        let mut manager = QueryManager::with_partitioner(FieldPartitioner::new("region"));
        manager
            .add_query(key("eu-1"), StubQuery::idle().with_filter("region", "eu"))
            .unwrap();
        manager
            .add_query(key("eu-2"), StubQuery::idle().with_filter("region", "eu"))
            .unwrap();
        manager.add_query(key("all"), StubQuery::idle()).unwrap();

        let mut stats = manager.partition_stats();
        stats.sort_by_key(|(_, count)| *count);
        assert_eq!(
            stats,
            vec![
                (PartitionKey::Any, 1),
                (PartitionKey::Value(Value::from("eu")), 2),
            ]
        );

        manager.remove_query(&key("eu-1"));
        manager.remove_query(&key("eu-2"));

        // Empty partitions are dropped
        assert_eq!(manager.partition_stats(), vec![(PartitionKey::Any, 1)]);
    }

    #[test]
    fn test_clear() {
        let mut manager = QueryManager::with_partitioner(FieldPartitioner::new("region"));
        manager
            .add_query(key("eu"), StubQuery::idle().with_filter("region", "eu"))
            .unwrap();
        manager.add_query(key("all"), StubQuery::idle()).unwrap();

        manager.clear();

        assert!(manager.is_empty());
        assert!(manager.partition_stats().is_empty());
    }

    #[cfg(feature = "std")]
    #[test]
    fn test_with_categorizer_spreads_ingest() {
        use crate::categorizer::CategorizerConfig;

        let categorizer = Categorizer::with_config(CategorizerConfig {
            shards: 8,
            min_parallel_queries: 1,
        })
        .unwrap();
        let mut manager = QueryManager::new().with_categorizer(categorizer);
        for i in 0..50 {
            manager
                .add_query(i.to_string(), StubQuery::new(false, false, false, true))
                .unwrap();
        }

        let categorized = manager.categorize_parallel(&Record::new());
        assert_eq!(categorized.has_data().len(), 50);
        drop(categorized);

        let caller = std::thread::current().id();
        for k in manager.keys().cloned().collect::<Vec<_>>() {
            let threads = manager.get_query(&k).unwrap().ingest_threads();
            assert_eq!(threads.len(), 1);
            assert_ne!(threads[0], caller, "query {} ingested on the caller", k);
        }
    }

    #[cfg(feature = "std")]
    #[test]
    fn test_default_categorizer_stays_on_caller() {
        let mut manager = QueryManager::new();
        for i in 0..50 {
            manager.add_query(i.to_string(), StubQuery::idle()).unwrap();
        }

        manager.categorize_parallel(&Record::new());

        let caller = std::thread::current().id();
        for k in manager.keys() {
            assert_eq!(manager.get_query(k).unwrap().ingest_threads(), &[caller]);
        }
    }

    #[cfg(feature = "std")]
    #[test]
    fn test_categorize_parallel_routes_by_partition() {
        use crate::categorizer::CategorizerConfig;

        let categorizer = Categorizer::with_config(CategorizerConfig {
            shards: 4,
            min_parallel_queries: 1,
        })
        .unwrap();
        let mut manager = QueryManager::with_partitioner(FieldPartitioner::new("region"))
            .with_categorizer(categorizer);
        for i in 0..20 {
            let region = if i % 2 == 0 { "eu" } else { "us" };
            let query = StubQuery::new(false, false, false, true).with_filter("region", region);
            manager.add_query(i.to_string(), query).unwrap();
        }

        let record = Record::new().with_field("region", "eu");
        assert_eq!(manager.categorize_parallel(&record).has_data().len(), 10);

        for i in 0..20 {
            let expected = if i % 2 == 0 { 1 } else { 0 };
            let query = manager.get_query(&i.to_string()).unwrap();
            assert_eq!(query.ingest_count(), expected, "query {}", i);
        }
    }
}

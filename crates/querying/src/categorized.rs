//! Result of one categorization pass.
//!
//! `Categorized` holds four disjoint mappings, one per `Category`, borrowing
//! keys and queries from the collection that was categorized. It is built
//! fresh on every call and is meant to be consumed within the same cycle.

use crate::category::Category;
use alloc::vec::Vec;
use core::hash::Hash;
use hashbrown::HashMap;
use triage_core::Error;

/// A query whose `ingest` returned an error during a categorization pass.
#[derive(Debug)]
pub struct IngestFailure<'a, K> {
    /// Key of the failing query.
    pub key: &'a K,
    /// The error returned by `ingest`.
    pub error: Error,
}

/// Per-bucket counts of a categorization pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CategoryCounts {
    pub done: usize,
    pub rate_limited: usize,
    pub closed: usize,
    pub has_data: usize,
    /// Queries whose ingest failed. These are also counted in `closed`.
    pub failed: usize,
}

impl CategoryCounts {
    /// Number of queries placed in any bucket.
    pub fn total(&self) -> usize {
        self.done + self.rate_limited + self.closed + self.has_data
    }
}

/// Four disjoint buckets of queries, keyed by query key.
///
/// A key appears in at most one bucket. A key of the input collection that
/// appears in none had every predicate false and is left for the next cycle.
#[derive(Debug)]
pub struct Categorized<'a, K, Q> {
    /// Indexed by `Category::index`.
    buckets: [HashMap<&'a K, &'a Q>; 4],
    failures: Vec<IngestFailure<'a, K>>,
}

impl<'a, K, Q> Default for Categorized<'a, K, Q> {
    fn default() -> Self {
        Self {
            buckets: [HashMap::new(), HashMap::new(), HashMap::new(), HashMap::new()],
            failures: Vec::new(),
        }
    }
}

impl<'a, K: Eq + Hash, Q> Categorized<'a, K, Q> {
    /// Creates an empty result.
    pub fn new() -> Self {
        Self::default()
    }

    /// Places a query into `category`.
    ///
    /// Returns false and leaves the result unchanged if `key` is already in
    /// a bucket, so a repeated key keeps its first placement.
    pub(crate) fn insert(&mut self, category: Category, key: &'a K, query: &'a Q) -> bool {
        if self.category_of(key).is_some() {
            return false;
        }
        self.buckets[category.index()].insert(key, query);
        true
    }

    /// Routes a query whose ingest failed to `closed` and remembers the error.
    pub(crate) fn insert_failure(&mut self, key: &'a K, query: &'a Q, error: Error) -> bool {
        if !self.insert(Category::Closed, key, query) {
            return false;
        }
        self.failures.push(IngestFailure { key, error });
        true
    }

    /// Folds a partial result into this one. Keys already placed here win.
    pub(crate) fn merge(&mut self, other: Self) {
        let Categorized {
            mut buckets,
            failures,
        } = other;
        for failure in failures {
            if let Some(query) = buckets[Category::Closed.index()].remove(failure.key) {
                self.insert_failure(failure.key, query, failure.error);
            }
        }
        for category in Category::PRIORITY {
            for (key, query) in core::mem::take(&mut buckets[category.index()]) {
                self.insert(category, key, query);
            }
        }
    }

    /// Queries that produced their final result.
    #[inline]
    pub fn done(&self) -> &HashMap<&'a K, &'a Q> {
        self.bucket(Category::Done)
    }

    /// Live queries that exceeded their quota.
    #[inline]
    pub fn rate_limited(&self) -> &HashMap<&'a K, &'a Q> {
        self.bucket(Category::RateLimited)
    }

    /// Queries whose underlying resource was closed, or whose ingest failed.
    #[inline]
    pub fn closed(&self) -> &HashMap<&'a K, &'a Q> {
        self.bucket(Category::Closed)
    }

    /// Queries with a partial result ready to emit.
    #[inline]
    pub fn has_data(&self) -> &HashMap<&'a K, &'a Q> {
        self.bucket(Category::HasData)
    }

    /// Returns the bucket for `category`.
    #[inline]
    pub fn bucket(&self, category: Category) -> &HashMap<&'a K, &'a Q> {
        &self.buckets[category.index()]
    }

    /// Returns the bucket `key` was placed in, if any.
    pub fn category_of(&self, key: &K) -> Option<Category> {
        Category::PRIORITY
            .iter()
            .copied()
            .find(|category| self.buckets[category.index()].contains_key(key))
    }

    /// Ingest failures recorded during this pass.
    #[inline]
    pub fn failures(&self) -> &[IngestFailure<'a, K>] {
        &self.failures
    }

    /// Returns per-bucket counts.
    pub fn counts(&self) -> CategoryCounts {
        CategoryCounts {
            done: self.done().len(),
            rate_limited: self.rate_limited().len(),
            closed: self.closed().len(),
            has_data: self.has_data().len(),
            failed: self.failures.len(),
        }
    }

    /// Number of queries placed in any bucket.
    pub fn len(&self) -> usize {
        self.buckets.iter().map(HashMap::len).sum()
    }

    /// Returns true if no query was placed in any bucket.
    pub fn is_empty(&self) -> bool {
        self.buckets.iter().all(HashMap::is_empty)
    }

    /// Iterates over every categorized query with its bucket.
    pub fn iter(&self) -> impl Iterator<Item = (Category, &'a K, &'a Q)> + '_ {
        Category::PRIORITY.iter().flat_map(move |&category| {
            self.buckets[category.index()]
                .iter()
                .map(move |(&key, &query)| (category, key, query))
        })
    }

    /// Copies the keys out, releasing the borrow on the query collection.
    pub fn into_keys(self) -> CategorizedKeys<K>
    where
        K: Clone,
    {
        let Categorized { buckets, failures } = self;
        let [done, rate_limited, closed, has_data] =
            buckets.map(|bucket| bucket.into_keys().cloned().collect::<Vec<K>>());
        CategorizedKeys {
            done,
            rate_limited,
            closed,
            has_data,
            failures: failures
                .into_iter()
                .map(|failure| (failure.key.clone(), failure.error))
                .collect(),
        }
    }
}

/// Owned keys of a categorization pass.
///
/// Lets the owner of the collection remove or update queries once the
/// borrowing `Categorized` is gone.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CategorizedKeys<K> {
    done: Vec<K>,
    rate_limited: Vec<K>,
    closed: Vec<K>,
    has_data: Vec<K>,
    failures: Vec<(K, Error)>,
}

impl<K> CategorizedKeys<K> {
    #[inline]
    pub fn done(&self) -> &[K] {
        &self.done
    }

    #[inline]
    pub fn rate_limited(&self) -> &[K] {
        &self.rate_limited
    }

    #[inline]
    pub fn closed(&self) -> &[K] {
        &self.closed
    }

    #[inline]
    pub fn has_data(&self) -> &[K] {
        &self.has_data
    }

    /// Returns the keys of `category`.
    pub fn bucket(&self, category: Category) -> &[K] {
        match category {
            Category::Done => &self.done,
            Category::RateLimited => &self.rate_limited,
            Category::Closed => &self.closed,
            Category::HasData => &self.has_data,
        }
    }

    /// Keys of queries whose ingest failed, with the error.
    #[inline]
    pub fn failures(&self) -> &[(K, Error)] {
        &self.failures
    }

    /// Keys of every query that leaves the live set: done, rate limited or closed.
    pub fn retiring(&self) -> impl Iterator<Item = &K> {
        self.done
            .iter()
            .chain(self.rate_limited.iter())
            .chain(self.closed.iter())
    }

    /// Returns true if no key was categorized.
    pub fn is_empty(&self) -> bool {
        self.done.is_empty()
            && self.rate_limited.is_empty()
            && self.closed.is_empty()
            && self.has_data.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::{String, ToString};
    use alloc::vec;

    fn key(i: usize) -> String {
        i.to_string()
    }

    #[test]
    fn test_categorized_new() {
        let categorized: Categorized<'_, String, u32> = Categorized::new();
        assert!(categorized.is_empty());
        assert_eq!(categorized.len(), 0);
        assert_eq!(categorized.counts(), CategoryCounts::default());
    }

    #[test]
    fn test_insert_and_lookup() {
        let keys = vec![key(0), key(1), key(2)];
        let queries = vec![10u32, 11, 12];

        let mut categorized = Categorized::new();
        categorized.insert(Category::Done, &keys[0], &queries[0]);
        categorized.insert(Category::HasData, &keys[1], &queries[1]);

        assert_eq!(categorized.len(), 2);
        assert_eq!(categorized.done().get(&key(0)), Some(&&10));
        assert_eq!(categorized.category_of(&key(0)), Some(Category::Done));
        assert_eq!(categorized.category_of(&key(1)), Some(Category::HasData));
        assert_eq!(categorized.category_of(&key(2)), None);
    }

    #[test]
    fn test_insert_failure_routes_to_closed() {
        let k = key(7);
        let q = 0u32;

        let mut categorized = Categorized::new();
        categorized.insert_failure(&k, &q, Error::ingest_failed("bad record"));

        assert!(categorized.closed().contains_key(&k));
        assert_eq!(categorized.failures().len(), 1);
        assert_eq!(categorized.failures()[0].key, &k);

        let counts = categorized.counts();
        assert_eq!(counts.closed, 1);
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.total(), 1);
    }

    #[test]
    fn test_merge_disjoint() {
        let keys = vec![key(0), key(1), key(2)];
        let queries = vec![0u32, 1, 2];

        let mut left = Categorized::new();
        left.insert(Category::Done, &keys[0], &queries[0]);

        let mut right = Categorized::new();
        right.insert(Category::Done, &keys[1], &queries[1]);
        right.insert_failure(&keys[2], &queries[2], Error::ingest_failed("x"));

        left.merge(right);
        assert_eq!(left.done().len(), 2);
        assert_eq!(left.closed().len(), 1);
        assert_eq!(left.failures().len(), 1);
    }

    #[test]
    fn test_insert_repeated_key_keeps_first() {
        let k = key(0);
        let queries = vec![0u32, 1];

        let mut categorized = Categorized::new();
        assert!(categorized.insert(Category::Done, &k, &queries[0]));
        assert!(!categorized.insert(Category::HasData, &k, &queries[1]));
        assert!(!categorized.insert_failure(&k, &queries[1], Error::ingest_failed("x")));

        assert_eq!(categorized.len(), 1);
        assert_eq!(categorized.category_of(&k), Some(Category::Done));
        assert_eq!(categorized.done().get(&k), Some(&&0));
        assert!(categorized.failures().is_empty());
    }

    #[test]
    fn test_merge_overlapping_keys() {
        let keys = vec![key(0), key(1)];
        let queries = vec![0u32, 1, 2];

        let mut left = Categorized::new();
        left.insert(Category::RateLimited, &keys[0], &queries[0]);

        let mut right = Categorized::new();
        right.insert_failure(&keys[0], &queries[1], Error::ingest_failed("x"));
        right.insert(Category::HasData, &keys[1], &queries[2]);

        left.merge(right);
        assert_eq!(left.category_of(&keys[0]), Some(Category::RateLimited));
        assert_eq!(left.category_of(&keys[1]), Some(Category::HasData));
        assert_eq!(left.len(), 2);
        assert!(left.failures().is_empty());
    }

    #[test]
    fn test_iter_visits_every_entry() {
        let keys = vec![key(0), key(1), key(2), key(3)];
        let queries = vec![0u32, 1, 2, 3];

        let mut categorized = Categorized::new();
        for (i, category) in Category::PRIORITY.iter().enumerate() {
            categorized.insert(*category, &keys[i], &queries[i]);
        }

        let mut seen: Vec<(Category, u32)> = categorized.iter().map(|(c, _, q)| (c, *q)).collect();
        seen.sort_by_key(|(_, q)| *q);
        assert_eq!(
            seen,
            vec![
                (Category::Done, 0),
                (Category::RateLimited, 1),
                (Category::Closed, 2),
                (Category::HasData, 3),
            ]
        );
    }

    #[test]
    fn test_into_keys() {
        let keys = vec![key(0), key(1), key(2), key(3)];
        let queries = vec![0u32, 1, 2, 3];

        let mut categorized = Categorized::new();
        categorized.insert(Category::Done, &keys[0], &queries[0]);
        categorized.insert(Category::RateLimited, &keys[1], &queries[1]);
        categorized.insert_failure(&keys[2], &queries[2], Error::ingest_failed("x"));
        categorized.insert(Category::HasData, &keys[3], &queries[3]);

        let owned = categorized.into_keys();
        assert_eq!(owned.done(), &[key(0)]);
        assert_eq!(owned.rate_limited(), &[key(1)]);
        assert_eq!(owned.closed(), &[key(2)]);
        assert_eq!(owned.has_data(), &[key(3)]);
        assert_eq!(owned.bucket(Category::HasData), &[key(3)]);
        assert_eq!(owned.failures().len(), 1);
        assert_eq!(owned.failures()[0].0, key(2));

        let mut retiring: Vec<&String> = owned.retiring().collect();
        retiring.sort();
        assert_eq!(retiring, vec![&key(0), &key(1), &key(2)]);
        assert!(!owned.is_empty());
    }
}

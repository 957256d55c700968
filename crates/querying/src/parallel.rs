//! Parallel ingest fan-out.
//!
//! Large query populations are split into disjoint shards. Each shard is
//! ingested and classified on its own scoped thread into a partial result,
//! and the partials are merged once every worker has finished.

use crate::categorized::Categorized;
use crate::categorizer::{ingest_and_classify, Categorizer};
use crate::query::Query;
use alloc::vec::Vec;
use core::hash::{BuildHasher, Hash};
use hashbrown::HashMap;
use triage_core::Record;

impl Categorizer {
    /// Same as `categorize_record`, with ingestion spread over `config.shards`
    /// worker threads.
    ///
    /// Collections smaller than `config.min_parallel_queries` are processed on
    /// the calling thread. A panic in any worker is resumed on the caller.
    pub fn categorize_record_parallel<'a, K, Q, S>(
        &self,
        record: &Record,
        queries: &'a mut HashMap<K, Q, S>,
    ) -> Categorized<'a, K, Q>
    where
        K: Eq + Hash + Sync,
        Q: Query + Send + Sync,
        S: BuildHasher,
    {
        self.categorize_record_entries_parallel(record, queries.iter_mut())
    }

    /// Same as `categorize_record_entries`, with ingestion spread over
    /// `config.shards` worker threads.
    pub fn categorize_record_entries_parallel<'a, K, Q, I>(
        &self,
        record: &Record,
        entries: I,
    ) -> Categorized<'a, K, Q>
    where
        K: Eq + Hash + Sync + 'a,
        Q: Query + Send + Sync + 'a,
        I: IntoIterator<Item = (&'a K, &'a mut Q)>,
    {
        let entries: Vec<(&'a K, &'a mut Q)> = entries.into_iter().collect();
        let shards = self.config.shards.min(entries.len());
        if shards <= 1 || entries.len() < self.config.min_parallel_queries {
            return self.categorize_record_entries(record, entries);
        }

        let per_shard = entries.len().div_ceil(shards);
        let mut partitions: Vec<Vec<(&'a K, &'a mut Q)>> =
            (0..shards).map(|_| Vec::with_capacity(per_shard)).collect();
        for (i, entry) in entries.into_iter().enumerate() {
            partitions[i % shards].push(entry);
        }

        let categorized = std::thread::scope(|scope| {
            let workers: Vec<_> = partitions
                .into_iter()
                .map(|shard| scope.spawn(move || ingest_and_classify(record, shard)))
                .collect();

            let mut merged = Categorized::new();
            for worker in workers {
                match worker.join() {
                    Ok(partial) => merged.merge(partial),
                    Err(panic) => std::panic::resume_unwind(panic),
                }
            }
            merged
        });

        let counts = categorized.counts();
        tracing::debug!(
            shards,
            done = counts.done,
            rate_limited = counts.rate_limited,
            closed = counts.closed,
            has_data = counts.has_data,
            failed = counts.failed,
            "categorized queries in parallel"
        );
        categorized
    }
}

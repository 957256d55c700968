//! Action buckets and their priority order.

use crate::query::Query;
use core::fmt;

/// An action bucket a query can be assigned to after a feeding pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Category {
    /// Final result produced; emit and retire.
    Done,
    /// Over quota; abort.
    RateLimited,
    /// Underlying resource closed by the engine (or ingest failed).
    Closed,
    /// Partial result ready; emit and keep alive.
    HasData,
}

impl Category {
    /// Classification order. The first category whose predicate holds wins.
    pub const PRIORITY: [Category; 4] = [
        Category::Done,
        Category::RateLimited,
        Category::Closed,
        Category::HasData,
    ];

    /// Position of this category in `PRIORITY`.
    #[inline]
    pub const fn index(self) -> usize {
        match self {
            Category::Done => 0,
            Category::RateLimited => 1,
            Category::Closed => 2,
            Category::HasData => 3,
        }
    }

    /// Reads the one predicate backing this category.
    #[inline]
    pub fn applies<Q: Query + ?Sized>(self, query: &Q) -> bool {
        match self {
            Category::Done => query.is_done(),
            Category::RateLimited => query.is_exceeding_rate_limit(),
            Category::Closed => query.is_closed(),
            Category::HasData => query.has_new_data(),
        }
    }

    /// Returns the bucket for `query`, or `None` if no predicate holds.
    ///
    /// Predicates are read in priority order and each at most once.
    pub fn classify<Q: Query + ?Sized>(query: &Q) -> Option<Category> {
        Self::PRIORITY
            .iter()
            .copied()
            .find(|category| category.applies(query))
    }

    /// Returns the bucket name.
    pub fn name(self) -> &'static str {
        match self {
            Category::Done => "done",
            Category::RateLimited => "rate_limited",
            Category::Closed => "closed",
            Category::HasData => "has_data",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

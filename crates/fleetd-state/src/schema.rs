//! Database schema definitions and collections.
//!
//! This module defines the collections (`RocksDB` column families) used by
//! the state store.

/// A collection of documents in the store.
///
/// Each collection maps to one `RocksDB` column family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    /// Machine documents, keyed by machine id.
    Machines,
    /// Unit documents, keyed by unit name.
    Units,
    /// User documents, keyed by user name.
    Users,
    /// Status documents, keyed by global key.
    Statuses,
    /// Monotonic counters, keyed by sequence name.
    Sequences,
}

impl Collection {
    /// The column family name backing this collection.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Machines => "machines",
            Self::Units => "units",
            Self::Users => "users",
            Self::Statuses => "statuses",
            Self::Sequences => "sequences",
        }
    }
}

/// Returns all collections for database initialization.
#[must_use]
pub fn all_collections() -> Vec<Collection> {
    vec![
        Collection::Machines,
        Collection::Units,
        Collection::Users,
        Collection::Statuses,
        Collection::Sequences,
    ]
}

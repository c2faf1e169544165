//! Generic row-store contract shared by directories, accounts and K records.
//!
//! Every batch is atomic per row: a row the store rejects is skipped and
//! logged, the rest of the batch still goes through. Validation that can
//! be decided before touching the store rejects the whole batch instead.

use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::error::VaultError;

/// Outcome of a batch delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "deleted")]
pub enum BatchOutcome {
    /// Every requested row was deleted (or the batch was empty).
    AllOk,
    /// Only this many of the requested rows were deleted.
    Partial(usize),
    /// None of the requested rows were deleted.
    AllFailed,
}

impl BatchOutcome {
    /// Classify `succeeded` deletions out of `requested`.
    #[must_use]
    pub const fn from_counts(requested: usize, succeeded: usize) -> Self {
        if succeeded >= requested {
            Self::AllOk
        } else if succeeded == 0 {
            Self::AllFailed
        } else {
            Self::Partial(succeeded)
        }
    }

    /// `true` for [`BatchOutcome::AllOk`].
    #[must_use]
    pub const fn is_all_ok(self) -> bool {
        matches!(self, Self::AllOk)
    }
}

/// CRUD over one entity kind.
///
/// Implementations are stateless unit structs; the connection is passed in
/// so the same code runs inside the async gateway or directly on a
/// [`StoreDb`](crate::StoreDb).
pub trait Repository {
    /// Row as read back from the store.
    type Entity: Send + 'static;
    /// Row as submitted for insert (id assigned by the store where applicable).
    type Draft: Send + 'static;
    /// Primary key.
    type Id: Send + 'static;
    /// Selection criteria.
    type Filter: Send + 'static;

    /// Rows matching `filter`; empty when nothing matches.
    ///
    /// # Errors
    ///
    /// Store-level failures only.
    fn select(conn: &Connection, filter: &Self::Filter) -> Result<Vec<Self::Entity>, VaultError>;

    /// Insert `drafts`, returning the rows actually persisted.
    ///
    /// # Errors
    ///
    /// [`VaultError::ConstraintViolation`] when the batch fails up-front
    /// validation; store-level failures otherwise.
    fn insert(conn: &Connection, drafts: &[Self::Draft]) -> Result<Vec<Self::Entity>, VaultError>;

    /// Update `entities` by primary key, returning the rows actually persisted.
    ///
    /// # Errors
    ///
    /// Same as [`insert`](Self::insert).
    fn update(conn: &Connection, entities: &[Self::Entity])
        -> Result<Vec<Self::Entity>, VaultError>;

    /// Delete rows by primary key.
    ///
    /// # Errors
    ///
    /// Store-level failures only; per-row rejections show in the outcome.
    fn delete(conn: &Connection, ids: &[Self::Id]) -> Result<BatchOutcome, VaultError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_batch_is_all_ok() {
        assert_eq!(BatchOutcome::from_counts(0, 0), BatchOutcome::AllOk);
    }

    #[test]
    fn counts_classify() {
        assert_eq!(BatchOutcome::from_counts(3, 3), BatchOutcome::AllOk);
        assert_eq!(BatchOutcome::from_counts(3, 2), BatchOutcome::Partial(2));
        assert_eq!(BatchOutcome::from_counts(3, 0), BatchOutcome::AllFailed);
    }

    #[test]
    fn outcome_serializes_with_count() {
        let json = serde_json::to_string(&BatchOutcome::Partial(2)).unwrap();
        assert_eq!(json, r#"{"status":"partial","deleted":2}"#);
    }
}

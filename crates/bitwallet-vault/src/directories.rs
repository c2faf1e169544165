//! Directory tree: a single reserved root with arbitrarily nested children.
//!
//! The root is created by the initial migration and can never be renamed,
//! reparented or deleted. Deleting a directory that still has children
//! (directories or accounts) is refused for that row.

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::error::{is_row_rejection, VaultError};
use crate::repository::{BatchOutcome, Repository};

/// Reserved name of the root directory.
pub const ROOT_DIRECTORY_NAME: &str = "Root";

const SELECT_COLUMNS: &str = "SELECT id, name, parent_id FROM directories";

/// A folder in the tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Directory {
    pub id: i64,
    pub name: String,
    /// `None` only for the root.
    pub parent_id: Option<i64>,
}

impl Directory {
    /// `true` for the reserved root directory.
    #[must_use]
    pub const fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            parent_id: row.get(2)?,
        })
    }
}

/// A directory to create. The id is assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDirectory {
    pub name: String,
    pub parent_id: i64,
}

impl NewDirectory {
    #[must_use]
    pub fn new(name: impl Into<String>, parent_id: i64) -> Self {
        Self {
            name: name.into(),
            parent_id,
        }
    }
}

/// Directory selection criteria.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryFilter {
    All,
    ById(i64),
    /// Direct children of a directory.
    InParent(i64),
    /// Direct children of the root.
    InRoot,
    /// The root itself.
    Root,
}

/// [`Repository`] over the `directories` table.
#[derive(Debug, Clone, Copy, Default)]
pub struct Directories;

/// Fetch the root directory.
///
/// # Errors
///
/// Returns [`VaultError::NotFound`] if the root is missing, which only
/// happens on a corrupted store.
pub fn root_directory(conn: &Connection) -> Result<Directory, VaultError> {
    conn.query_row(
        &format!("{SELECT_COLUMNS} WHERE parent_id IS NULL AND name = ?1"),
        [ROOT_DIRECTORY_NAME],
        Directory::from_row,
    )
    .optional()?
    .ok_or_else(|| VaultError::NotFound("root directory".into()))
}

/// Id of the root directory.
///
/// # Errors
///
/// Same as [`root_directory`].
pub fn root_id(conn: &Connection) -> Result<i64, VaultError> {
    root_directory(conn).map(|root| root.id)
}

/// `true` if a directory with `id` exists.
pub(crate) fn exists(conn: &Connection, id: i64) -> Result<bool, VaultError> {
    let found: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM directories WHERE id = ?1)",
        [id],
        |row| row.get(0),
    )?;
    Ok(found)
}

/// `true` if `candidate` is `id` itself or one of its descendants.
fn is_in_subtree(conn: &Connection, id: i64, candidate: i64) -> Result<bool, VaultError> {
    let found: bool = conn.query_row(
        "WITH RECURSIVE subtree(id) AS ( \
             SELECT id FROM directories WHERE id = ?1 \
             UNION \
             SELECT d.id FROM directories d JOIN subtree s ON d.parent_id = s.id \
         ) \
         SELECT EXISTS(SELECT 1 FROM subtree WHERE id = ?2)",
        params![id, candidate],
        |row| row.get(0),
    )?;
    Ok(found)
}

fn validate_name(name: &str) -> Result<(), VaultError> {
    if name.trim().is_empty() {
        return Err(VaultError::ConstraintViolation(
            "directory name must not be empty".into(),
        ));
    }
    if name == ROOT_DIRECTORY_NAME {
        return Err(VaultError::ConstraintViolation(format!(
            "directory name {ROOT_DIRECTORY_NAME:?} is reserved"
        )));
    }
    Ok(())
}

fn validate_parent(conn: &Connection, parent_id: i64) -> Result<(), VaultError> {
    if exists(conn, parent_id)? {
        Ok(())
    } else {
        Err(VaultError::ConstraintViolation(format!(
            "parent directory {parent_id} does not exist"
        )))
    }
}

impl Repository for Directories {
    type Entity = Directory;
    type Draft = NewDirectory;
    type Id = i64;
    type Filter = DirectoryFilter;

    fn select(conn: &Connection, filter: &DirectoryFilter) -> Result<Vec<Directory>, VaultError> {
        let (sql, arg): (String, Option<i64>) = match filter {
            DirectoryFilter::All => (format!("{SELECT_COLUMNS} ORDER BY id"), None),
            DirectoryFilter::ById(id) => (format!("{SELECT_COLUMNS} WHERE id = ?1"), Some(*id)),
            DirectoryFilter::InParent(parent) => (
                format!("{SELECT_COLUMNS} WHERE parent_id = ?1 ORDER BY id"),
                Some(*parent),
            ),
            DirectoryFilter::InRoot => (
                format!(
                    "{SELECT_COLUMNS} WHERE parent_id = \
                     (SELECT id FROM directories WHERE parent_id IS NULL AND name = '{ROOT_DIRECTORY_NAME}') \
                     ORDER BY id"
                ),
                None,
            ),
            DirectoryFilter::Root => (
                format!("{SELECT_COLUMNS} WHERE parent_id IS NULL AND name = '{ROOT_DIRECTORY_NAME}'"),
                None,
            ),
        };

        let mut stmt = conn.prepare(&sql)?;
        let rows = match arg {
            Some(value) => stmt.query_map([value], Directory::from_row)?,
            None => stmt.query_map([], Directory::from_row)?,
        };
        let dirs = rows.collect::<Result<Vec<_>, _>>()?;
        tracing::debug!(?filter, count = dirs.len(), "selected directories");
        Ok(dirs)
    }

    fn insert(conn: &Connection, drafts: &[NewDirectory]) -> Result<Vec<Directory>, VaultError> {
        for draft in drafts {
            validate_name(&draft.name)?;
            validate_parent(conn, draft.parent_id)?;
        }

        let mut stmt = conn.prepare("INSERT INTO directories (name, parent_id) VALUES (?1, ?2)")?;
        let mut inserted = Vec::with_capacity(drafts.len());
        for draft in drafts {
            match stmt.execute(params![draft.name, draft.parent_id]) {
                Ok(_) => inserted.push(Directory {
                    id: conn.last_insert_rowid(),
                    name: draft.name.clone(),
                    parent_id: Some(draft.parent_id),
                }),
                Err(e) if is_row_rejection(&e) => {
                    tracing::warn!(name = %draft.name, error = %e, "directory insert skipped");
                }
                Err(e) => return Err(e.into()),
            }
        }
        tracing::debug!(requested = drafts.len(), inserted = inserted.len(), "inserted directories");
        Ok(inserted)
    }

    fn update(conn: &Connection, entities: &[Directory]) -> Result<Vec<Directory>, VaultError> {
        let root = root_id(conn)?;
        for dir in entities {
            if dir.id == root {
                return Err(VaultError::ConstraintViolation(
                    "the root directory cannot be modified".into(),
                ));
            }
            validate_name(&dir.name)?;
            let Some(parent_id) = dir.parent_id else {
                return Err(VaultError::ConstraintViolation(format!(
                    "directory {} must have a parent",
                    dir.id
                )));
            };
            validate_parent(conn, parent_id)?;
            if is_in_subtree(conn, dir.id, parent_id)? {
                return Err(VaultError::ConstraintViolation(format!(
                    "moving directory {} under {parent_id} would create a cycle",
                    dir.id
                )));
            }
        }

        let mut stmt = conn.prepare("UPDATE directories SET name = ?1, parent_id = ?2 WHERE id = ?3")?;
        let mut updated = Vec::with_capacity(entities.len());
        for dir in entities {
            let Some(parent_id) = dir.parent_id else {
                continue;
            };
            // Earlier rows of this batch may have moved the tree around.
            if is_in_subtree(conn, dir.id, parent_id)? {
                tracing::warn!(id = dir.id, parent_id, "directory move skipped: would create a cycle");
                continue;
            }
            match stmt.execute(params![dir.name, parent_id, dir.id]) {
                Ok(0) => tracing::warn!(id = dir.id, "directory update skipped: no such row"),
                Ok(_) => updated.push(dir.clone()),
                Err(e) if is_row_rejection(&e) => {
                    tracing::warn!(id = dir.id, error = %e, "directory update skipped");
                }
                Err(e) => return Err(e.into()),
            }
        }
        tracing::debug!(requested = entities.len(), updated = updated.len(), "updated directories");
        Ok(updated)
    }

    fn delete(conn: &Connection, ids: &[i64]) -> Result<BatchOutcome, VaultError> {
        let mut stmt = conn.prepare("DELETE FROM directories WHERE id = ?1")?;
        let mut deleted = 0usize;
        for id in ids {
            match stmt.execute([id]) {
                Ok(0) => tracing::warn!(id, "directory delete skipped: no such row"),
                Ok(_) => deleted = deleted.saturating_add(1),
                Err(e) if is_row_rejection(&e) => {
                    tracing::warn!(id, error = %e, "directory delete refused");
                }
                Err(e) => return Err(e.into()),
            }
        }
        let outcome = BatchOutcome::from_counts(ids.len(), deleted);
        tracing::debug!(requested = ids.len(), deleted, ?outcome, "deleted directories");
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::StoreDb;

    #[test]
    fn fresh_store_has_exactly_one_root() {
        let db = StoreDb::open_in_memory().unwrap();
        let roots = Directories::select(db.connection(), &DirectoryFilter::Root).unwrap();
        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0].name, ROOT_DIRECTORY_NAME);
        assert!(roots[0].is_root());
    }

    #[test]
    fn reserved_and_empty_names_are_rejected() {
        let db = StoreDb::open_in_memory().unwrap();
        let root = root_id(db.connection()).unwrap();
        for name in [ROOT_DIRECTORY_NAME, "", "   "] {
            let result = Directories::insert(db.connection(), &[NewDirectory::new(name, root)]);
            assert!(
                matches!(result, Err(VaultError::ConstraintViolation(_))),
                "{name:?} accepted"
            );
        }
    }

    #[test]
    fn subtree_contains_self_and_descendants() {
        let db = StoreDb::open_in_memory().unwrap();
        let conn = db.connection();
        let root = root_id(conn).unwrap();
        let a = Directories::insert(conn, &[NewDirectory::new("a", root)]).unwrap()[0].id;
        let b = Directories::insert(conn, &[NewDirectory::new("b", a)]).unwrap()[0].id;

        assert!(is_in_subtree(conn, a, a).unwrap());
        assert!(is_in_subtree(conn, a, b).unwrap());
        assert!(!is_in_subtree(conn, b, a).unwrap());
    }
}

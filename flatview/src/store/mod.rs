mod memory;
mod sqlite;

pub use memory::{MemoryStore, WriteKind, WriteRecord};
pub use sqlite::SqliteStore;

use crate::error::{FlatViewError, Result};
use crate::value::{FieldValue, Fields};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A loaded document with its store-assigned metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredDocument {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub fields: Fields,
}

/// Address of a collection: either top level, or a sub-collection nested
/// under one document of a top-level collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CollectionPath {
    Root(String),
    Sub {
        collection: String,
        parent_key: String,
        name: String,
    },
}

impl CollectionPath {
    pub fn root(name: &str) -> Self {
        CollectionPath::Root(name.to_string())
    }

    pub fn sub(collection: &str, parent_key: &str, name: &str) -> Self {
        CollectionPath::Sub {
            collection: collection.to_string(),
            parent_key: parent_key.to_string(),
            name: name.to_string(),
        }
    }

    /// Reject names and keys that would render to an ambiguous path, so that
    /// no top-level collection can alias a sub-collection.
    pub fn check(&self) -> Result<()> {
        match self {
            CollectionPath::Root(name) => check_collection(name),
            CollectionPath::Sub {
                collection,
                parent_key,
                name,
            } => {
                check_collection(collection)?;
                check_key(parent_key)?;
                check_collection(name)
            }
        }
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CollectionPath::Root(name) => f.write_str(name),
            CollectionPath::Sub {
                collection,
                parent_key,
                name,
            } => write!(f, "{collection}/{parent_key}/{name}"),
        }
    }
}

/// The document store this crate reads from and writes to.
///
/// Calls block until the store answers. Implementations own their consistency
/// guarantees; nothing here is transactional across calls.
pub trait DocumentStore {
    /// List every document of a collection in store order.
    fn list_documents(&self, path: &CollectionPath) -> Result<Vec<StoredDocument>>;

    /// Get a top-level document by key, `None` if it does not exist.
    fn get_document(&self, collection: &str, key: &str) -> Result<Option<StoredDocument>>;

    /// Create or replace a top-level document under a caller-chosen key.
    /// Replacing keeps the original `created_at`.
    fn set_document(&self, collection: &str, key: &str, fields: &Fields) -> Result<()>;

    /// Append a document under a store-generated key and return the key.
    fn add_document(&self, path: &CollectionPath, fields: &Fields) -> Result<String>;

    /// Merge fields into an existing top-level document.
    /// Fails with `NotFound` when the document is absent.
    fn update_fields(&self, collection: &str, key: &str, fields: &Fields) -> Result<()>;
}

impl<S: DocumentStore + ?Sized> DocumentStore for &S {
    fn list_documents(&self, path: &CollectionPath) -> Result<Vec<StoredDocument>> {
        (**self).list_documents(path)
    }

    fn get_document(&self, collection: &str, key: &str) -> Result<Option<StoredDocument>> {
        (**self).get_document(collection, key)
    }

    fn set_document(&self, collection: &str, key: &str, fields: &Fields) -> Result<()> {
        (**self).set_document(collection, key, fields)
    }

    fn add_document(&self, path: &CollectionPath, fields: &Fields) -> Result<String> {
        (**self).add_document(path, fields)
    }

    fn update_fields(&self, collection: &str, key: &str, fields: &Fields) -> Result<()> {
        (**self).update_fields(collection, key, fields)
    }
}

/// Strategy for store-generated document keys
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdStrategy {
    #[default]
    Ulid,
    Uuid,
    Nanoid,
}

impl IdStrategy {
    pub fn generate(&self) -> String {
        match self {
            IdStrategy::Ulid => ulid::Ulid::new().to_string().to_lowercase(),
            IdStrategy::Uuid => uuid::Uuid::new_v4().to_string(),
            IdStrategy::Nanoid => nanoid::nanoid!(),
        }
    }
}

/// Reject keys that would be ambiguous inside a rendered collection path.
pub(crate) fn check_key(key: &str) -> Result<()> {
    check_segment("Document key", key)
}

pub(crate) fn check_collection(name: &str) -> Result<()> {
    check_segment("Collection name", name)
}

fn check_segment(what: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(FlatViewError::Validation(format!("{what} must not be empty")));
    }
    if value.contains('/') {
        return Err(FlatViewError::Validation(format!(
            "{what} '{value}' must not contain '/'"
        )));
    }
    Ok(())
}

/// Reject values no store can persist faithfully. JSON has no encoding for
/// NaN or infinities.
pub(crate) fn check_fields(fields: &Fields) -> Result<()> {
    for (name, value) in fields {
        if let FieldValue::Number(n) = value {
            if !n.is_finite() {
                return Err(FlatViewError::Validation(format!(
                    "Field '{name}' holds a non-finite number ({n})"
                )));
            }
        }
    }
    Ok(())
}

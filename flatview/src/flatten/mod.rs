use crate::error::Result;
use crate::store::{CollectionPath, DocumentStore};
use crate::value::{FieldValue, Fields};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Synthetic key carrying the parent document's key in a flattened row
pub const PARENT_ID_FIELD: &str = "parent_id";
/// Synthetic key carrying the child document's key in a flattened row
pub const CHILD_ID_FIELD: &str = "child_id";
/// Synthetic key carrying a reference document's key
pub const REFERENCE_ID_FIELD: &str = "id";
/// Key under which tabular output shows a record's creation time
pub const CREATED_AT_FIELD: &str = "created_at";

/// A parent document merged with one of its children.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlatRecord {
    pub parent_id: String,
    pub child_id: String,
    /// When the child document was created in the store.
    pub created_at: DateTime<Utc>,
    /// Parent fields overlaid with the child's fields.
    pub fields: Fields,
}

impl FlatRecord {
    /// The merged fields plus the `parent_id`/`child_id` keys, which take
    /// precedence over stored fields of the same name.
    pub fn to_fields(&self) -> Fields {
        let mut out = self.fields.clone();
        out.insert(
            PARENT_ID_FIELD.to_string(),
            FieldValue::String(self.parent_id.clone()),
        );
        out.insert(
            CHILD_ID_FIELD.to_string(),
            FieldValue::String(self.child_id.clone()),
        );
        out
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }
}

/// A document of a flat (childless) collection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReferenceRecord {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub fields: Fields,
}

impl ReferenceRecord {
    pub fn to_fields(&self) -> Fields {
        let mut out = self.fields.clone();
        out.insert(
            REFERENCE_ID_FIELD.to_string(),
            FieldValue::String(self.id.clone()),
        );
        out
    }
}

/// Flatten a two-level hierarchy into one record per child document.
///
/// Parents without children produce no records. Rows come out in store order
/// (parents, then each parent's children). Any store failure aborts the scan.
pub fn flatten<S: DocumentStore + ?Sized>(
    store: &S,
    parent_collection: &str,
    child_subcollection: &str,
) -> Result<Vec<FlatRecord>> {
    let parents = store.list_documents(&CollectionPath::root(parent_collection))?;
    let mut rows = Vec::new();

    for parent in &parents {
        let children_path =
            CollectionPath::sub(parent_collection, &parent.id, child_subcollection);
        let children = store.list_documents(&children_path)?;

        for child in children {
            let mut fields = parent.fields.clone();
            fields.extend(child.fields);
            rows.push(FlatRecord {
                parent_id: parent.id.clone(),
                child_id: child.id,
                created_at: child.created_at,
                fields,
            });
        }
    }

    log::debug!(
        "Flattened {}/{}: {} parents, {} rows",
        parent_collection,
        child_subcollection,
        parents.len(),
        rows.len()
    );
    Ok(rows)
}

/// List a flat collection.
pub fn list_references<S: DocumentStore + ?Sized>(
    store: &S,
    collection: &str,
) -> Result<Vec<ReferenceRecord>> {
    let docs = store.list_documents(&CollectionPath::root(collection))?;
    Ok(docs
        .into_iter()
        .map(|doc| ReferenceRecord {
            id: doc.id,
            created_at: doc.created_at,
            fields: doc.fields,
        })
        .collect())
}

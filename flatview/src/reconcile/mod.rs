use crate::auth::Session;
use crate::error::{FlatViewError, Result};
use crate::store::{check_fields, check_key, CollectionPath, DocumentStore};
use crate::value::Fields;
use serde::{Deserialize, Serialize};

/// Copy one child field onto the parent after a successful append.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rollup {
    /// Field set on the parent document.
    pub parent_field: String,
    /// Child field supplying the value; defaults to `parent_field`.
    #[serde(default)]
    pub child_field: Option<String>,
}

impl Rollup {
    pub fn new(parent_field: &str) -> Self {
        Rollup {
            parent_field: parent_field.to_string(),
            child_field: None,
        }
    }

    pub fn from_child(parent_field: &str, child_field: &str) -> Self {
        Rollup {
            parent_field: parent_field.to_string(),
            child_field: Some(child_field.to_string()),
        }
    }

    pub fn source(&self) -> &str {
        self.child_field.as_deref().unwrap_or(&self.parent_field)
    }
}

/// Appends children under parents of one hierarchy.
///
/// The four steps of [`Reconciler::add_child`] run strictly in order and are
/// not atomic: a parent created in step two stays in place when a later step
/// fails.
pub struct Reconciler<'s, S: DocumentStore + ?Sized> {
    store: &'s S,
    parent_collection: String,
    child_subcollection: String,
    required_fields: Vec<String>,
}

impl<'s, S: DocumentStore + ?Sized> Reconciler<'s, S> {
    pub fn new(store: &'s S, parent_collection: &str, child_subcollection: &str) -> Self {
        Reconciler {
            store,
            parent_collection: parent_collection.to_string(),
            child_subcollection: child_subcollection.to_string(),
            required_fields: Vec::new(),
        }
    }

    /// Child fields that must be present and non-blank.
    pub fn require(mut self, fields: &[String]) -> Self {
        self.required_fields = fields.to_vec();
        self
    }

    /// Append a child under `parent_key`, creating the parent from
    /// `parent_defaults` if it does not exist yet. Returns the new child key.
    pub fn add_child(
        &self,
        session: &Session,
        parent_key: &str,
        parent_defaults: &Fields,
        child_fields: &Fields,
        rollup: Option<&Rollup>,
    ) -> Result<String> {
        let parent_key = parent_key.trim();
        check_key(parent_key)?;
        check_required(child_fields, &self.required_fields)?;
        check_fields(parent_defaults)?;
        check_fields(child_fields)?;
        let rollup_value = match rollup {
            Some(r) => {
                let value = child_fields.get(r.source()).ok_or_else(|| {
                    FlatViewError::Validation(format!(
                        "Rollup source field '{}' is missing",
                        r.source()
                    ))
                })?;
                Some((r, value))
            }
            None => None,
        };

        let collection = self.parent_collection.as_str();

        if self.store.get_document(collection, parent_key)?.is_none() {
            self.store
                .set_document(collection, parent_key, parent_defaults)?;
            log::info!(
                "{}: created {}/{}",
                session.principal(),
                collection,
                parent_key
            );
        }

        let path = CollectionPath::sub(collection, parent_key, &self.child_subcollection);
        let child_id = self.store.add_document(&path, child_fields)?;
        log::info!("{}: added {}/{}", session.principal(), path, child_id);

        if let Some((rollup, value)) = rollup_value {
            let mut update = Fields::new();
            update.insert(rollup.parent_field.clone(), value.clone());
            self.store.update_fields(collection, parent_key, &update)?;
        }

        Ok(child_id)
    }
}

/// Append one document to a flat collection after checking required fields.
pub fn add_reference<S: DocumentStore + ?Sized>(
    store: &S,
    session: &Session,
    collection: &str,
    fields: &Fields,
    required: &[String],
) -> Result<String> {
    check_required(fields, required)?;
    check_fields(fields)?;
    let path = CollectionPath::root(collection);
    let id = store.add_document(&path, fields)?;
    log::info!("{}: added {}/{}", session.principal(), path, id);
    Ok(id)
}

fn check_required(fields: &Fields, required: &[String]) -> Result<()> {
    let missing: Vec<&str> = required
        .iter()
        .filter(|name| fields.get(*name).map_or(true, |v| v.is_blank()))
        .map(String::as_str)
        .collect();

    if !missing.is_empty() {
        return Err(FlatViewError::Validation(format!(
            "Required field(s) missing: {}",
            missing.join(", ")
        )));
    }
    Ok(())
}

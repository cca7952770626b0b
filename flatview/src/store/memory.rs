use super::{
    check_fields, check_key, CollectionPath, DocumentStore, IdStrategy, StoredDocument,
};
use crate::error::{FlatViewError, Result};
use crate::value::Fields;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// Kind of mutation recorded in a [`MemoryStore`] write log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    Set,
    Add,
    Update,
}

/// One entry of the write log, in the order writes were applied.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteRecord {
    pub seq: u64,
    pub kind: WriteKind,
    pub path: String,
    pub id: String,
    pub at: DateTime<Utc>,
}

#[derive(Default)]
struct Inner {
    collections: HashMap<CollectionPath, Vec<StoredDocument>>,
    log: Vec<WriteRecord>,
}

impl Inner {
    fn record(&mut self, kind: WriteKind, path: &str, id: &str, at: DateTime<Utc>) {
        let seq = self.log.len() as u64 + 1;
        self.log.push(WriteRecord {
            seq,
            kind,
            path: path.to_string(),
            id: id.to_string(),
            at,
        });
    }
}

/// In-process document store. Documents keep insertion order and every write
/// is appended to an inspectable log.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    ids: IdStrategy,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id_strategy(ids: IdStrategy) -> Self {
        MemoryStore {
            inner: Mutex::new(Inner::default()),
            ids,
        }
    }

    /// Snapshot of every write applied so far.
    pub fn write_log(&self) -> Vec<WriteRecord> {
        self.lock().log.clone()
    }

    /// Number of writes applied so far.
    pub fn write_count(&self) -> usize {
        self.lock().log.len()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl DocumentStore for MemoryStore {
    fn list_documents(&self, path: &CollectionPath) -> Result<Vec<StoredDocument>> {
        path.check()?;
        let inner = self.lock();
        Ok(inner.collections.get(path).cloned().unwrap_or_default())
    }

    fn get_document(&self, collection: &str, key: &str) -> Result<Option<StoredDocument>> {
        let path = CollectionPath::root(collection);
        path.check()?;
        let inner = self.lock();
        Ok(inner
            .collections
            .get(&path)
            .and_then(|docs| docs.iter().find(|d| d.id == key))
            .cloned())
    }

    fn set_document(&self, collection: &str, key: &str, fields: &Fields) -> Result<()> {
        let path = CollectionPath::root(collection);
        path.check()?;
        check_key(key)?;
        check_fields(fields)?;
        let now = Utc::now();
        let mut inner = self.lock();
        let docs = inner.collections.entry(path).or_default();

        match docs.iter_mut().find(|d| d.id == key) {
            Some(existing) => {
                existing.fields = fields.clone();
                existing.modified_at = now;
            }
            None => docs.push(StoredDocument {
                id: key.to_string(),
                created_at: now,
                modified_at: now,
                fields: fields.clone(),
            }),
        }

        inner.record(WriteKind::Set, collection, key, now);
        Ok(())
    }

    fn add_document(&self, path: &CollectionPath, fields: &Fields) -> Result<String> {
        path.check()?;
        check_fields(fields)?;
        let id = self.ids.generate();
        let now = Utc::now();
        let mut inner = self.lock();

        inner
            .collections
            .entry(path.clone())
            .or_default()
            .push(StoredDocument {
                id: id.clone(),
                created_at: now,
                modified_at: now,
                fields: fields.clone(),
            });

        inner.record(WriteKind::Add, &path.to_string(), &id, now);
        Ok(id)
    }

    fn update_fields(&self, collection: &str, key: &str, fields: &Fields) -> Result<()> {
        let path = CollectionPath::root(collection);
        path.check()?;
        check_fields(fields)?;
        let now = Utc::now();
        let mut inner = self.lock();
        let doc = inner
            .collections
            .get_mut(&path)
            .and_then(|docs| docs.iter_mut().find(|d| d.id == key))
            .ok_or_else(|| FlatViewError::NotFound {
                collection: collection.to_string(),
                id: key.to_string(),
            })?;

        for (name, value) in fields {
            doc.fields.insert(name.clone(), value.clone());
        }
        doc.modified_at = now;

        inner.record(WriteKind::Update, collection, key, now);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{fields, FieldValue};

    #[test]
    fn test_set_and_get() {
        let store = MemoryStore::new();
        store
            .set_document("patients", "KL-001", &fields([("name", "Asha")]))
            .unwrap();

        let doc = store.get_document("patients", "KL-001").unwrap().unwrap();
        assert_eq!(doc.id, "KL-001");
        assert_eq!(doc.fields["name"], FieldValue::from("Asha"));
        assert!(store.get_document("patients", "KL-002").unwrap().is_none());
    }

    #[test]
    fn test_set_replaces_but_keeps_created_at() {
        let store = MemoryStore::new();
        store
            .set_document("patients", "KL-001", &fields([("name", "Asha")]))
            .unwrap();
        let first = store.get_document("patients", "KL-001").unwrap().unwrap();

        store
            .set_document("patients", "KL-001", &fields([("name", "Asha K")]))
            .unwrap();
        let second = store.get_document("patients", "KL-001").unwrap().unwrap();

        assert_eq!(first.created_at, second.created_at);
        assert_eq!(second.fields["name"], FieldValue::from("Asha K"));
        assert_eq!(store.list_documents(&CollectionPath::root("patients")).unwrap().len(), 1);
    }

    #[test]
    fn test_add_to_subcollection_keeps_order() {
        let store = MemoryStore::new();
        let visits = CollectionPath::sub("patients", "KL-001", "visits");
        let a = store.add_document(&visits, &fields([("symptoms", "fever")])).unwrap();
        let b = store.add_document(&visits, &fields([("symptoms", "cough")])).unwrap();

        let docs = store.list_documents(&visits).unwrap();
        let ids: Vec<&str> = docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec![a.as_str(), b.as_str()]);

        // Sub-collections are invisible at the top level
        assert!(store.list_documents(&CollectionPath::root("patients")).unwrap().is_empty());
    }

    #[test]
    fn test_update_merges_fields() {
        let store = MemoryStore::new();
        store
            .set_document("patients", "KL-001", &fields([("name", "Asha")]))
            .unwrap();
        store
            .update_fields("patients", "KL-001", &fields([("status", "Fully Vaccinated")]))
            .unwrap();

        let doc = store.get_document("patients", "KL-001").unwrap().unwrap();
        assert_eq!(doc.fields["name"], FieldValue::from("Asha"));
        assert_eq!(doc.fields["status"], FieldValue::from("Fully Vaccinated"));
    }

    #[test]
    fn test_update_missing_document() {
        let store = MemoryStore::new();
        let err = store
            .update_fields("patients", "KL-404", &fields([("status", "x")]))
            .unwrap_err();
        assert!(matches!(err, FlatViewError::NotFound { .. }));
        assert_eq!(store.write_count(), 0);
    }

    #[test]
    fn test_write_log_order() {
        let store = MemoryStore::new();
        store.set_document("patients", "KL-001", &Fields::new()).unwrap();
        store
            .add_document(&CollectionPath::sub("patients", "KL-001", "visits"), &Fields::new())
            .unwrap();

        let log = store.write_log();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].kind, WriteKind::Set);
        assert_eq!(log[1].kind, WriteKind::Add);
        assert_eq!(log[1].path, "patients/KL-001/visits");
        assert!(log[0].seq < log[1].seq);
    }

    #[test]
    fn test_non_finite_number_rejected_before_write() {
        let store = MemoryStore::new();
        let visits = CollectionPath::sub("patients", "KL-001", "visits");
        let mut data = fields([("symptoms", "fever")]);
        data.insert("temp".into(), FieldValue::Number(f64::INFINITY));

        let err = store.add_document(&visits, &data).unwrap_err();
        assert!(matches!(err, FlatViewError::Validation(_)));
        assert!(store.set_document("patients", "KL-001", &data).is_err());
        assert_eq!(store.write_count(), 0);
        assert!(store.list_documents(&visits).unwrap().is_empty());
    }

    #[test]
    fn test_root_name_cannot_alias_subcollection() {
        let store = MemoryStore::new();
        let visits = CollectionPath::sub("patients", "KL-001", "visits");
        store.add_document(&visits, &fields([("symptoms", "fever")])).unwrap();

        let alias = CollectionPath::root("patients/KL-001/visits");
        assert!(store.list_documents(&alias).is_err());
        assert!(store.add_document(&alias, &Fields::new()).is_err());
        assert!(store.get_document("patients/KL-001/visits", "x").is_err());
        assert_eq!(store.list_documents(&visits).unwrap().len(), 1);
    }
}

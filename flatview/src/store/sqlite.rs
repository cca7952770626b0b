use super::{
    check_collection, check_fields, check_key, CollectionPath, DocumentStore, IdStrategy,
    StoredDocument,
};
use crate::error::{FlatViewError, Result};
use crate::value::{FieldValue, Fields};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;

const TIMESTAMP_TAG: &str = "$timestamp";

/// A document store persisted in a single SQLite file.
///
/// Every collection, top level or nested, lives in one `documents` table keyed
/// by its rendered [`CollectionPath`]. The autoincrement `seq` column is the
/// store order returned by listings.
pub struct SqliteStore {
    conn: Connection,
    ids: IdStrategy,
}

impl SqliteStore {
    /// Open or create the store at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = SqliteStore {
            conn,
            ids: IdStrategy::default(),
        };
        store.initialize_tables()?;
        Ok(store)
    }

    /// Open an in-memory store (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = SqliteStore {
            conn,
            ids: IdStrategy::default(),
        };
        store.initialize_tables()?;
        Ok(store)
    }

    pub fn with_id_strategy(mut self, ids: IdStrategy) -> Self {
        self.ids = ids;
        self
    }

    fn initialize_tables(&self) -> Result<()> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS documents (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                data_json TEXT NOT NULL,
                created_at TEXT NOT NULL,
                modified_at TEXT NOT NULL,
                UNIQUE (collection, id)
            );

            CREATE INDEX IF NOT EXISTS idx_documents_collection ON documents(collection);
            ",
        )?;
        Ok(())
    }

    fn read_row(row: &Row<'_>) -> rusqlite::Result<(String, String, String, String)> {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
    }
}

impl DocumentStore for SqliteStore {
    fn list_documents(&self, path: &CollectionPath) -> Result<Vec<StoredDocument>> {
        path.check()?;
        let mut stmt = self.conn.prepare(
            "SELECT id, data_json, created_at, modified_at FROM documents
             WHERE collection = ?1 ORDER BY seq",
        )?;
        let rows = stmt.query_map(params![path.to_string()], Self::read_row)?;

        let mut docs = Vec::new();
        for row in rows {
            docs.push(into_document(row?)?);
        }
        Ok(docs)
    }

    fn get_document(&self, collection: &str, key: &str) -> Result<Option<StoredDocument>> {
        check_collection(collection)?;
        let row = self
            .conn
            .query_row(
                "SELECT id, data_json, created_at, modified_at FROM documents
                 WHERE collection = ?1 AND id = ?2",
                params![collection, key],
                Self::read_row,
            )
            .optional()?;
        row.map(into_document).transpose()
    }

    fn set_document(&self, collection: &str, key: &str, fields: &Fields) -> Result<()> {
        check_collection(collection)?;
        check_key(key)?;
        check_fields(fields)?;
        let data_json = encode_fields(fields)?;
        let now = timestamp_string(&Utc::now());
        self.conn.execute(
            "INSERT INTO documents (collection, id, data_json, created_at, modified_at)
             VALUES (?1, ?2, ?3, ?4, ?4)
             ON CONFLICT (collection, id)
             DO UPDATE SET data_json = excluded.data_json, modified_at = excluded.modified_at",
            params![collection, key, data_json, now],
        )?;
        Ok(())
    }

    fn add_document(&self, path: &CollectionPath, fields: &Fields) -> Result<String> {
        path.check()?;
        check_fields(fields)?;
        let id = self.ids.generate();
        let data_json = encode_fields(fields)?;
        let now = timestamp_string(&Utc::now());
        self.conn.execute(
            "INSERT INTO documents (collection, id, data_json, created_at, modified_at)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![path.to_string(), id, data_json, now],
        )?;
        Ok(id)
    }

    fn update_fields(&self, collection: &str, key: &str, fields: &Fields) -> Result<()> {
        check_fields(fields)?;
        let mut doc = self
            .get_document(collection, key)?
            .ok_or_else(|| FlatViewError::NotFound {
                collection: collection.to_string(),
                id: key.to_string(),
            })?;

        for (name, value) in fields {
            doc.fields.insert(name.clone(), value.clone());
        }

        let data_json = encode_fields(&doc.fields)?;
        let now = timestamp_string(&Utc::now());
        self.conn.execute(
            "UPDATE documents SET data_json = ?1, modified_at = ?2
             WHERE collection = ?3 AND id = ?4",
            params![data_json, now, collection, key],
        )?;
        Ok(())
    }
}

fn into_document(
    (id, data_json, created_at, modified_at): (String, String, String, String),
) -> Result<StoredDocument> {
    let raw: serde_json::Value = serde_json::from_str(&data_json)?;
    Ok(StoredDocument {
        fields: decode_fields(&id, &raw)?,
        id,
        created_at: parse_timestamp(&created_at)?,
        modified_at: parse_timestamp(&modified_at)?,
    })
}

fn timestamp_string(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| FlatViewError::Store(format!("Corrupt timestamp '{s}': {e}")))
}

/// Encode fields as JSON, tagging timestamps so they survive a round trip
/// distinct from plain strings.
fn encode_fields(fields: &Fields) -> Result<String> {
    let mut map = serde_json::Map::new();
    for (name, value) in fields {
        let encoded = match value {
            FieldValue::Timestamp(ts) => {
                let mut tagged = serde_json::Map::new();
                tagged.insert(
                    TIMESTAMP_TAG.to_string(),
                    serde_json::Value::String(timestamp_string(ts)),
                );
                serde_json::Value::Object(tagged)
            }
            other => other.to_json(),
        };
        map.insert(name.clone(), encoded);
    }
    Ok(serde_json::to_string(&map)?)
}

fn decode_fields(id: &str, raw: &serde_json::Value) -> Result<Fields> {
    let object = raw
        .as_object()
        .ok_or_else(|| FlatViewError::Store(format!("Document '{id}' is not a JSON object")))?;

    let mut fields = Fields::new();
    for (name, value) in object {
        let decoded = match value.get(TIMESTAMP_TAG).and_then(|v| v.as_str()) {
            Some(ts) => FieldValue::Timestamp(parse_timestamp(ts)?),
            None => FieldValue::from_json(name, value)
                .map_err(|e| FlatViewError::Store(format!("Document '{id}': {e}")))?,
        };
        fields.insert(name.clone(), decoded);
    }
    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::fields;
    use chrono::TimeZone;

    #[test]
    fn test_set_get_round_trip_keeps_kinds() {
        let store = SqliteStore::open_in_memory().unwrap();
        let ts = Utc.with_ymd_and_hms(2024, 1, 5, 8, 0, 0).unwrap();
        let mut data = fields([("name", "Asha")]);
        data.insert("age".into(), FieldValue::Number(31.0));
        data.insert("insured".into(), FieldValue::Bool(false));
        data.insert("createdAt".into(), FieldValue::Timestamp(ts));
        // An RFC 3339 looking string must stay a string
        data.insert("note".into(), FieldValue::from("2024-01-05T08:00:00Z"));

        store.set_document("patients", "KL-001", &data).unwrap();
        let doc = store.get_document("patients", "KL-001").unwrap().unwrap();
        assert_eq!(doc.fields, data);
    }

    #[test]
    fn test_set_upsert_keeps_created_at() {
        let store = SqliteStore::open_in_memory().unwrap();
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
    }

    #[test]
    fn test_list_in_insertion_order() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.set_document("patients", "KL-002", &Fields::new()).unwrap();
        store.set_document("patients", "KL-001", &Fields::new()).unwrap();

        let docs = store.list_documents(&CollectionPath::root("patients")).unwrap();
        let ids: Vec<&str> = docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["KL-002", "KL-001"]);
    }

    #[test]
    fn test_subcollections_are_separate() {
        let store = SqliteStore::open_in_memory().unwrap().with_id_strategy(IdStrategy::Uuid);
        let visits = CollectionPath::sub("patients", "KL-001", "visits");
        let id = store
            .add_document(&visits, &fields([("symptoms", "fever")]))
            .unwrap();
        assert_eq!(id.len(), 36);

        assert_eq!(store.list_documents(&visits).unwrap().len(), 1);
        assert!(store
            .list_documents(&CollectionPath::sub("patients", "KL-002", "visits"))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_update_fields() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .set_document("programs", "TP-01", &fields([("programName", "First Aid")]))
            .unwrap();
        store
            .update_fields("programs", "TP-01", &fields([("currentStatus", "Completed")]))
            .unwrap();

        let doc = store.get_document("programs", "TP-01").unwrap().unwrap();
        assert_eq!(doc.fields["programName"], FieldValue::from("First Aid"));
        assert_eq!(doc.fields["currentStatus"], FieldValue::from("Completed"));

        let err = store
            .update_fields("programs", "TP-99", &Fields::new())
            .unwrap_err();
        assert!(matches!(err, FlatViewError::NotFound { .. }));
    }

    #[test]
    fn test_persists_across_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("dashboard.db");
        {
            let store = SqliteStore::open(&path).unwrap();
            store
                .set_document("doctors", "d1", &fields([("Name", "Dr. Menon")]))
                .unwrap();
        }
        let store = SqliteStore::open(&path).unwrap();
        let docs = store.list_documents(&CollectionPath::root("doctors")).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].fields["Name"], FieldValue::from("Dr. Menon"));
    }

    #[test]
    fn test_non_finite_number_rejected_and_listing_survives() {
        let store = SqliteStore::open_in_memory().unwrap();
        let visits = CollectionPath::sub("patients", "KL-001", "visits");
        store.add_document(&visits, &fields([("symptoms", "fever")])).unwrap();

        let mut bad = fields([("symptoms", "chills")]);
        bad.insert("temp".into(), FieldValue::Number(f64::INFINITY));
        let err = store.add_document(&visits, &bad).unwrap_err();
        assert!(matches!(err, FlatViewError::Validation(_)));

        store.set_document("patients", "KL-001", &Fields::new()).unwrap();
        bad.insert("temp".into(), FieldValue::Number(f64::NAN));
        assert!(store.update_fields("patients", "KL-001", &bad).is_err());

        let docs = store.list_documents(&visits).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].fields["symptoms"], FieldValue::from("fever"));
        assert!(store.get_document("patients", "KL-001").unwrap().unwrap().fields.is_empty());
    }

    #[test]
    fn test_root_name_cannot_alias_subcollection() {
        let store = SqliteStore::open_in_memory().unwrap();
        let visits = CollectionPath::sub("patients", "KL-001", "visits");
        store.add_document(&visits, &Fields::new()).unwrap();
        assert!(store
            .list_documents(&CollectionPath::root("patients/KL-001/visits"))
            .is_err());
        assert!(store
            .set_document("patients/KL-001/visits", "x", &Fields::new())
            .is_err());
    }
}

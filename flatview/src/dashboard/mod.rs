use crate::auth::Session;
use crate::cache::TtlCache;
use crate::config::DomainProfile;
use crate::error::{ErrorKind, FlatViewError, Result};
use crate::flatten::{self, FlatRecord, ReferenceRecord};
use crate::mapper::{self, MappedRecord};
use crate::reconcile::{self, Reconciler};
use crate::report::{self, DateRange, Summary};
use crate::store::DocumentStore;
use crate::value::Fields;
use std::sync::Arc;
use std::time::Duration;

/// Read and write entry point for one domain profile.
///
/// The store is injected by the caller and owned here for the dashboard's
/// lifetime. Every successful write clears the read cache.
pub struct Dashboard<S: DocumentStore> {
    store: S,
    profile: DomainProfile,
    ttl: Duration,
    records: TtlCache<Arc<Vec<FlatRecord>>>,
    references: TtlCache<Arc<Vec<ReferenceRecord>>>,
}

impl<S: DocumentStore> Dashboard<S> {
    pub fn new(store: S, profile: DomainProfile, ttl: Duration) -> Self {
        Dashboard {
            store,
            profile,
            ttl,
            records: TtlCache::new(),
            references: TtlCache::new(),
        }
    }

    pub fn profile(&self) -> &DomainProfile {
        &self.profile
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Flattened parent/child records, served from cache within the window.
    pub fn records(&self, _session: &Session) -> Result<Arc<Vec<FlatRecord>>> {
        let profile = &self.profile;
        self.records.get_or_compute(&profile.records_key(), self.ttl, || {
            flatten::flatten(
                &self.store,
                &profile.parent_collection,
                &profile.child_subcollection,
            )
            .map(Arc::new)
        })
    }

    /// Records under display names, optionally limited to a date range on
    /// the profile's date field. With a range, undated records are dropped.
    pub fn mapped_records(
        &self,
        session: &Session,
        range: Option<&DateRange>,
    ) -> Result<Vec<MappedRecord>> {
        let records = self.records(session)?;
        let date = self.profile.date.as_ref();
        let mapped = mapper::map_records(&records, &self.profile.renames, date);

        match (range, date) {
            (Some(range), Some(spec)) => {
                let field = self.profile.renames.display_name(&spec.field);
                Ok(report::filter_by_date_range(mapped, field, range))
            }
            (Some(_), None) => Err(FlatViewError::Validation(format!(
                "Profile '{}' has no date field to filter on",
                self.profile.records_key()
            ))),
            (None, _) => Ok(mapped),
        }
    }

    /// Reference records; empty when the profile has no reference collection.
    pub fn references(&self, _session: &Session) -> Result<Arc<Vec<ReferenceRecord>>> {
        let Some(collection) = self.profile.reference_collection.as_deref() else {
            return Ok(Arc::new(Vec::new()));
        };
        self.references.get_or_compute(collection, self.ttl, || {
            flatten::list_references(&self.store, collection).map(Arc::new)
        })
    }

    /// Reference records under display names.
    pub fn mapped_references(&self, session: &Session) -> Result<Vec<MappedRecord>> {
        let references = self.references(session)?;
        Ok(references
            .iter()
            .map(|r| mapper::map_fields(&r.to_fields(), &self.profile.reference_renames, None))
            .collect())
    }

    pub fn summary(&self, session: &Session) -> Result<Summary> {
        let records = self.records(session)?;
        let references = self.references(session)?;
        Ok(report::summarize(
            &records,
            &self.profile.summary_fields,
            &references,
            self.profile.reference_group_field.as_deref(),
        ))
    }

    /// Number of records per value of a raw field.
    pub fn counts_by(
        &self,
        session: &Session,
        field: &str,
    ) -> Result<std::collections::BTreeMap<String, usize>> {
        let records = self.records(session)?;
        Ok(report::count_by(&records, field))
    }

    /// Record a new entry under `parent_key`. Entered fields named in the
    /// profile's `parent_fields` seed the parent (with `parent_defaults`) if it
    /// is new; the rest form the child. Cached reads survive only a rejected
    /// entry.
    pub fn add_child(&self, session: &Session, parent_key: &str, entry: Fields) -> Result<String> {
        let mut parent_defaults = self.profile.parent_defaults()?;
        let mut child_fields = Fields::new();
        for (name, value) in entry {
            if self.profile.parent_fields.contains(&name) {
                parent_defaults.insert(name, value);
            } else {
                child_fields.insert(name, value);
            }
        }

        let reconciler = Reconciler::new(
            &self.store,
            &self.profile.parent_collection,
            &self.profile.child_subcollection,
        )
        .require(&self.profile.required_fields);

        let outcome = reconciler.add_child(
            session,
            parent_key,
            &parent_defaults,
            &child_fields,
            self.profile.rollup.as_ref(),
        );
        // A rejected entry writes nothing visible. Any other failure may have
        // landed the child before the rollup step gave out.
        match &outcome {
            Err(e) if e.kind() == ErrorKind::Validation => {}
            _ => self.invalidate(),
        }
        outcome
    }

    /// Append a reference record.
    pub fn add_reference(&self, session: &Session, fields: Fields) -> Result<String> {
        let collection = self.profile.reference_collection.as_deref().ok_or_else(|| {
            FlatViewError::Validation(format!(
                "Profile '{}' has no reference collection",
                self.profile.records_key()
            ))
        })?;

        let id = reconcile::add_reference(
            &self.store,
            session,
            collection,
            &fields,
            &self.profile.reference_required,
        )?;
        self.invalidate();
        Ok(id)
    }

    /// Drop every cached read.
    pub fn invalidate(&self) {
        self.records.invalidate(None);
        self.references.invalidate(None);
    }
}

use crate::error::{FlatViewError, Result};
use crate::mapper::{DateSpec, RenameTable};
use crate::reconcile::Rollup;
use crate::store::IdStrategy;
use crate::value::{FieldValue, Fields};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration parsed from the dashboard YAML file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    pub auth: AuthConfig,
    /// Name of the active profile, looked up in `profiles` then built-ins.
    #[serde(default = "default_profile")]
    pub profile: String,
    #[serde(default)]
    pub profiles: HashMap<String, DomainProfile>,
}

fn default_profile() -> String {
    "health".to_string()
}

impl DashboardConfig {
    /// Resolve the active profile.
    pub fn active_profile(&self) -> Result<DomainProfile> {
        self.resolve_profile(&self.profile)
    }

    /// Resolve a profile by name; configured profiles shadow built-ins.
    pub fn resolve_profile(&self, name: &str) -> Result<DomainProfile> {
        let profile = match self.profiles.get(name) {
            Some(p) => p.clone(),
            None => DomainProfile::builtin(name).ok_or_else(|| {
                FlatViewError::Config(format!("Profile '{name}' is not defined"))
            })?,
        };
        profile.validate()?;
        Ok(profile)
    }

    /// Every resolvable profile name, sorted.
    pub fn profile_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.profiles.keys().cloned().collect();
        for builtin in DomainProfile::BUILTIN {
            if !self.profiles.contains_key(*builtin) {
                names.push(builtin.to_string());
            }
        }
        names.sort();
        names
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
    #[serde(default)]
    pub id_strategy: IdStrategy,
}

fn default_store_path() -> PathBuf {
    PathBuf::from("flatview.db")
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            path: default_store_path(),
            id_strategy: IdStrategy::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

fn default_ttl_secs() -> u64 {
    60
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            ttl_secs: default_ttl_secs(),
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// The single admin credential pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_username")]
    pub username: String,
    pub password: String,
}

fn default_username() -> String {
    "admin".to_string()
}

/// One parent/child/reference domain: which collections to read, how to
/// display their fields, and what a new entry must carry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainProfile {
    pub parent_collection: String,
    pub child_subcollection: String,
    #[serde(default)]
    pub reference_collection: Option<String>,
    #[serde(default)]
    pub renames: RenameTable,
    #[serde(default)]
    pub reference_renames: RenameTable,
    #[serde(default)]
    pub date: Option<DateSpec>,
    /// Child fields that must be present and non-blank on a new entry
    #[serde(default)]
    pub required_fields: Vec<String>,
    /// Entered fields stored on the parent document instead of the child
    #[serde(default)]
    pub parent_fields: Vec<String>,
    /// Fields written when a parent is first created
    #[serde(default)]
    pub parent_defaults: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub rollup: Option<Rollup>,
    /// Raw fields whose distinct values are counted in summaries
    #[serde(default)]
    pub summary_fields: Vec<String>,
    #[serde(default)]
    pub reference_required: Vec<String>,
    #[serde(default)]
    pub reference_group_field: Option<String>,
}

impl DomainProfile {
    pub const BUILTIN: &'static [&'static str] = &["health", "training"];

    pub fn builtin(name: &str) -> Option<Self> {
        match name {
            "health" => Some(Self::health()),
            "training" => Some(Self::training()),
            _ => None,
        }
    }

    /// Patients and their visits, with doctors as the reference collection.
    pub fn health() -> Self {
        DomainProfile {
            parent_collection: "patients".into(),
            child_subcollection: "visits".into(),
            reference_collection: Some("doctors".into()),
            renames: [
                ("name", "Patient Name"),
                ("visitDate", "Date of Visit"),
                ("symptoms", "Reported Symptoms"),
                ("location", "District"),
                ("currentVaccinationStatus", "Vaccination Status"),
            ]
            .into_iter()
            .collect(),
            reference_renames: RenameTable::new(),
            date: Some(DateSpec::new("visitDate")),
            required_fields: vec!["visitDate".into()],
            parent_fields: vec!["name".into()],
            parent_defaults: BTreeMap::new(),
            rollup: Some(Rollup::from_child(
                "currentVaccinationStatus",
                "vaccinationStatus",
            )),
            summary_fields: vec!["location".into()],
            reference_required: vec!["Name".into()],
            reference_group_field: Some("Specialty".into()),
        }
    }

    /// Training programs and their sessions, with agencies as the reference
    /// collection.
    pub fn training() -> Self {
        DomainProfile {
            parent_collection: "programs".into(),
            child_subcollection: "sessions".into(),
            reference_collection: Some("agencies".into()),
            renames: [
                ("programName", "Program"),
                ("sessionDate", "Session Date"),
                ("topic", "Topic"),
                ("district", "District"),
                ("attendees", "Attendees"),
                ("currentStatus", "Program Status"),
            ]
            .into_iter()
            .collect(),
            reference_renames: RenameTable::new(),
            date: Some(DateSpec::new("sessionDate")),
            required_fields: vec!["sessionDate".into()],
            parent_fields: vec!["programName".into()],
            parent_defaults: BTreeMap::new(),
            rollup: Some(Rollup::from_child("currentStatus", "status")),
            summary_fields: vec!["district".into()],
            reference_required: vec!["Name".into()],
            reference_group_field: Some("Sector".into()),
        }
    }

    /// Cache key for this profile's flattened read.
    pub fn records_key(&self) -> String {
        format!("{}/{}", self.parent_collection, self.child_subcollection)
    }

    /// `parent_defaults` coerced into field values.
    pub fn parent_defaults(&self) -> Result<Fields> {
        self.parent_defaults
            .iter()
            .map(|(k, v)| Ok((k.clone(), FieldValue::from_json(k, v)?)))
            .collect()
    }

    pub fn validate(&self) -> Result<()> {
        let label = self.records_key();

        for (what, name) in [
            ("parent_collection", Some(&self.parent_collection)),
            ("child_subcollection", Some(&self.child_subcollection)),
            ("reference_collection", self.reference_collection.as_ref()),
        ] {
            if let Some(name) = name {
                if name.trim().is_empty() || name.contains('/') {
                    return Err(FlatViewError::Config(format!(
                        "Profile '{label}': {what} '{name}' must be a non-empty name without '/'"
                    )));
                }
            }
        }

        if let Some(date) = &self.date {
            date.check()?;
        }

        if let Some(rollup) = &self.rollup {
            if rollup.parent_field.trim().is_empty() {
                return Err(FlatViewError::Config(format!(
                    "Profile '{label}': rollup parent_field must not be empty"
                )));
            }
        }

        self.parent_defaults()
            .map_err(|e| FlatViewError::Config(format!("Profile '{label}': {e}")))?;
        Ok(())
    }
}

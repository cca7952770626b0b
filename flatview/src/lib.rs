pub mod value;
pub mod store;
pub mod flatten;
pub mod mapper;
pub mod reconcile;
pub mod cache;
pub mod report;
pub mod auth;
pub mod config;
pub mod dashboard;
pub mod error;

pub use auth::Session;
pub use config::{DashboardConfig, DomainProfile};
pub use dashboard::Dashboard;
pub use error::{ErrorKind, FlatViewError, Result};
pub use flatten::{FlatRecord, ReferenceRecord};
pub use mapper::{MappedRecord, MappedValue};
pub use store::{CollectionPath, DocumentStore, MemoryStore, SqliteStore, StoredDocument};
pub use value::{FieldValue, Fields};

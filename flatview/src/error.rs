use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlatViewError {
    #[error("Store error: {0}")]
    Store(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Document not found: {collection}/{id}")]
    NotFound { collection: String, id: String },

    #[error("Config error: {0}")]
    Config(String),

    #[error("Authentication failed")]
    Unauthenticated,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Coarse classification of a [`FlatViewError`], for callers that branch on
/// the failure category rather than the exact variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Store unreachable or a query failed. Not retried.
    Store,
    /// Missing or malformed input, rejected before any mutation.
    Validation,
    Parse,
    Config,
    Auth,
}

impl FlatViewError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FlatViewError::Store(_)
            | FlatViewError::NotFound { .. }
            | FlatViewError::Io(_)
            | FlatViewError::Json(_)
            | FlatViewError::Sqlite(_) => ErrorKind::Store,
            FlatViewError::Validation(_) => ErrorKind::Validation,
            FlatViewError::Parse(_) => ErrorKind::Parse,
            FlatViewError::Config(_) | FlatViewError::Yaml(_) => ErrorKind::Config,
            FlatViewError::Unauthenticated => ErrorKind::Auth,
        }
    }
}

pub type Result<T> = std::result::Result<T, FlatViewError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_groups_store_failures() {
        let not_found = FlatViewError::NotFound {
            collection: "patients".into(),
            id: "KL-404".into(),
        };
        assert_eq!(not_found.kind(), ErrorKind::Store);
        assert_eq!(not_found.to_string(), "Document not found: patients/KL-404");

        let sqlite = FlatViewError::from(rusqlite::Error::InvalidQuery);
        assert_eq!(sqlite.kind(), ErrorKind::Store);
    }

    #[test]
    fn test_kind_distinguishes_validation_and_parse() {
        assert_eq!(
            FlatViewError::Validation("missing".into()).kind(),
            ErrorKind::Validation
        );
        assert_eq!(FlatViewError::Parse("bad".into()).kind(), ErrorKind::Parse);
        assert_eq!(FlatViewError::Unauthenticated.kind(), ErrorKind::Auth);
    }
}

use crate::config::AuthConfig;
use crate::error::{FlatViewError, Result};
use chrono::{DateTime, Utc};

/// An authenticated principal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    principal: String,
    started_at: DateTime<Utc>,
}

impl Session {
    /// Wrap a principal that a host framework has already authenticated.
    pub fn new(principal: &str) -> Self {
        Session {
            principal: principal.to_string(),
            started_at: Utc::now(),
        }
    }

    pub fn principal(&self) -> &str {
        &self.principal
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }
}

/// Check a username/password pair against the single configured admin.
///
/// A plain comparison against configuration; not a hardened login.
pub fn authenticate(auth: &AuthConfig, username: &str, password: &str) -> Result<Session> {
    if username == auth.username && password == auth.password {
        log::info!("Session started for {username}");
        Ok(Session::new(username))
    } else {
        log::warn!("Rejected login for {username}");
        Err(FlatViewError::Unauthenticated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn admin() -> AuthConfig {
        AuthConfig {
            username: "admin".into(),
            password: "password123".into(),
        }
    }

    #[test]
    fn test_valid_credentials() {
        let session = authenticate(&admin(), "admin", "password123").unwrap();
        assert_eq!(session.principal(), "admin");
    }

    #[test]
    fn test_invalid_credentials() {
        let err = authenticate(&admin(), "admin", "wrong").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Auth);
        assert!(authenticate(&admin(), "root", "password123").is_err());
    }
}

//! User entity and role.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Viewer,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    /// Irreversible password verifier (e.g. an argon2 hash); never the
    /// plaintext password.
    pub password_verifier: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// RFC 5321 caps the total mailbox length at 254 octets.
pub const MAX_EMAIL_LEN: usize = 254;

impl User {
    pub fn normalize_email(email: &str) -> String {
        email.trim().to_lowercase()
    }

    pub fn validate(&self) -> CoreResult<()> {
        if self.email.is_empty() || self.email.len() > MAX_EMAIL_LEN || !self.email.contains('@') {
            return Err(CoreError::Validation {
                field: "email".into(),
                reason: "must be a non-empty address no longer than 254 characters".into(),
            });
        }
        if self.email != Self::normalize_email(&self.email) {
            return Err(CoreError::Validation {
                field: "email".into(),
                reason: "must be lower-cased and trimmed".into(),
            });
        }
        Ok(())
    }

    /// The first user registered on a fresh installation becomes admin;
    /// callers decide this by checking the existing user count is zero
    /// before calling this constructor.
    pub fn new_first_admin(email: &str, password_verifier: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            email: Self::normalize_email(email),
            password_verifier: password_verifier.into(),
            role: Role::Admin,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_email_case_and_whitespace() {
        assert_eq!(User::normalize_email("  Admin@Example.COM "), "admin@example.com");
    }

    #[test]
    fn first_admin_gets_admin_role() {
        let user = User::new_first_admin("a@x.com", "verifier");
        assert_eq!(user.role, Role::Admin);
        assert!(user.validate().is_ok());
    }

    #[test]
    fn rejects_non_normalized_email() {
        let mut user = User::new_first_admin("a@x.com", "verifier");
        user.email = "A@X.com".into();
        assert!(user.validate().is_err());
    }
}

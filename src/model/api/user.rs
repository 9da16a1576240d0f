use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{api::id::ApiId, common::Role, db::user::User};

/// A registration request. New accounts always start as `pending`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

impl RegisterRequest {
    pub fn validate(&self) -> Result<()> {
        validate_name(&self.name)?;
        validate_email(&self.email)?;
        validate_password(&self.password)
    }
}

/// A login request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// The response to a successful login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginResponse {
    pub name: String,
    pub email: String,
    pub role: Role,
}

/// An account as presented to admins. Never includes the password hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: ApiId,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub organization_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

impl From<User> for UserSummary {
    fn from(user: User) -> Self {
        Self {
            id: user.id.into(),
            name: user.user.name,
            email: user.user.email,
            role: user.user.role,
            organization_id: user.user.organization_id,
            created_at: user.user.created_at,
            last_login: user.user.last_login,
        }
    }
}

/// An admin request to create an account directly, skipping approval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUserRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(default = "default_role")]
    pub role: Role,
}

fn default_role() -> Role {
    Role::Voter
}

impl NewUserRequest {
    pub fn validate(&self) -> Result<()> {
        validate_name(&self.name)?;
        validate_email(&self.email)?;
        validate_password(&self.password)?;
        if self.role == Role::Pending {
            return Err(Error::BadRequest(
                "Cannot create an account in the pending role".to_string(),
            ));
        }
        Ok(())
    }
}

/// An admin request to modify an account. Absent fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateUserRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub password: Option<String>,
}

impl UpdateUserRequest {
    pub fn validate(&self) -> Result<()> {
        if let Some(name) = &self.name {
            validate_name(name)?;
        }
        if let Some(password) = &self.password {
            validate_password(password)?;
        }
        Ok(())
    }
}

/// An admin request to approve a pending registration into a real role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproveRequest {
    pub role: Role,
}

fn validate_name(name: &str) -> Result<()> {
    let len = name.trim().chars().count();
    if (2..=100).contains(&len) {
        Ok(())
    } else {
        Err(Error::BadRequest(
            "Name must be between 2 and 100 characters".to_string(),
        ))
    }
}

fn validate_email(email: &str) -> Result<()> {
    let trimmed = email.trim();
    // A full RFC 5322 check buys nothing here; the address is only ever used
    // as a login identifier.
    let well_formed = trimmed.split_once('@').map_or(false, |(local, domain)| {
        !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
    });
    if well_formed {
        Ok(())
    } else {
        Err(Error::BadRequest("Invalid email address".to_string()))
    }
}

fn validate_password(password: &str) -> Result<()> {
    let long_enough = password.chars().count() >= 8;
    let has_letter = password.chars().any(|c| c.is_ascii_alphabetic());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    if long_enough && has_letter && has_digit {
        Ok(())
    } else {
        Err(Error::BadRequest(
            "Password must be at least 8 characters and include letters and numbers".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_rules() {
        assert!(validate_password("abcdef12").is_ok());
        assert!(validate_password("short1").is_err());
        assert!(validate_password("lettersonly").is_err());
        assert!(validate_password("12345678").is_err());
    }

    #[test]
    fn email_rules() {
        assert!(validate_email("voter@example.com").is_ok());
        assert!(validate_email("no-at-sign.example.com").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("voter@nodomain").is_err());
    }

    #[test]
    fn name_rules() {
        assert!(validate_name("Jo").is_ok());
        assert!(validate_name("J").is_err());
        assert!(validate_name(&"x".repeat(101)).is_err());
    }

    #[test]
    fn cannot_create_pending_accounts_directly() {
        let request = NewUserRequest {
            name: "Someone".to_string(),
            email: "someone@example.com".to_string(),
            password: "abcdef12".to_string(),
            role: Role::Pending,
        };
        assert!(request.validate().is_err());
    }
}

use std::ops::{Deref, DerefMut};

use argon2::Config as Argon2Config;
use chrono::{DateTime, Utc};
use mongodb::bson::{doc, serde_helpers::chrono_datetime_as_bson_datetime};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::Result;
use crate::model::{
    common::Role,
    mongodb::{serde_option_datetime, Coll, Id},
};

/// Core account data, as stored in the database.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCore {
    pub name: String,
    /// Lowercased; uniqueness is enforced by an index.
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub organization_id: Option<String>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(default, with = "serde_option_datetime")]
    pub last_login: Option<DateTime<Utc>>,
}

impl UserCore {
    /// Create a new account with the given role, hashing the password.
    pub fn new(
        name: impl Into<String>,
        email: impl AsRef<str>,
        password: impl AsRef<str>,
        role: Role,
    ) -> Self {
        Self {
            name: name.into(),
            email: email.as_ref().trim().to_lowercase(),
            password_hash: hash_password(password.as_ref()),
            role,
            organization_id: None,
            created_at: Utc::now(),
            last_login: None,
        }
    }

    /// Check whether the given password is correct.
    pub fn verify_password<T: AsRef<[u8]>>(&self, password: T) -> bool {
        // Unwrap safe because accounts are only ever created via `new` or
        // `set_password`, so the hash is always well-formed.
        argon2::verify_encoded(&self.password_hash, password.as_ref()).unwrap()
    }

    /// Replace the password, hashing the new one.
    pub fn set_password(&mut self, password: impl AsRef<str>) {
        self.password_hash = hash_password(password.as_ref());
    }
}

/// Hash a password with a fresh random salt.
fn hash_password(password: &str) -> String {
    // 16 bytes is recommended for password hashing:
    //  https://en.wikipedia.org/wiki/Argon2
    let mut salt = [0_u8; 16];
    rand::thread_rng().fill(&mut salt);
    argon2::hash_encoded(password.as_bytes(), &salt, &Argon2Config::default())
        .unwrap() // Safe because the default `Config` is valid.
}

/// An account without an ID.
pub type NewUser = UserCore;

/// An account from the database, with its unique ID.
#[derive(Debug, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub user: UserCore,
}

impl Deref for User {
    type Target = UserCore;

    fn deref(&self) -> &Self::Target {
        &self.user
    }
}

impl DerefMut for User {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.user
    }
}

/// Ensure there is at least one admin account, seeding the configured one if
/// necessary. Without this, a fresh deployment would have nobody able to
/// approve registrations.
pub async fn ensure_admin_exists(db: &mongodb::Database, config: &Config) -> Result<()> {
    let admins = Coll::<User>::from_db(db)
        .count_documents(doc! {"role": Role::Admin}, None)
        .await?;
    if admins == 0 {
        let admin = NewUser::new(
            "Administrator",
            config.admin_email(),
            config.admin_password(),
            Role::Admin,
        );
        Coll::<NewUser>::from_db(db).insert_one(admin, None).await?;
        warn!(
            "No admin account found; seeded default admin {}",
            config.admin_email()
        );
    }
    Ok(())
}

/// Example data for tests.
#[cfg(test)]
mod examples {
    use super::*;

    pub const EXAMPLE_PASSWORD: &str = "correct-horse-battery-1";
    pub const ADMIN_EMAIL: &str = "test.admin@example.com";
    pub const MANAGER_EMAIL: &str = "test.manager@example.com";
    pub const VOTER_EMAIL: &str = "test.voter@example.com";
    pub const PENDING_EMAIL: &str = "test.pending@example.com";

    impl UserCore {
        pub fn example_admin() -> Self {
            Self::new("Test Admin", ADMIN_EMAIL, EXAMPLE_PASSWORD, Role::Admin)
        }

        pub fn example_manager() -> Self {
            Self::new("Test Manager", MANAGER_EMAIL, EXAMPLE_PASSWORD, Role::Manager)
        }

        pub fn example_voter() -> Self {
            Self::new("Test Voter", VOTER_EMAIL, EXAMPLE_PASSWORD, Role::Voter)
        }

        pub fn example_pending() -> Self {
            Self::new("Test Pending", PENDING_EMAIL, EXAMPLE_PASSWORD, Role::Pending)
        }
    }
}

#[cfg(test)]
pub use examples::{ADMIN_EMAIL, EXAMPLE_PASSWORD, MANAGER_EMAIL, PENDING_EMAIL, VOTER_EMAIL};

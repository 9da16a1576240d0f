use std::fmt::{self, Display, Formatter};

use mongodb::bson::{to_bson, Bson};
use rocket::FromFormField;
use serde::{Deserialize, Serialize};

/// Privilege levels of an account.
///
/// Freshly-registered accounts are `Pending` until an admin approves them
/// into one of the real roles.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, FromFormField)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Manager,
    Voter,
    Pending,
}

impl Role {
    /// Can this role administer elections (create, close)?
    pub fn is_election_admin(self) -> bool {
        matches!(self, Self::Admin | Self::Manager)
    }
}

impl Display for Role {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::Admin => "admin",
                Self::Manager => "manager",
                Self::Voter => "voter",
                Self::Pending => "pending",
            }
        )
    }
}

impl From<Role> for Bson {
    fn from(role: Role) -> Self {
        to_bson(&role).expect("Serialisation is infallible")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialises_as_lowercase_string() {
        assert_eq!(Bson::from(Role::Manager), Bson::String("manager".into()));
        assert_eq!(Bson::from(Role::Pending), Bson::String("pending".into()));
    }
}

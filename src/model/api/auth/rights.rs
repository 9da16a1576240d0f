use crate::model::common::Role;

/// A set of roles permitted to use an endpoint.
///
/// Implementors are zero-sized markers used as the type parameter of
/// [`super::AuthToken`], so the signature of a route documents who may call
/// it. The core operations re-check the caller's role themselves; the typed
/// guard exists to reject bad requests early.
pub trait Rights {
    /// Human-readable description for error messages.
    const DESCRIPTION: &'static str;

    /// Does the given role satisfy these rights?
    fn permits(role: Role) -> bool;
}

/// Any signed-in account, including pending ones.
pub struct AnyUser;

impl Rights for AnyUser {
    const DESCRIPTION: &'static str = "any account";

    fn permits(_: Role) -> bool {
        true
    }
}

/// Voter accounts only.
pub struct Voter;

impl Rights for Voter {
    const DESCRIPTION: &'static str = "a voter";

    fn permits(role: Role) -> bool {
        role == Role::Voter
    }
}

/// Manager accounts only.
pub struct Manager;

impl Rights for Manager {
    const DESCRIPTION: &'static str = "a manager";

    fn permits(role: Role) -> bool {
        role == Role::Manager
    }
}

/// Admin accounts only.
pub struct Admin;

impl Rights for Admin {
    const DESCRIPTION: &'static str = "an admin";

    fn permits(role: Role) -> bool {
        role == Role::Admin
    }
}

/// Manager or admin accounts.
pub struct ManagerOrAdmin;

impl Rights for ManagerOrAdmin {
    const DESCRIPTION: &'static str = "a manager or admin";

    fn permits(role: Role) -> bool {
        role.is_election_admin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_permissions() {
        assert!(Voter::permits(Role::Voter));
        assert!(!Voter::permits(Role::Manager));
        assert!(!Voter::permits(Role::Pending));

        assert!(Manager::permits(Role::Manager));
        assert!(!Manager::permits(Role::Admin));

        assert!(ManagerOrAdmin::permits(Role::Manager));
        assert!(ManagerOrAdmin::permits(Role::Admin));
        assert!(!ManagerOrAdmin::permits(Role::Voter));

        assert!(AnyUser::permits(Role::Pending));
    }
}

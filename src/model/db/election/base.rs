use std::ops::{Deref, DerefMut};

use chrono::{DateTime, Utc};
use mongodb::bson::{doc, serde_helpers::chrono_datetime_as_bson_datetime};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{
    api::auth::Caller,
    common::{ElectionStatus, Role},
    mongodb::{serde_option_datetime, Coll, Id},
};

/// A single candidate on the ballot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    /// Unique within the election, assigned at creation, immutable afterward.
    #[serde(rename = "_id")]
    pub id: Id,
    pub name: String,
}

/// Core election data, as stored in the database.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct ElectionCore {
    pub title: String,
    pub candidates: Vec<Candidate>,
    pub status: ElectionStatus,
    /// One-way flag controlling voter-visible result disclosure.
    /// Invariant: `published` implies `status == Closed`.
    pub published: bool,
    /// Optional deadline. Expiry is enforced lazily at the point of use, not
    /// by a background timer; see [`Election::find_enforcing_deadline`].
    #[serde(default, with = "serde_option_datetime")]
    pub end_at: Option<DateTime<Utc>>,
    pub created_by: Id,
    pub organization_id: Option<String>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

impl ElectionCore {
    /// Create a new election. Candidates get their IDs assigned here.
    pub fn new(
        title: String,
        candidate_names: Vec<String>,
        end_at: Option<DateTime<Utc>>,
        created_by: Id,
        organization_id: Option<String>,
    ) -> Self {
        Self {
            title,
            candidates: candidate_names
                .into_iter()
                .map(|name| Candidate { id: Id::new(), name })
                .collect(),
            status: ElectionStatus::Open,
            published: false,
            end_at,
            created_by,
            organization_id,
            created_at: Utc::now(),
        }
    }

    /// Look up a candidate by the string form of its ID.
    ///
    /// Candidate IDs arriving in vote requests are treated as opaque strings
    /// and matched by equality; a malformed ID simply matches nothing.
    pub fn candidate(&self, candidate_id: &str) -> Option<&Candidate> {
        self.candidates
            .iter()
            .find(|candidate| candidate.id.to_string() == candidate_id)
    }

    /// Has the deadline passed at the given instant?
    pub fn deadline_passed(&self, now: DateTime<Utc>) -> bool {
        self.end_at.map_or(false, |end_at| end_at <= now)
    }

    /// Fail with `Forbidden` unless the caller may act on this election's
    /// tenant scope.
    pub fn check_scope(&self, caller: &Caller) -> Result<()> {
        match &self.organization_id {
            Some(org) if caller.organization_id.as_deref() != Some(org.as_str()) => {
                Err(Error::Forbidden(
                    "Election belongs to a different organization".to_string(),
                ))
            }
            _ => Ok(()),
        }
    }
}

/// An election without an ID.
pub type NewElection = ElectionCore;

/// An election from the database, with its unique ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Election {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub election: ElectionCore,
}

impl Deref for Election {
    type Target = ElectionCore;

    fn deref(&self) -> &Self::Target {
        &self.election
    }
}

impl DerefMut for Election {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.election
    }
}

impl Election {
    /// Fetch the election with the given ID, without deadline enforcement.
    pub async fn find_by_id(elections: &Coll<Election>, election_id: Id) -> Result<Election> {
        elections
            .find_one(election_id.as_doc(), None)
            .await?
            .ok_or_else(|| Error::not_found(format!("Election {} not found", election_id)))
    }

    /// Fetch the election with the given ID, first flipping it to closed if
    /// its deadline has passed while it was still open.
    ///
    /// Every point-of-use read goes through here, so a vote arriving after
    /// the deadline sees a closed election even if nothing else has touched
    /// it since expiry. The flip is a one-way filtered update, so concurrent
    /// callers cannot disagree about the outcome.
    pub async fn find_enforcing_deadline(
        elections: &Coll<Election>,
        election_id: Id,
    ) -> Result<Election> {
        let mut election = Self::find_by_id(elections, election_id).await?;
        if election.status == ElectionStatus::Open && election.deadline_passed(Utc::now()) {
            Self::close_if_open(elections, election_id).await?;
            election.status = ElectionStatus::Closed;
        }
        Ok(election)
    }

    /// Atomically flip `open` to `closed`. Returns whether this call did the
    /// flip; a closed election is left untouched.
    pub async fn close_if_open(elections: &Coll<Election>, election_id: Id) -> Result<bool> {
        let filter = doc! {
            "_id": *election_id,
            "status": ElectionStatus::Open,
        };
        let update = doc! {
            "$set": { "status": ElectionStatus::Closed },
        };
        let result = elections.update_one(filter, update, None).await?;
        Ok(result.modified_count == 1)
    }

    /// Close the election. Fails with `InvalidState` when it is already
    /// closed (including having expired); closing is never a silent no-op.
    pub async fn close(
        elections: &Coll<Election>,
        election_id: Id,
        caller: &Caller,
    ) -> Result<()> {
        caller.require(Role::is_election_admin, "close elections")?;

        let election = Self::find_enforcing_deadline(elections, election_id).await?;
        election.check_scope(caller)?;
        if election.status == ElectionStatus::Closed {
            return Err(Error::InvalidState(format!(
                "Election {} is already closed",
                election_id
            )));
        }

        // The filtered update is the transition authority; losing the race
        // against a concurrent close reports the same error as above.
        if Self::close_if_open(elections, election_id).await? {
            info!("Election {} closed by {}", election_id, caller.id);
            Ok(())
        } else {
            Err(Error::InvalidState(format!(
                "Election {} is already closed",
                election_id
            )))
        }
    }

    /// Publish the results. Only valid on a closed, unpublished election;
    /// publication is one-way.
    pub async fn publish(
        elections: &Coll<Election>,
        election_id: Id,
        caller: &Caller,
    ) -> Result<()> {
        caller.require(|role| role == Role::Manager, "publish results")?;

        let election = Self::find_enforcing_deadline(elections, election_id).await?;
        election.check_scope(caller)?;
        if election.status != ElectionStatus::Closed {
            return Err(Error::InvalidState(format!(
                "Election {} must be closed before publishing",
                election_id
            )));
        }
        if election.published {
            return Err(Error::InvalidState(format!(
                "Election {} results are already published",
                election_id
            )));
        }

        let filter = doc! {
            "_id": *election_id,
            "status": ElectionStatus::Closed,
            "published": false,
        };
        let update = doc! {
            "$set": { "published": true },
        };
        let result = elections.update_one(filter, update, None).await?;
        if result.modified_count == 1 {
            info!("Election {} results published by {}", election_id, caller.id);
            Ok(())
        } else {
            Err(Error::InvalidState(format!(
                "Election {} results are already published",
                election_id
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::Duration;

    fn example() -> ElectionCore {
        ElectionCore::new(
            "Student Union President".to_string(),
            vec![
                "Alice Appleseed".to_string(),
                "Bob Birch".to_string(),
                "Carol Cedar".to_string(),
            ],
            None,
            Id::new(),
            None,
        )
    }

    #[test]
    fn new_elections_are_open_and_unpublished() {
        let election = example();
        assert_eq!(election.status, ElectionStatus::Open);
        assert!(!election.published);
        assert_eq!(election.candidates.len(), 3);
    }

    #[test]
    fn candidate_ids_are_unique() {
        let election = example();
        let first = election.candidates[0].id;
        assert!(election
            .candidates
            .iter()
            .skip(1)
            .all(|candidate| candidate.id != first));
    }

    #[test]
    fn candidate_lookup_is_by_string_equality() {
        let election = example();
        let id = election.candidates[1].id.to_string();
        assert_eq!(election.candidate(&id).unwrap().name, "Bob Birch");
        assert!(election.candidate("definitely-not-an-id").is_none());
        assert!(election.candidate(&Id::new().to_string()).is_none());
    }

    #[test]
    fn deadline_comparison() {
        let mut election = example();
        let now = Utc::now();
        assert!(!election.deadline_passed(now));

        election.end_at = Some(now - Duration::minutes(5));
        assert!(election.deadline_passed(now));

        election.end_at = Some(now + Duration::minutes(5));
        assert!(!election.deadline_passed(now));
    }

    #[test]
    fn tenant_scope_check() {
        let mut election = example();
        let mut caller = Caller {
            id: Id::new(),
            role: Role::Manager,
            organization_id: None,
        };

        // Unscoped elections are open to anyone.
        assert!(election.check_scope(&caller).is_ok());

        // Scoped elections require a matching organization.
        election.organization_id = Some("acme".to_string());
        assert!(election.check_scope(&caller).is_err());
        caller.organization_id = Some("acme".to_string());
        assert!(election.check_scope(&caller).is_ok());
        caller.organization_id = Some("globex".to_string());
        assert!(election.check_scope(&caller).is_err());
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{
    api::{auth::Caller, id::ApiId},
    common::ElectionStatus,
    db::election::{Election, NewElection},
    db::vote::Vote,
};

/// A requested election, as submitted by a manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionSpec {
    pub title: String,
    pub candidates: Vec<CandidateSpec>,
    #[serde(default)]
    pub end_at: Option<DateTime<Utc>>,
}

/// A requested candidate; the ID is assigned server-side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateSpec {
    pub name: String,
}

impl ElectionSpec {
    /// Reject obviously malformed specs before touching the database.
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(Error::BadRequest("title and candidates required".to_string()));
        }
        if self.candidates.is_empty() {
            return Err(Error::BadRequest("title and candidates required".to_string()));
        }
        if self.candidates.iter().any(|c| c.name.trim().is_empty()) {
            return Err(Error::BadRequest(
                "candidate names must be non-empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Convert into a storable election created by the given caller.
    pub fn into_election(self, caller: &Caller) -> NewElection {
        NewElection::new(
            self.title,
            self.candidates.into_iter().map(|c| c.name).collect(),
            self.end_at,
            caller.id,
            caller.organization_id.clone(),
        )
    }
}

/// Basic election info, as returned by the listing endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionSummary {
    pub id: ApiId,
    pub title: String,
    pub status: ElectionStatus,
    pub published: bool,
    pub end_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<Election> for ElectionSummary {
    fn from(election: Election) -> Self {
        Self {
            id: election.id.into(),
            title: election.election.title,
            status: election.election.status,
            published: election.election.published,
            end_at: election.election.end_at,
            created_at: election.election.created_at,
        }
    }
}

/// Full election info, as returned on creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionDescription {
    pub id: ApiId,
    pub title: String,
    pub candidates: Vec<CandidateDescription>,
    pub status: ElectionStatus,
    pub published: bool,
    pub end_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateDescription {
    pub id: ApiId,
    pub name: String,
}

impl From<Election> for ElectionDescription {
    fn from(election: Election) -> Self {
        Self {
            id: election.id.into(),
            title: election.election.title,
            candidates: election
                .election
                .candidates
                .into_iter()
                .map(|candidate| CandidateDescription {
                    id: candidate.id.into(),
                    name: candidate.name,
                })
                .collect(),
            status: election.election.status,
            published: election.election.published,
            end_at: election.election.end_at,
            created_at: election.election.created_at,
        }
    }
}

/// The receipt returned to a voter for a successfully recorded vote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteReceipt {
    pub election_id: ApiId,
    pub voter_id: ApiId,
    pub candidate_id: ApiId,
    pub created_at: DateTime<Utc>,
}

impl From<Vote> for VoteReceipt {
    fn from(vote: Vote) -> Self {
        Self {
            election_id: vote.vote.election_id.into(),
            voter_id: vote.vote.voter_id.into(),
            candidate_id: vote.vote.candidate_id.into(),
            created_at: vote.vote.created_at,
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    use crate::model::{common::Role, mongodb::Id};

    fn caller() -> Caller {
        Caller {
            id: Id::new(),
            role: Role::Manager,
            organization_id: None,
        }
    }

    #[test]
    fn validation_rejects_empty_title() {
        let mut spec = ElectionSpec::example();
        spec.title = "   ".to_string();
        assert!(spec.validate().is_err());
    }

    #[test]
    fn validation_rejects_empty_candidates() {
        let mut spec = ElectionSpec::example();
        spec.candidates.clear();
        assert!(spec.validate().is_err());

        let mut spec = ElectionSpec::example();
        spec.candidates[1].name = "".to_string();
        assert!(spec.validate().is_err());
    }

    #[test]
    fn spec_converts_to_open_election() {
        let caller = caller();
        let election = ElectionSpec::example().into_election(&caller);
        assert_eq!(election.status, ElectionStatus::Open);
        assert!(!election.published);
        assert_eq!(election.created_by, caller.id);
        assert_eq!(
            election
                .candidates
                .iter()
                .map(|c| c.name.as_str())
                .collect::<Vec<_>>(),
            vec!["Alice Appleseed", "Bob Birch", "Carol Cedar"],
        );
    }
}

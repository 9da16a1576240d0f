use std::ops::Deref;

use chrono::{DateTime, Utc};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{
    api::auth::Caller,
    common::{ElectionStatus, Role},
    mongodb::{is_duplicate_key_error, Coll, Id},
};

use super::election::Election;

/// Core vote data, as stored in the database. One document per ballot;
/// never mutated or deleted once written.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct VoteCore {
    pub election_id: Id,
    pub voter_id: Id,
    pub candidate_id: Id,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    pub organization_id: Option<String>,
}

/// A vote without an ID.
pub type NewVote = VoteCore;

/// A vote from the database, with its unique ID.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vote {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub vote: VoteCore,
}

impl Deref for Vote {
    type Target = VoteCore;

    fn deref(&self) -> &Self::Target {
        &self.vote
    }
}

impl Vote {
    /// Record the caller's vote in the given election.
    ///
    /// Preconditions are checked in order, the first failure determining the
    /// error: the caller is a voter, the election exists, it is open after
    /// the lazy deadline check, the tenant scope matches, and the candidate
    /// is on the ballot.
    ///
    /// There is deliberately no "has this voter already voted" lookup: the
    /// insert itself is the uniqueness check. Two concurrent requests from
    /// the same voter both reach the insert, the `(election_id, voter_id)`
    /// unique index rejects the loser, and that rejection is translated into
    /// `Conflict` here.
    pub async fn cast(
        elections: &Coll<Election>,
        new_votes: &Coll<NewVote>,
        election_id: Id,
        candidate_id: &str,
        caller: &Caller,
    ) -> Result<Vote> {
        // The route guard already requires a voter, but an operation this
        // sensitive re-checks rather than trusting upstream gating.
        caller.require(|role| role == Role::Voter, "vote")?;

        let election = Election::find_enforcing_deadline(elections, election_id).await?;
        if election.status != ElectionStatus::Open {
            return Err(Error::InvalidState(format!(
                "Election {} is not open",
                election_id
            )));
        }
        election.check_scope(caller)?;

        let candidate = election.candidate(candidate_id).ok_or_else(|| {
            Error::BadRequest(format!(
                "No candidate '{}' in election {}",
                candidate_id, election_id
            ))
        })?;

        let vote = NewVote {
            election_id,
            voter_id: caller.id,
            candidate_id: candidate.id,
            created_at: Utc::now(),
            organization_id: election.organization_id.clone(),
        };
        match new_votes.insert_one(&vote, None).await {
            Ok(insert) => {
                // Valid because the ID comes directly from the DB.
                let id: Id = insert.inserted_id.as_object_id().unwrap().into();
                debug!("Recorded vote {} in election {}", id, election_id);
                Ok(Vote { id, vote })
            }
            Err(err) if is_duplicate_key_error(&err) => Err(Error::Conflict(
                "You have already voted in this election".to_string(),
            )),
            Err(err) => Err(err.into()),
        }
    }
}

use rocket::{http::Status, response::status, serde::json::Json, Route};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::{
    api::{
        auth::{rights::Voter, AuthToken},
        election::VoteReceipt,
    },
    db::{election::Election, vote::{NewVote, Vote}},
    mongodb::{Coll, Id},
};

pub fn routes() -> Vec<Route> {
    routes![cast_vote]
}

#[post("/elections/<election_id>/vote", data = "<ballot>", format = "json")]
async fn cast_vote(
    token: AuthToken<Voter>,
    election_id: Id,
    ballot: Json<BallotSpec>,
    elections: Coll<Election>,
    new_votes: Coll<NewVote>,
) -> Result<status::Custom<Json<VoteReceipt>>> {
    let vote = Vote::cast(
        &elections,
        &new_votes,
        election_id,
        &ballot.candidate_id,
        &token.caller(),
    )
    .await?;
    Ok(status::Custom(Status::Created, Json(vote.into())))
}

/// A ballot the user wishes to cast, naming a specific candidate.
/// The candidate ID is an opaque string matched against the ballot.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
struct BallotSpec {
    pub candidate_id: String,
}

use chrono::Utc;
use rocket::{
    futures::TryStreamExt,
    http::Status,
    response::status,
    serde::json::Json,
    Route, State,
};

use crate::error::Result;
use crate::model::{
    api::{
        auth::{
            rights::{AnyUser, Manager, ManagerOrAdmin},
            AuthToken,
        },
        election::{ElectionDescription, ElectionSpec, ElectionSummary},
    },
    common::ElectionStatus,
    db::election::{Election, ElectionClosers, NewElection},
    mongodb::{Coll, Id},
};

pub fn routes() -> Vec<Route> {
    routes![
        create_election,
        list_elections,
        close_election,
        publish_election,
    ]
}

#[post("/elections", data = "<spec>", format = "json")]
async fn create_election(
    token: AuthToken<ManagerOrAdmin>,
    spec: Json<ElectionSpec>,
    new_elections: Coll<NewElection>,
    elections: Coll<Election>,
    closers: &State<ElectionClosers>,
) -> Result<status::Custom<Json<ElectionDescription>>> {
    let spec = spec.0;
    spec.validate()?;

    let election: NewElection = spec.into_election(&token.caller());
    let new_id: Id = new_elections
        .insert_one(&election, None)
        .await?
        .inserted_id
        .as_object_id()
        .unwrap() // Valid because the ID comes directly from the DB.
        .into();
    let election = Election {
        id: new_id,
        election,
    };
    info!("Election {} created by {}", election.id, token.id);

    // Accelerate the deadline flip; the read-time check stays authoritative.
    if election.end_at.is_some() {
        closers.schedule(elections.clone(), &election).await;
    }

    Ok(status::Custom(Status::Created, Json(election.into())))
}

#[get("/elections")]
async fn list_elections(
    _token: AuthToken<AnyUser>,
    elections: Coll<Election>,
) -> Result<Json<Vec<ElectionSummary>>> {
    let all: Vec<Election> = elections.find(None, None).await?.try_collect().await?;

    // Lazy deadline enforcement applies to listings too: an expired election
    // must never be reported as open.
    let now = Utc::now();
    let mut summaries = Vec::with_capacity(all.len());
    for mut election in all {
        if election.status == ElectionStatus::Open && election.deadline_passed(now) {
            Election::close_if_open(&elections, election.id).await?;
            election.status = ElectionStatus::Closed;
        }
        summaries.push(election.into());
    }

    Ok(Json(summaries))
}

#[post("/elections/<election_id>/close")]
async fn close_election(
    token: AuthToken<ManagerOrAdmin>,
    election_id: Id,
    elections: Coll<Election>,
    closers: &State<ElectionClosers>,
) -> Result<()> {
    Election::close(&elections, election_id, &token.caller()).await?;
    // The scheduled closer has nothing left to do.
    closers.cancel(election_id).await;
    Ok(())
}

#[post("/elections/<election_id>/publish")]
async fn publish_election(
    token: AuthToken<Manager>,
    election_id: Id,
    elections: Coll<Election>,
) -> Result<()> {
    Election::publish(&elections, election_id, &token.caller()).await
}

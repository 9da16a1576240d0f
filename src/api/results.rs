use std::io::Cursor;

use mongodb::bson::doc;
use rocket::{
    futures::TryStreamExt,
    http::ContentType,
    response::{Responder, Response},
    serde::json::Json,
    Request, Route,
};

use crate::error::{Error, Result};
use crate::model::{
    api::{
        auth::{
            rights::{AnyUser, Manager, ManagerOrAdmin},
            AuthToken,
        },
        results::{raw_csv, ElectionResults},
    },
    common::Role,
    db::{election::Election, vote::Vote},
    mongodb::{Coll, Id},
};

pub fn routes() -> Vec<Route> {
    routes![election_results, results_csv, results_raw_csv]
}

/// The aggregated tally as JSON. Only disclosed to voters, and only once the
/// election's results have been published.
#[get("/elections/<election_id>/results")]
async fn election_results(
    token: AuthToken<AnyUser>,
    election_id: Id,
    elections: Coll<Election>,
    votes: Coll<Vote>,
) -> Result<Json<ElectionResults>> {
    let election = Election::find_enforcing_deadline(&elections, election_id).await?;

    if !(election.published && token.role == Role::Voter) {
        return Err(Error::Forbidden("Results not available".to_string()));
    }

    let results = ElectionResults::aggregate(&election, &votes).await?;
    Ok(Json(results))
}

/// The aggregated tally as CSV, for managers. Not gated on publication:
/// managers may inspect the tally before deciding to publish.
#[get("/elections/<election_id>/results.csv")]
async fn results_csv(
    _token: AuthToken<Manager>,
    election_id: Id,
    elections: Coll<Election>,
    votes: Coll<Vote>,
) -> Result<CsvFile> {
    let election = Election::find_enforcing_deadline(&elections, election_id).await?;
    let results = ElectionResults::aggregate(&election, &votes).await?;
    Ok(CsvFile {
        filename: format!("results_{}.csv", election_id),
        content: results.to_csv(),
    })
}

/// Every individual vote as CSV, for audit. No aggregation, no publication
/// gate; manager or admin only.
#[get("/elections/<election_id>/results_raw.csv")]
async fn results_raw_csv(
    _token: AuthToken<ManagerOrAdmin>,
    election_id: Id,
    elections: Coll<Election>,
    votes: Coll<Vote>,
) -> Result<CsvFile> {
    let election = Election::find_enforcing_deadline(&elections, election_id).await?;
    let votes: Vec<Vote> = votes
        .find(doc! { "election_id": *election.id }, None)
        .await?
        .try_collect()
        .await?;
    Ok(CsvFile {
        filename: format!("results_raw_{}.csv", election_id),
        content: raw_csv(election.id, &votes),
    })
}

/// A CSV download: `text/csv` with an attachment filename.
pub struct CsvFile {
    filename: String,
    content: String,
}

impl<'r, 'o: 'r> Responder<'r, 'o> for CsvFile {
    fn respond_to(self, _: &'r Request<'_>) -> rocket::response::Result<'o> {
        Response::build()
            .header(ContentType::CSV)
            .raw_header(
                "Content-Disposition",
                format!("attachment; filename={}", self.filename),
            )
            .sized_body(self.content.len(), Cursor::new(self.content))
            .ok()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use mongodb::Database;
    use rocket::{http::Status, local::asynchronous::Client, serde::json::serde_json};

    use crate::model::{
        api::{auth::Caller, election::ElectionSpec, results::{AGGREGATE_CSV_HEADER, RAW_CSV_HEADER}},
        common::ElectionStatus,
        db::vote::NewVote,
    };

    use super::*;

    #[backend_test(voter)]
    async fn results_hidden_until_published(client: Client, db: Database) {
        let election = insert_election(&db, false, false).await;

        let response = client
            .get(uri!(election_results(election.id)))
            .dispatch()
            .await;
        assert_eq!(Status::Forbidden, response.status());

        // Closing alone is not enough.
        let election = insert_election(&db, true, false).await;
        let response = client
            .get(uri!(election_results(election.id)))
            .dispatch()
            .await;
        assert_eq!(Status::Forbidden, response.status());
    }

    #[backend_test(voter)]
    async fn published_results_in_candidate_order(client: Client, db: Database) {
        let election = insert_election(&db, true, true).await;
        let c1 = election.candidates[0].id;
        let c2 = election.candidates[1].id;

        // Ballots {c1, c1, c2} from three distinct voters; the third
        // candidate gets none.
        insert_votes(&db, &election, &[c1, c1, c2]).await;

        let response = client
            .get(uri!(election_results(election.id)))
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        let results: ElectionResults =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();

        assert_eq!(*results.election_id, election.id);
        assert_eq!(results.title, election.title);
        let rows: Vec<(Id, u64)> = results
            .results
            .iter()
            .map(|row| (*row.candidate_id, row.total_votes))
            .collect();
        assert_eq!(
            rows,
            vec![(c1, 2), (c2, 1), (election.candidates[2].id, 0)]
        );
    }

    #[backend_test(manager)]
    async fn managers_cannot_see_the_json_tally(client: Client, db: Database) {
        // Even once published, the JSON summary is the voters' view.
        let election = insert_election(&db, true, true).await;
        let response = client
            .get(uri!(election_results(election.id)))
            .dispatch()
            .await;
        assert_eq!(Status::Forbidden, response.status());
    }

    #[backend_test(manager)]
    async fn csv_export_ignores_publication(client: Client, db: Database) {
        let election = insert_election(&db, false, false).await;
        let c2 = election.candidates[1].id;
        insert_votes(&db, &election, &[c2]).await;

        let response = client.get(uri!(results_csv(election.id))).dispatch().await;
        assert_eq!(Status::Ok, response.status());
        assert_eq!(response.content_type(), Some(ContentType::CSV));

        let body = response.into_string().await.unwrap();
        let lines: Vec<&str> = body.lines().collect();
        assert_eq!(lines[0], AGGREGATE_CSV_HEADER);
        assert_eq!(lines.len(), 1 + election.candidates.len());
        assert_eq!(
            lines[2],
            format!(
                "{},{},\"{}\",1",
                election.id, c2, election.candidates[1].name
            )
        );
    }

    #[backend_test(voter)]
    async fn voters_cannot_export_csv(client: Client, db: Database) {
        let election = insert_election(&db, true, true).await;

        let response = client.get(uri!(results_csv(election.id))).dispatch().await;
        assert_eq!(Status::Forbidden, response.status());
        let response = client
            .get(uri!(results_raw_csv(election.id)))
            .dispatch()
            .await;
        assert_eq!(Status::Forbidden, response.status());
    }

    #[backend_test(admin)]
    async fn aggregate_csv_is_manager_only(client: Client, db: Database) {
        // Admins get the raw audit export but not the aggregate one.
        let election = insert_election(&db, false, false).await;

        let response = client.get(uri!(results_csv(election.id))).dispatch().await;
        assert_eq!(Status::Forbidden, response.status());

        let response = client
            .get(uri!(results_raw_csv(election.id)))
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
    }

    #[backend_test(manager)]
    async fn raw_export_lists_every_vote(client: Client, db: Database) {
        let election = insert_election(&db, false, false).await;
        let c1 = election.candidates[0].id;
        let c2 = election.candidates[1].id;
        insert_votes(&db, &election, &[c1, c2, c2]).await;

        let response = client
            .get(uri!(results_raw_csv(election.id)))
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());

        let body = response.into_string().await.unwrap();
        let lines: Vec<&str> = body.lines().collect();
        assert_eq!(lines[0], RAW_CSV_HEADER);
        assert_eq!(lines.len(), 4); // header + one row per vote

        // Each row names the election and a real candidate.
        for line in &lines[1..] {
            let fields: Vec<&str> = line.split(',').collect();
            assert_eq!(fields.len(), 4);
            assert_eq!(fields[0], election.id.to_string());
            assert!(election.candidate(fields[2]).is_some());
        }
    }

    #[backend_test(voter)]
    async fn results_for_unknown_election(client: Client) {
        let unknown = Id::new();
        let response = client
            .get(uri!(election_results(unknown)))
            .dispatch()
            .await;
        assert_eq!(Status::NotFound, response.status());
    }

    async fn insert_election(db: &Database, closed: bool, published: bool) -> Election {
        let caller = Caller {
            id: Id::new(),
            role: crate::model::common::Role::Manager,
            organization_id: None,
        };
        let mut election = Election {
            id: Id::new(),
            election: ElectionSpec::example().into_election(&caller),
        };
        if closed {
            election.status = ElectionStatus::Closed;
        }
        election.published = published;
        Coll::<Election>::from_db(db)
            .insert_one(&election, None)
            .await
            .unwrap();
        election
    }

    /// Insert one vote per entry, each from a distinct voter.
    async fn insert_votes(db: &Database, election: &Election, candidates: &[Id]) {
        let votes: Vec<NewVote> = candidates
            .iter()
            .map(|candidate_id| NewVote {
                election_id: election.id,
                voter_id: Id::new(),
                candidate_id: *candidate_id,
                created_at: Utc::now(),
                organization_id: None,
            })
            .collect();
        Coll::<NewVote>::from_db(db)
            .insert_many(votes, None)
            .await
            .unwrap();
    }
}

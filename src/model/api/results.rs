use std::collections::HashMap;

use chrono::SecondsFormat;
use mongodb::bson::{doc, Bson};
use rocket::futures::TryStreamExt;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::{
    api::id::ApiId,
    db::{election::Election, vote::Vote},
    mongodb::{Coll, Id},
};

/// Header of the aggregated results export.
pub const AGGREGATE_CSV_HEADER: &str = "election_id,candidate_id,candidate_name,total_votes";
/// Header of the raw per-ballot export.
pub const RAW_CSV_HEADER: &str = "election_id,voter_id,candidate_id,timestamp";

/// One tally row: a candidate and their vote count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateTally {
    pub candidate_id: ApiId,
    pub candidate_name: String,
    pub total_votes: u64,
}

/// Aggregated results of a single election.
///
/// Rows follow the election's candidate order (not vote count), and every
/// candidate appears, including those with zero votes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionResults {
    pub election_id: ApiId,
    pub title: String,
    pub results: Vec<CandidateTally>,
}

impl ElectionResults {
    /// Tally the election's votes, grouping in the database.
    pub async fn aggregate(election: &Election, votes: &Coll<Vote>) -> Result<Self> {
        let pipeline = vec![
            doc! { "$match": { "election_id": *election.id } },
            doc! { "$group": { "_id": "$candidate_id", "total": { "$sum": 1 } } },
        ];

        let mut counts = HashMap::new();
        let mut groups = votes.aggregate(pipeline, None).await?;
        while let Some(group) = groups.try_next().await? {
            let candidate_id: Id = match group.get("_id") {
                Some(Bson::ObjectId(id)) => (*id).into(),
                _ => continue,
            };
            // `$sum` widens to 64 bits only when the count outgrows an i32.
            let total = match group.get("total") {
                Some(Bson::Int32(n)) => *n as u64,
                Some(Bson::Int64(n)) => *n as u64,
                _ => continue,
            };
            counts.insert(candidate_id, total);
        }

        Ok(Self::tally(election, &counts))
    }

    /// Build the result rows from per-candidate counts, defaulting to zero
    /// for candidates nobody voted for.
    pub fn tally(election: &Election, counts: &HashMap<Id, u64>) -> Self {
        let results = election
            .candidates
            .iter()
            .map(|candidate| CandidateTally {
                candidate_id: candidate.id.into(),
                candidate_name: candidate.name.clone(),
                total_votes: counts.get(&candidate.id).copied().unwrap_or(0),
            })
            .collect();
        Self {
            election_id: election.id.into(),
            title: election.title.clone(),
            results,
        }
    }

    /// Render the aggregate as CSV. Only `candidate_name` can contain
    /// arbitrary text, so it alone is quoted (always, with embedded quotes
    /// doubled); the remaining fields are IDs and counts.
    pub fn to_csv(&self) -> String {
        let mut rows = vec![AGGREGATE_CSV_HEADER.to_string()];
        for row in &self.results {
            rows.push(format!(
                "{},{},\"{}\",{}",
                self.election_id,
                row.candidate_id,
                row.candidate_name.replace('"', "\"\""),
                row.total_votes,
            ));
        }
        rows.join("\n")
    }
}

/// Render every individual vote of an election as CSV, for audit.
/// Timestamps use ISO-8601 UTC with milliseconds so they round-trip exactly.
pub fn raw_csv(election_id: Id, votes: &[Vote]) -> String {
    let mut rows = vec![RAW_CSV_HEADER.to_string()];
    for vote in votes {
        rows.push(format!(
            "{},{},{},{}",
            election_id,
            vote.voter_id,
            vote.candidate_id,
            vote.created_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        ));
    }
    rows.join("\n")
}

use std::collections::HashMap;
use std::sync::Arc;

use mongodb::{bson::doc, error::Error as DbError, Database};
use rocket::{
    fairing::{Fairing, Info, Kind},
    futures::TryStreamExt,
    tokio::sync::Mutex,
    Build, Rocket,
};

use crate::error::Error;
use crate::model::{
    common::ElectionStatus,
    mongodb::{Coll, Id},
};
use crate::scheduled_task::ScheduledTask;

use super::Election;

/// Map from election IDs to pending close tasks.
type TaskMap = HashMap<Id, ScheduledTask<Result<(), Error>>>;

/// Scheduled tasks that close elections when their deadline arrives.
///
/// This is an acceleration only: the read-time deadline check in
/// [`Election::find_enforcing_deadline`] remains authoritative, so a vote
/// arriving between the deadline and the task firing is still rejected.
pub struct ElectionClosers {
    tasks: Arc<Mutex<TaskMap>>,
}

impl ElectionClosers {
    /// Create an empty set of closers.
    pub fn new() -> Self {
        Self {
            tasks: Default::default(),
        }
    }

    /// Schedule a closer for every open election with a deadline.
    pub async fn schedule_open_elections(&self, db: &Database) -> Result<(), DbError> {
        let filter = doc! {
            "status": ElectionStatus::Open,
            "end_at": { "$ne": null },
        };
        let open: Vec<Election> = Coll::<Election>::from_db(db)
            .find(filter, None)
            .await?
            .try_collect()
            .await?;
        for election in &open {
            self.schedule(Coll::from_db(db), election).await;
        }
        Ok(())
    }

    /// Schedule a closer for the given election.
    /// If one already exists, it will be rescheduled.
    pub async fn schedule(&self, elections: Coll<Election>, election: &Election) {
        let end_at = match election.end_at {
            Some(end_at) => end_at,
            None => return,
        };
        let election_id = election.id;

        let tasks = self.tasks.clone();
        let task = async move {
            let result = Election::close_if_open(&elections, election_id).await;
            match &result {
                Ok(true) => info!("Deadline passed; closed election {election_id}"),
                Ok(false) => debug!("Deadline closer for election {election_id} had nothing to do"),
                // The lazy read-time check still guards every use, so a
                // failed sweep only delays the visible flip.
                Err(e) => warn!("Deadline closer for election {election_id} failed: {e}"),
            }
            tasks.lock().await.remove(&election_id);
            result.map(|_| ())
        };

        let mut tasks_locked = self.tasks.lock().await;
        if let Some(previous) = tasks_locked.remove(&election_id) {
            previous.cancel().await;
        }
        tasks_locked.insert(election_id, ScheduledTask::new(task, end_at));
    }

    /// Drop the closer for the given election, e.g. after a manual close.
    pub async fn cancel(&self, election_id: Id) {
        if let Some(task) = self.tasks.lock().await.remove(&election_id) {
            task.cancel().await;
        }
    }

    /// Is a closer currently scheduled for the given election?
    pub async fn is_scheduled(&self, election_id: Id) -> bool {
        self.tasks.lock().await.contains_key(&election_id)
    }
}

impl Default for ElectionClosers {
    fn default() -> Self {
        Self::new()
    }
}

/// A fairing that schedules closers for all applicable elections during
/// Rocket ignition and places an [`ElectionClosers`] into managed state.
/// This fairing depends on the database being available in managed state,
/// and so must be attached after the fairing responsible for that.
pub struct ElectionCloserFairing;

#[rocket::async_trait]
impl Fairing for ElectionCloserFairing {
    fn info(&self) -> Info {
        Info {
            name: "Election Closers",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, rocket: Rocket<Build>) -> rocket::fairing::Result {
        info!("Scheduling election closers...");
        let closers = ElectionClosers::new();
        let db = match rocket.state::<Database>() {
            Some(db) => db,
            None => {
                error!("Database was not available when scheduling election closers");
                return Err(rocket);
            }
        };
        if let Err(e) = closers.schedule_open_elections(db).await {
            error!("Failed to schedule election closers: {e}");
            return Err(rocket);
        }
        info!("...election closers scheduled!");

        Ok(rocket.manage(closers))
    }
}

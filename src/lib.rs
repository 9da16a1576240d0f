#[macro_use]
extern crate rocket;

#[macro_use]
extern crate log;

#[cfg(test)]
#[macro_use]
extern crate backend_test;

pub mod api;
pub mod config;
pub mod error;
pub mod logging;
pub mod model;
pub mod scheduled_task;

use rocket::{Build, Rocket};

/// Assemble the server: config, database, election closers, logging, routes.
pub fn build() -> Rocket<Build> {
    rocket::build()
        .attach(config::ConfigFairing)
        .attach(config::DatabaseFairing)
        .attach(model::db::election::ElectionCloserFairing)
        .attach(logging::LoggerFairing)
        .mount("/", api::routes())
        .register("/", api::catchers())
}

/// Generate a fresh database name, so concurrently-running tests cannot
/// interfere with each other.
#[cfg(test)]
pub(crate) fn database_name() -> String {
    let random: u32 = rand::random();
    format!("test{random}")
}

/// Connect to the test database server configured in `Rocket.toml`.
#[cfg(test)]
pub(crate) async fn db_client() -> mongodb::Client {
    let db_uri = rocket::Config::figment()
        .extract_inner::<String>("db_uri")
        .expect("`db_uri` not set");
    mongodb::Client::with_uri_str(&db_uri)
        .await
        .unwrap_or_else(|_| panic!("Could not connect to database with `db_uri` \"{db_uri}\""))
}

/// Build a Rocket instance against the given database, skipping the database
/// fairing (and therefore the admin seeding) so tests control their own data.
#[cfg(test)]
pub(crate) async fn rocket_for_db(client: mongodb::Client, db_name: &str) -> Rocket<Build> {
    let db = client.database(db_name);
    model::mongodb::ensure_indexes_exist(&db)
        .await
        .expect("Failed to create indexes");
    rocket::build()
        .attach(config::ConfigFairing)
        .attach(model::db::election::ElectionCloserFairing)
        .manage(client)
        .manage(db)
        .mount("/", api::routes())
        .register("/", api::catchers())
}

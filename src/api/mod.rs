use mongodb::{bson::doc, Database};
use rocket::{
    http::Status,
    serde::json::{json, Value},
    Catcher, Request, Route, State,
};

pub mod admin;
pub mod auth;
pub mod elections;
pub mod results;
pub mod voting;

pub fn routes() -> Vec<Route> {
    let mut routes = routes![health];
    routes.extend(auth::routes());
    routes.extend(admin::routes());
    routes.extend(elections::routes());
    routes.extend(voting::routes());
    routes.extend(results::routes());
    routes
}

pub fn catchers() -> Vec<Catcher> {
    catchers![unauthorized, forbidden, not_found, fallback]
}

/// Service liveness, including whether the database answers pings.
#[get("/health")]
async fn health(db: &State<Database>) -> Value {
    let db_status = match db.run_command(doc! {"ping": 1}, None).await {
        Ok(_) => "connected",
        Err(_) => "not_connected",
    };
    json!({ "status": "ok", "db": db_status })
}

// Guard rejections bypass route responders, so the error body shape is
// replicated here for them.

#[catch(401)]
fn unauthorized() -> Value {
    json!({ "message": "Unauthorized" })
}

#[catch(403)]
fn forbidden() -> Value {
    json!({ "message": "Forbidden" })
}

#[catch(404)]
fn not_found() -> Value {
    json!({ "message": "Not found" })
}

#[catch(default)]
fn fallback(status: Status, _req: &Request) -> Value {
    json!({ "message": status.reason_lossy() })
}

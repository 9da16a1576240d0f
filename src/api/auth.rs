use mongodb::bson::{doc, DateTime as BsonDateTime};
use rocket::{
    http::{Cookie, CookieJar, Status},
    response::status,
    serde::json::{json, Json, Value},
    Route, State,
};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::model::{
    api::{
        auth::{rights::AnyUser, AuthToken, AUTH_TOKEN_COOKIE},
        user::{LoginRequest, LoginResponse, RegisterRequest},
    },
    common::Role,
    db::user::{NewUser, User},
    mongodb::{is_duplicate_key_error, Coll, Id},
};

pub fn routes() -> Vec<Route> {
    routes![register, login, logout]
}

#[post("/auth/register", data = "<request>", format = "json")]
async fn register(
    request: Json<RegisterRequest>,
    new_users: Coll<NewUser>,
) -> Result<status::Custom<Value>> {
    let request = request.0;
    request.validate()?;

    // The unique email index decides duplicates; checking first and
    // inserting after would race against a concurrent registration.
    let user = NewUser::new(
        request.name.trim(),
        &request.email,
        &request.password,
        Role::Pending,
    );
    match new_users.insert_one(&user, None).await {
        Ok(insert) => {
            // Valid because the ID comes directly from the DB.
            let id: Id = insert.inserted_id.as_object_id().unwrap().into();
            info!("Registered new pending account {} ({})", id, user.email);
            Ok(status::Custom(
                Status::Created,
                json!({
                    "message": "Registered. Await admin approval.",
                    "user_id": id.to_string(),
                }),
            ))
        }
        Err(err) if is_duplicate_key_error(&err) => Err(Error::Conflict(
            "Email already registered".to_string(),
        )),
        Err(err) => Err(err.into()),
    }
}

#[post("/auth/login", data = "<credentials>", format = "json")]
async fn login(
    cookies: &CookieJar<'_>,
    credentials: Json<LoginRequest>,
    users: Coll<User>,
    config: &State<Config>,
) -> Result<Json<LoginResponse>> {
    let email = credentials.email.trim().to_lowercase();
    let user = users
        .find_one(doc! { "email": &email }, None)
        .await?
        .filter(|user| user.verify_password(&credentials.password))
        .ok_or_else(|| Error::Unauthorized("Invalid credentials".to_string()))?;

    if user.role == Role::Pending {
        return Err(Error::Forbidden("Account pending approval".to_string()));
    }

    let update = doc! {
        "$set": { "last_login": BsonDateTime::now() },
    };
    users.update_one(user.id.as_doc(), update, None).await?;

    let token = AuthToken::<AnyUser>::new(&user);
    cookies.add(token.into_cookie(config));

    Ok(Json(LoginResponse {
        name: user.user.name,
        email: user.user.email,
        role: user.user.role,
    }))
}

#[post("/auth/logout")]
fn logout(cookies: &CookieJar) -> Status {
    cookies.remove(Cookie::named(AUTH_TOKEN_COOKIE));
    Status::Ok
}

#[cfg(test)]
mod tests {
    use mongodb::Database;
    use rocket::{
        http::ContentType,
        local::asynchronous::Client,
        serde::json::{serde_json, json},
    };

    use crate::model::db::user::{EXAMPLE_PASSWORD, PENDING_EMAIL, VOTER_EMAIL};

    use super::*;

    #[backend_test]
    async fn register_creates_pending_account(client: Client, db: Database) {
        let response = client
            .post(uri!(register))
            .header(ContentType::JSON)
            .body(
                json!({
                    "name": "New Person",
                    "email": "New.Person@Example.com",
                    "password": "a-decent-pw1",
                })
                .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(Status::Created, response.status());

        // The account is stored lowercased, pending, and with a hash rather
        // than the password.
        let user = Coll::<User>::from_db(&db)
            .find_one(doc! { "email": "new.person@example.com" }, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(user.role, Role::Pending);
        assert_ne!(user.password_hash, "a-decent-pw1");
        assert!(user.verify_password("a-decent-pw1"));
    }

    #[backend_test]
    async fn register_duplicate_email(client: Client) {
        let body = json!({
            "name": "New Person",
            "email": "new.person@example.com",
            "password": "a-decent-pw1",
        })
        .to_string();

        let response = client
            .post(uri!(register))
            .header(ContentType::JSON)
            .body(&body)
            .dispatch()
            .await;
        assert_eq!(Status::Created, response.status());

        let response = client
            .post(uri!(register))
            .header(ContentType::JSON)
            .body(&body)
            .dispatch()
            .await;
        assert_eq!(Status::Conflict, response.status());
    }

    #[backend_test]
    async fn register_rejects_bad_payloads(client: Client, db: Database) {
        for body in [
            json!({"name": "X", "email": "x@example.com", "password": "a-decent-pw1"}),
            json!({"name": "Someone", "email": "not-an-email", "password": "a-decent-pw1"}),
            json!({"name": "Someone", "email": "x@example.com", "password": "short1"}),
            json!({"name": "Someone", "email": "x@example.com", "password": "no-digits-here"}),
        ] {
            let response = client
                .post(uri!(register))
                .header(ContentType::JSON)
                .body(body.to_string())
                .dispatch()
                .await;
            assert_eq!(Status::BadRequest, response.status());
        }

        let count = Coll::<User>::from_db(&db)
            .count_documents(None, None)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[backend_test]
    async fn login_valid(client: Client, db: Database, new_users: Coll<NewUser>) {
        new_users
            .insert_one(NewUser::example_voter(), None)
            .await
            .unwrap();

        let response = client
            .post(uri!(login))
            .header(ContentType::JSON)
            .body(json!({"email": VOTER_EMAIL, "password": EXAMPLE_PASSWORD}).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        assert!(client.cookies().get(AUTH_TOKEN_COOKIE).is_some());

        let body: LoginResponse =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert_eq!(body.role, Role::Voter);
        assert_eq!(body.email, VOTER_EMAIL);

        // A successful login stamps `last_login`.
        let user = Coll::<User>::from_db(&db)
            .find_one(doc! { "email": VOTER_EMAIL }, None)
            .await
            .unwrap()
            .unwrap();
        assert!(user.last_login.is_some());
    }

    #[backend_test]
    async fn login_invalid(client: Client, new_users: Coll<NewUser>) {
        new_users
            .insert_one(NewUser::example_voter(), None)
            .await
            .unwrap();

        // Wrong password.
        let response = client
            .post(uri!(login))
            .header(ContentType::JSON)
            .body(json!({"email": VOTER_EMAIL, "password": "wrong-password1"}).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Unauthorized, response.status());
        assert!(client.cookies().get(AUTH_TOKEN_COOKIE).is_none());

        // Unknown email.
        let response = client
            .post(uri!(login))
            .header(ContentType::JSON)
            .body(json!({"email": "nobody@example.com", "password": EXAMPLE_PASSWORD}).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Unauthorized, response.status());
        assert!(client.cookies().get(AUTH_TOKEN_COOKIE).is_none());
    }

    #[backend_test]
    async fn login_pending_account(client: Client, new_users: Coll<NewUser>) {
        new_users
            .insert_one(NewUser::example_pending(), None)
            .await
            .unwrap();

        let response = client
            .post(uri!(login))
            .header(ContentType::JSON)
            .body(json!({"email": PENDING_EMAIL, "password": EXAMPLE_PASSWORD}).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Forbidden, response.status());
        assert!(client.cookies().get(AUTH_TOKEN_COOKIE).is_none());
    }

    #[backend_test(voter)]
    async fn logout_clears_cookie(client: Client) {
        assert!(client.cookies().get(AUTH_TOKEN_COOKIE).is_some());

        let response = client.post(uri!(logout)).dispatch().await;
        assert_eq!(Status::Ok, response.status());
        assert!(client.cookies().get(AUTH_TOKEN_COOKIE).is_none());
    }

    #[backend_test]
    async fn logout_when_not_logged_in(client: Client) {
        let response = client.post(uri!(logout)).dispatch().await;
        assert_eq!(Status::Ok, response.status());
    }
}

use std::marker::PhantomData;

use chrono::{serde::ts_seconds, DateTime, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, TokenData, Validation};
use rocket::{
    http::{Cookie, SameSite, Status},
    request::{FromRequest, Outcome},
    time::Duration,
    Request, State,
};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::Error;
use crate::model::{
    common::Role,
    db::user::User,
    mongodb::{Coll, Id},
};

use super::rights::Rights;

pub const AUTH_TOKEN_COOKIE: &str = "auth_token";

/// Request-scoped caller identity, threaded explicitly into the core
/// operations so they can re-validate role and tenant scope without touching
/// transport-layer state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub id: Id,
    pub role: Role,
    pub organization_id: Option<String>,
}

impl Caller {
    /// Fail with `Forbidden` unless the caller's role passes the given check.
    pub fn require(&self, allowed: impl Fn(Role) -> bool, action: &str) -> Result<(), Error> {
        if allowed(self.role) {
            Ok(())
        } else {
            Err(Error::Forbidden(format!(
                "Role '{}' may not {}",
                self.role, action
            )))
        }
    }
}

/// An authentication token representing a specific account, parameterised by
/// the rights needed to pass the request guard.
#[derive(Serialize, Deserialize)]
pub struct AuthToken<R> {
    pub id: Id,
    pub role: Role,
    #[serde(rename = "org", skip_serializing_if = "Option::is_none", default)]
    pub organization_id: Option<String>,
    #[serde(skip)]
    phantom: PhantomData<R>,
}

impl<R> AuthToken<R> {
    /// Create a token for the given account.
    pub fn new(user: &User) -> Self {
        Self {
            id: user.id,
            role: user.role,
            organization_id: user.organization_id.clone(),
            phantom: PhantomData,
        }
    }

    /// The caller identity carried by this token.
    pub fn caller(&self) -> Caller {
        Caller {
            id: self.id,
            role: self.role,
            organization_id: self.organization_id.clone(),
        }
    }

    /// Serialize this token into a cookie.
    ///
    /// # Panics
    /// Never panics: JWT encoding is infallible with default settings.
    pub fn into_cookie(self, config: &Config) -> Cookie<'static> {
        let claims = Claims {
            token: self,
            expire_at: Utc::now() + config.auth_ttl(),
        };

        let token = jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(config.jwt_secret()),
        )
        .expect("JWT encoding is infallible with default settings");

        Cookie::build(AUTH_TOKEN_COOKIE, token)
            .max_age(Duration::seconds(config.auth_ttl().num_seconds()))
            .http_only(true)
            .same_site(SameSite::Strict)
            .finish()
    }

    /// Deserialize a token from a cookie.
    pub fn from_cookie(cookie: &Cookie<'_>, config: &Config) -> Result<Self, Error> {
        let token = jsonwebtoken::decode(
            cookie.value(),
            &DecodingKey::from_secret(config.jwt_secret()),
            &Validation::default(),
        )
        .map(|claims: TokenData<Claims<R>>| claims.claims.token)?;
        Ok(token)
    }
}

/// Cookie claims: the token itself plus an expiry datetime.
#[derive(Serialize, Deserialize)]
struct Claims<R> {
    #[serde(flatten, bound = "")]
    token: AuthToken<R>,
    #[serde(rename = "exp", with = "ts_seconds")]
    expire_at: DateTime<Utc>,
}

#[rocket::async_trait]
impl<'r, R> FromRequest<'r> for AuthToken<R>
where
    R: Rights + Send,
{
    type Error = Error;

    /// Get an [`AuthToken`] from the cookie and verify that the account both
    /// still exists and still holds a permitted role. Checking against the
    /// database means a revoked or demoted account loses access immediately,
    /// not when its token expires.
    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        // Unwrap is safe as `Config` is always managed.
        let config = req.guard::<&State<Config>>().await.unwrap();

        let cookie = match req.cookies().get(AUTH_TOKEN_COOKIE) {
            Some(cookie) => cookie,
            None => {
                return Outcome::Failure((
                    Status::Unauthorized,
                    Error::Unauthorized("Not signed in".to_string()),
                ));
            }
        };

        let token: Self = match Self::from_cookie(cookie, config) {
            Ok(token) => token,
            Err(_) => {
                return Outcome::Failure((
                    Status::Unauthorized,
                    Error::Unauthorized("Invalid or expired token".to_string()),
                ));
            }
        };

        // Check the account still exists with the same role.
        let db = req.guard::<&State<mongodb::Database>>().await.unwrap();
        let user = match Coll::<User>::from_db(db).find_one(token.id.as_doc(), None).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                return Outcome::Failure((
                    Status::Unauthorized,
                    Error::Unauthorized("Account no longer exists".to_string()),
                ));
            }
            Err(e) => return Outcome::Failure((Status::InternalServerError, e.into())),
        };

        if user.role != token.role || !R::permits(user.role) {
            return Outcome::Failure((
                Status::Forbidden,
                Error::Forbidden(format!("This operation requires {}", R::DESCRIPTION)),
            ));
        }

        Outcome::Success(token)
    }
}

pub mod rights;
mod token;

pub use token::{AuthToken, Caller, AUTH_TOKEN_COOKIE};

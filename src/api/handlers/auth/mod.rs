//! Auth handlers and supporting modules.
//!
//! Login spends a rate-limiter point per email before the database is
//! touched; five failures within the window trip a one-minute block. A
//! successful login issues an HS256 bearer token; logout places the presented
//! token on a store-backed revocation list that expires together with the
//! token itself.

pub(crate) mod login;
pub(crate) mod principal;
mod rate_limit;
mod revocation;
mod service;
pub(crate) mod session;
mod state;
mod storage;
pub(crate) mod types;
pub(crate) mod utils;

pub use state::{AuthConfig, AuthState};
pub(crate) use storage::find_user_by_id;

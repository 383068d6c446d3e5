//! # Taskoj (Task Management API)
//!
//! `taskoj` is a task-management REST API. Users authenticate with email and
//! password, receive a signed bearer token, and manage their own tasks.
//! Administrators manage user accounts.
//!
//! ## Authentication
//!
//! Login is rate limited per email (fixed window with a block period) and
//! issues an HS256 JWT. Logout inserts the presented token into a
//! Redis-backed revocation list that self-expires with the token lifetime.
//!
//! ## Authorization
//!
//! A single role code (`admin` or `user`) gates the `/users` routes. Task
//! routes are ownership-scoped: requests for another user's task return
//! `404 Not Found` rather than `403 Forbidden` to prevent resource
//! enumeration.
//!
//! ## Soft Deletes
//!
//! Users and tasks are never hard-deleted; a `deleted_at` timestamp marks
//! them as gone while preserving referential history.

pub mod api;
pub mod cli;
pub mod store;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

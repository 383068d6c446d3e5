//! API handlers for Taskoj.
//!
//! Auth lives in its own submodule together with the rate limiter and the
//! token revocation list; tasks and users are flat handler files with their
//! SQL kept next to the endpoints that use it.

pub mod auth;
pub mod health;
pub mod root;
pub mod tasks;
pub mod users;

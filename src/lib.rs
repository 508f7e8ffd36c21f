//! Study-group sync daemon: accounts, groups and memberships on top of a
//! hierarchical document store, with per-role dashboard state for a host
//! UI that talks to the `studygroupd` binary over JSON lines.

pub mod auth;
pub mod backup;
pub mod config;
pub mod error;
pub mod ipc;
pub mod model;
pub mod presenter;
pub mod repository;
pub mod retry;
pub mod store;

pub use error::{AppError, Result};

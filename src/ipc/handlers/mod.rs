pub mod auth;
pub mod backup_exchange;
pub mod core;
pub mod dashboard;
pub mod groups;
pub mod members;

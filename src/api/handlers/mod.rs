//! API handlers for the admin backend.

pub mod auth;
pub mod health;

//! HTTP route handlers.

pub mod codes;
pub mod health;

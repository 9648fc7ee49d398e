//! Persistence layer for the code registry.
//!
//! This crate contains:
//! - Database connection management
//! - The self-healing registration code schema
//! - Entity definitions (database row mappings)
//! - The PostgreSQL `CodeStore` implementation

pub mod db;
pub mod entities;
pub mod metrics;
pub mod repositories;
pub mod schema;

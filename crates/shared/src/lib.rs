//! Shared utilities and common types for the Code Registry backend.
//!
//! This crate provides common functionality used across all other crates:
//! - Admin API key hashing
//! - Offset pagination
//! - Common validation logic

pub mod crypto;
pub mod pagination;
pub mod validation;

//! Domain layer for the code registry.
//!
//! This crate contains:
//! - Domain models (Code, validation results, export rendering)
//! - The `CodeStore` storage seam and an in-memory implementation
//! - The code generator and `CodeService`

pub mod models;
pub mod services;

pub use services::code_service::CodeServiceError;
pub use services::code_store::StoreError;

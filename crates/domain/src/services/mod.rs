//! Domain services for the code registry.

pub mod code_generator;
pub mod code_service;
pub mod code_store;

pub use code_generator::CodeGenerator;
pub use code_service::{CodeService, CodeServiceError, CodeSettings};
pub use code_store::{CodeStore, InMemoryCodeStore, StoreError};

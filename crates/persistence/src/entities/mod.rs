//! Database row mappings.

pub mod registration_code;

pub use registration_code::{CodeStatsEntity, RegistrationCodeEntity};

//! Request extractors.

pub mod admin_key;

pub use admin_key::{AdminAuth, OptionalAdminAuth, API_KEY_HEADER};

//! Repository implementations.

pub mod registration_code;

pub use registration_code::RegistrationCodeRepository;

//! Shared error handling for the whole crate
pub mod error;
pub mod result;

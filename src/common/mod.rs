//! Common module - errors, domain types and async seams

pub mod errors;
pub mod traits;
pub mod types;

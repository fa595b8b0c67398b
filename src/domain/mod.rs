//! Domain layer types and invariants.

pub mod dashboard;
pub mod entities;
pub mod error;
pub mod types;

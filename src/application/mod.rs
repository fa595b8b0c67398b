//! Application services layer.

pub mod dashboard;
pub mod error;
pub mod repos;

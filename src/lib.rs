//! Dashboard statistics with a two-tier cache and cross-session invalidation.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;

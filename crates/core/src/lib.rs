//! Taxonomist Core - taxonomy aggregate, events, and read projection.
//!
//! This crate contains the taxonomy business logic. It is
//! database-agnostic and defines traits that are implemented
//! by the `storage-sqlite` crate.

pub mod config;
pub mod errors;
pub mod events;
pub mod projection;
pub mod taxonomies;

// Re-export error types
pub use errors::Error;
pub use errors::Result;

//! SQLite storage for the taxonomy engine.
//!
//! This crate is the only place where Diesel dependencies exist. It
//! implements the storage traits defined in `taxonomist-core`:
//! - the append-only event log (`TaxonomyEventLogTrait`)
//! - the read-model view store (`TaxonomyViewStoreTrait`)
//!
//! ```text
//!   taxonomist-core (domain, projection)
//!                  │
//!                  ▼
//!   taxonomist-storage-sqlite (this crate)
//!                  │
//!                  ▼
//!              SQLite DB
//! ```
//!
//! All writes go through one writer connection (`WriteHandle`); reads use
//! the r2d2 pool.

pub mod db;
pub mod errors;
pub mod event_log;
pub mod schema;
pub mod views;

pub use db::{
    create_pool, get_connection, init, run_migrations, spawn_writer, DbConnection, DbPool,
    WriteHandle,
};
pub use errors::{IntoCore, StorageError};
pub use event_log::SqliteEventLog;
pub use views::TaxonomyViewRepository;

pub use taxonomist_core::errors::{DatabaseError, Error, Result};

//! Engine configuration read from the environment.

use std::path::Path;
use std::time::Duration;

use log::warn;

/// Per-aggregate command mailbox size used when nothing is configured.
pub const DEFAULT_MAILBOX_CAPACITY: usize = 64;

/// How long an aggregate task waits for a request before it is released.
pub const DEFAULT_AGGREGATE_IDLE_TIMEOUT: Duration = Duration::from_secs(300);

/// File name of the database inside the data directory.
pub const DEFAULT_DB_FILE: &str = "taxonomist.db";

pub const ENV_DATABASE_URL: &str = "DATABASE_URL";
pub const ENV_DATA_DIR: &str = "TAXONOMIST_DATA_DIR";
pub const ENV_MAILBOX_CAPACITY: &str = "TAXONOMIST_MAILBOX_CAPACITY";
pub const ENV_PROJECTION_REPLAY_ON_GAP: &str = "TAXONOMIST_PROJECTION_REPLAY_ON_GAP";
pub const ENV_AGGREGATE_IDLE_SECS: &str = "TAXONOMIST_AGGREGATE_IDLE_SECS";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// SQLite database file backing the event log and the read model.
    pub db_path: String,
    /// Bounded queue size in front of each aggregate task.
    pub mailbox_capacity: usize,
    /// Idle period after which an aggregate is dropped from memory.
    pub aggregate_idle_timeout: Duration,
    /// Whether the projection worker back-fills sequence gaps from the log.
    pub projection_replay_on_gap: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path("."),
            mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
            aggregate_idle_timeout: DEFAULT_AGGREGATE_IDLE_TIMEOUT,
            projection_replay_on_gap: true,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from any key/value source. Unparseable values fall
    /// back to their defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let data_dir = lookup(ENV_DATA_DIR).unwrap_or_else(|| ".".to_string());
        let db_path = lookup(ENV_DATABASE_URL).unwrap_or_else(|| default_db_path(&data_dir));

        let mailbox_capacity = match lookup(ENV_MAILBOX_CAPACITY) {
            None => DEFAULT_MAILBOX_CAPACITY,
            Some(raw) => match raw.trim().parse::<usize>() {
                Ok(capacity) if capacity > 0 => capacity,
                _ => {
                    warn!(
                        "Invalid {}='{}', using {}",
                        ENV_MAILBOX_CAPACITY, raw, DEFAULT_MAILBOX_CAPACITY
                    );
                    DEFAULT_MAILBOX_CAPACITY
                }
            },
        };

        let aggregate_idle_timeout = match lookup(ENV_AGGREGATE_IDLE_SECS) {
            None => DEFAULT_AGGREGATE_IDLE_TIMEOUT,
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => {
                    warn!(
                        "Invalid {}='{}', using {}s",
                        ENV_AGGREGATE_IDLE_SECS,
                        raw,
                        DEFAULT_AGGREGATE_IDLE_TIMEOUT.as_secs()
                    );
                    DEFAULT_AGGREGATE_IDLE_TIMEOUT
                }
            },
        };

        let projection_replay_on_gap = match lookup(ENV_PROJECTION_REPLAY_ON_GAP) {
            None => true,
            Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => true,
                "false" | "0" | "no" => false,
                _ => {
                    warn!(
                        "Invalid {}='{}', using true",
                        ENV_PROJECTION_REPLAY_ON_GAP, raw
                    );
                    true
                }
            },
        };

        Self {
            db_path,
            mailbox_capacity,
            aggregate_idle_timeout,
            projection_replay_on_gap,
        }
    }
}

fn default_db_path(data_dir: &str) -> String {
    Path::new(data_dir)
        .join(DEFAULT_DB_FILE)
        .to_string_lossy()
        .into_owned()
}

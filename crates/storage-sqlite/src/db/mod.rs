use log::{error, info};
use std::fs;
use std::path::Path;
use std::sync::Arc;

use diesel::connection::{Connection, SimpleConnection};
use diesel::r2d2::{self, ConnectionManager, Pool, PooledConnection};
use diesel::sqlite::SqliteConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};

use taxonomist_core::config::EngineConfig;
use taxonomist_core::errors::{DatabaseError, Error, Result};

use crate::errors::{IntoCore, StorageError};

pub mod write_actor;
pub use write_actor::{spawn_writer, WriteHandle};

const MIGRATIONS: EmbeddedMigrations = embed_migrations!();

pub type DbPool = r2d2::Pool<ConnectionManager<SqliteConnection>>;
pub type DbConnection = PooledConnection<ConnectionManager<SqliteConnection>>;

/// Prepares the database file named by `config` and returns its path.
///
/// Creates the parent directory if needed and switches the file to WAL mode.
pub fn init(config: &EngineConfig) -> Result<String> {
    let db_path = config.db_path.clone();

    if let Some(db_dir) = Path::new(&db_path).parent() {
        if !db_dir.as_os_str().is_empty() && !db_dir.exists() {
            fs::create_dir_all(db_dir)?;
        }
    }

    let mut conn = SqliteConnection::establish(&db_path).map_err(StorageError::from)?;
    conn.batch_execute(
        "
            PRAGMA journal_mode = WAL;
            PRAGMA foreign_keys = ON;
            PRAGMA busy_timeout = 30000;
            PRAGMA synchronous  = NORMAL;
        ",
    )
    .map_err(StorageError::from)?;

    Ok(db_path)
}

pub fn create_pool(db_path: &str) -> Result<Arc<DbPool>> {
    let manager = ConnectionManager::<SqliteConnection>::new(db_path);
    let pool = r2d2::Pool::builder()
        .max_size(8)
        .min_idle(Some(1))
        .connection_timeout(std::time::Duration::from_secs(30))
        .connection_customizer(Box::new(ConnectionCustomizer {}))
        .build(manager)
        .map_err(|e| DatabaseError::PoolCreationFailed(e.to_string()))?;
    Ok(Arc::new(pool))
}

pub fn run_migrations(pool: &DbPool) -> Result<()> {
    info!("Running database migrations");
    let mut connection = get_connection(pool)?;

    let applied = connection.run_pending_migrations(MIGRATIONS).map_err(|e| {
        error!("Database migration failed: {}", e);
        Error::Database(DatabaseError::MigrationFailed(e.to_string()))
    })?;

    if applied.is_empty() {
        info!("No pending migrations to apply.");
    } else {
        for migration_version in &applied {
            info!("Applied migration {}", migration_version);
        }
    }

    Ok(())
}

/// Gets a connection from the pool
pub fn get_connection(pool: &Pool<ConnectionManager<SqliteConnection>>) -> Result<DbConnection> {
    pool.get().into_core()
}

#[derive(Debug)]
struct ConnectionCustomizer;

impl r2d2::CustomizeConnection<SqliteConnection, r2d2::Error> for ConnectionCustomizer {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> std::result::Result<(), r2d2::Error> {
        conn.batch_execute(
            "
                PRAGMA foreign_keys = ON;
                PRAGMA busy_timeout = 30000;
                PRAGMA synchronous = NORMAL;
            ",
        )
        .map_err(r2d2::Error::QueryError)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taxonomist_core::config::{DEFAULT_DB_FILE, ENV_DATABASE_URL, ENV_DATA_DIR};
    use tempfile::tempdir;

    #[test]
    fn test_init_creates_directory_and_migrations_apply_once() {
        let temp_dir = tempdir().expect("Failed to create temp directory");
        let data_dir = temp_dir.path().join("nested").join("data");
        let data_dir_str = data_dir.to_string_lossy().into_owned();
        let config = EngineConfig::from_lookup(|key| {
            (key == ENV_DATA_DIR).then(|| data_dir_str.clone())
        });
        let db_path = init(&config).unwrap();

        assert_eq!(db_path, config.db_path);
        assert_eq!(Path::new(&db_path).to_path_buf(), data_dir.join(DEFAULT_DB_FILE));
        assert!(data_dir.exists());
        assert!(Path::new(&db_path).exists());

        let pool = create_pool(&db_path).unwrap();
        run_migrations(&pool).unwrap();
        // Second run finds nothing pending.
        run_migrations(&pool).unwrap();
    }

    #[test]
    fn test_init_uses_configured_database_url() {
        let temp_dir = tempdir().expect("Failed to create temp directory");
        let explicit = temp_dir
            .path()
            .join("explicit.db")
            .to_string_lossy()
            .into_owned();
        let ignored_dir = temp_dir.path().join("unused");
        let ignored_dir_str = ignored_dir.to_string_lossy().into_owned();
        let config = EngineConfig::from_lookup(|key| match key {
            ENV_DATABASE_URL => Some(explicit.clone()),
            ENV_DATA_DIR => Some(ignored_dir_str.clone()),
            _ => None,
        });

        let db_path = init(&config).unwrap();
        assert_eq!(db_path, explicit);
        assert!(Path::new(&explicit).exists());
        assert!(!ignored_dir.exists());
    }
}

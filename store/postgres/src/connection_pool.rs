use diesel::pg::PgConnection;
use diesel::r2d2::{self, Builder, ConnectionManager, Pool, PooledConnection};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, HarnessWithOutput, MigrationHarness};

use logreceiver::prelude::*;
use logreceiver::util::security::SafeDisplay;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("./migrations");

pub type PgPooledConnection = PooledConnection<ConnectionManager<PgConnection>>;

#[derive(Debug)]
struct ErrorHandler(Logger);

impl r2d2::HandleError<r2d2::Error> for ErrorHandler {
    fn handle_error(&self, error: r2d2::Error) {
        error!(self.0, "Postgres connection error"; "error" => error.to_string());
    }
}

/// A pool of connections to the database that holds the matched messages
/// and the hosts. Cloning the pool is cheap; all clones share the same
/// connections.
#[derive(Clone)]
pub struct ConnectionPool {
    logger: Logger,
    pool: Pool<ConnectionManager<PgConnection>>,
}

impl ConnectionPool {
    /// Create a pool with at most `pool_size` connections. No connection
    /// is made until one is needed, so this succeeds even if the database
    /// is down; call `setup` to check that it is reachable.
    pub fn create(logger: &Logger, postgres_url: &str, pool_size: u32) -> ConnectionPool {
        let logger_store = logger.new(o!("component" => "Store"));
        let logger_pool = logger.new(o!("component" => "PostgresConnectionPool"));
        let error_handler = Box::new(ErrorHandler(logger_pool.clone()));

        let min_idle = ENV_VARS.store.connection_min_idle.filter(|min_idle| {
            if *min_idle <= pool_size {
                true
            } else {
                warn!(
                    logger_pool,
                    "Configuration error: min idle {} exceeds pool size {}, ignoring min idle",
                    min_idle,
                    pool_size
                );
                false
            }
        });

        let conn_manager = ConnectionManager::new(postgres_url);
        let builder: Builder<ConnectionManager<PgConnection>> = Pool::builder()
            .error_handler(error_handler)
            .connection_timeout(ENV_VARS.store.connection_timeout)
            .max_size(pool_size)
            .min_idle(min_idle)
            .idle_timeout(Some(ENV_VARS.store.connection_idle_timeout));
        let pool = builder.build_unchecked(conn_manager);
        info!(
            logger_store,
            "Created Postgres connection pool";
            "url" => SafeDisplay(postgres_url),
            "pool_size" => pool_size
        );
        ConnectionPool {
            logger: logger_pool,
            pool,
        }
    }

    /// Check out a connection, waiting at most for the configured
    /// connection timeout
    pub fn get(&self) -> Result<PgPooledConnection, StoreError> {
        // The error handler has already logged the details
        self.pool
            .get()
            .map_err(|_| StoreError::DatabaseUnavailable)
    }

    /// Connect to the database and bring its schema up to date
    pub fn setup(&self) -> Result<(), StoreError> {
        let mut conn = self.get()?;
        migrate_schema(&self.logger, &mut conn)
    }
}

/// Run all schema migrations that have not been run yet
fn migrate_schema(logger: &Logger, conn: &mut PgConnection) -> Result<(), StoreError> {
    // Collect migration logging output
    let mut output = vec![];

    let mut harness = HarnessWithOutput::new(conn, &mut output);

    info!(logger, "Running migrations");
    let result = harness
        .run_pending_migrations(MIGRATIONS)
        .map(|versions| versions.len())
        .map_err(|e| e.to_string());
    info!(logger, "Migrations finished");
    drop(harness);

    let msg = String::from_utf8(output).unwrap_or_else(|_| String::from("<unreadable>"));
    let msg = msg.trim().replace('\n', " ");
    match result {
        Ok(count) => {
            debug!(logger, "Postgres migration output";
                "output" => msg,
                "migrations" => count);
            Ok(())
        }
        Err(e) => {
            error!(logger, "Postgres migration error"; "output" => msg);
            Err(StoreError::Unknown(anyhow!(e)))
        }
    }
}

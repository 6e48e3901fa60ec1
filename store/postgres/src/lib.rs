//! Postgres implementations of `MatchStore` and `HostResolver`.

mod connection_pool;
mod host_resolver;
mod match_store;

pub use self::connection_pool::{ConnectionPool, PgPooledConnection, MIGRATIONS};
pub use self::host_resolver::PostgresHostResolver;
pub use self::match_store::PostgresMatchStore;

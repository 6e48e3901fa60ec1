use std::fmt;
use std::time::Duration;

use envconfig::Envconfig;

#[derive(Clone)]
pub struct EnvVarsStore {
    /// The maximum number of connections in the Postgres connection pool.
    ///
    /// Set by the environment variable
    /// `LOGRECEIVER_STORE_CONNECTION_POOL_SIZE`. The default value is 10.
    pub connection_pool_size: u32,
    /// Set by the environment variable `LOGRECEIVER_STORE_CONNECTION_TIMEOUT`
    /// (expressed in milliseconds). The default value is 5000ms.
    pub connection_timeout: Duration,
    /// Set by the environment variable `LOGRECEIVER_STORE_CONNECTION_MIN_IDLE`.
    /// No default value is provided.
    pub connection_min_idle: Option<u32>,
    /// Set by the environment variable
    /// `LOGRECEIVER_STORE_CONNECTION_IDLE_TIMEOUT` (expressed in seconds).
    /// The default value is 600s.
    pub connection_idle_timeout: Duration,
}

// This does not print any values avoid accidentally leaking any sensitive env vars
impl fmt::Debug for EnvVarsStore {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "env vars")
    }
}

impl From<InnerStore> for EnvVarsStore {
    fn from(x: InnerStore) -> Self {
        Self {
            connection_pool_size: x.connection_pool_size,
            connection_timeout: Duration::from_millis(x.connection_timeout_in_millis),
            connection_min_idle: x.connection_min_idle,
            connection_idle_timeout: Duration::from_secs(x.connection_idle_timeout_in_secs),
        }
    }
}

#[derive(Clone, Debug, Envconfig)]
pub struct InnerStore {
    #[envconfig(from = "LOGRECEIVER_STORE_CONNECTION_POOL_SIZE", default = "10")]
    connection_pool_size: u32,
    #[envconfig(from = "LOGRECEIVER_STORE_CONNECTION_TIMEOUT", default = "5000")]
    connection_timeout_in_millis: u64,
    #[envconfig(from = "LOGRECEIVER_STORE_CONNECTION_MIN_IDLE")]
    connection_min_idle: Option<u32>,
    #[envconfig(from = "LOGRECEIVER_STORE_CONNECTION_IDLE_TIMEOUT", default = "600")]
    connection_idle_timeout_in_secs: u64,
}

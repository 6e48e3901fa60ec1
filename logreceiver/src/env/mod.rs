mod store;

use envconfig::Envconfig;
use lazy_static::lazy_static;
use std::{fmt, str::FromStr};

pub use store::EnvVarsStore;
use store::InnerStore;

lazy_static! {
    pub static ref ENV_VARS: EnvVars = EnvVars::from_env().unwrap();
}

/// What to do with matches whose host no longer exists.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum UnresolvedHostPolicy {
    /// Skip the matches and delete them together with the rest of their
    /// batch; they are lost for good
    #[default]
    Discard,
    /// Skip the matches but leave them in the store so that a later
    /// visitation can deliver them should the host reappear
    Retain,
}

impl FromStr for UnresolvedHostPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "discard" => Ok(Self::Discard),
            "retain" => Ok(Self::Retain),
            _ => Err(format!(
                "invalid policy for unresolved hosts `{}`, expected discard / retain",
                s
            )),
        }
    }
}

impl fmt::Display for UnresolvedHostPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Discard => write!(f, "discard"),
            Self::Retain => write!(f, "retain"),
        }
    }
}

#[derive(Clone)]
pub struct EnvVars {
    pub store: EnvVarsStore,

    /// The number of matches read and deleted in one batch when a
    /// subscription does not specify its own batch size.
    ///
    /// Set by the environment variable `LOGRECEIVER_VISIT_BATCH_SIZE`. The
    /// default value is 1000.
    pub visit_batch_size: usize,
    /// Set by the environment variable `LOGRECEIVER_UNRESOLVED_HOSTS`
    /// (`discard` or `retain`). The default is `discard`.
    pub unresolved_hosts: UnresolvedHostPolicy,
    /// Log levels for `slog_envlogger`, in the same format as `RUST_LOG`.
    ///
    /// Set by the environment variable `LOGRECEIVER_LOG`. Not set by
    /// default.
    pub log_levels: Option<String>,
    /// Log how long fetching, visiting and deleting each batch took.
    ///
    /// Set by the flag `LOGRECEIVER_LOG_BATCH_TIMING`. Off by default.
    pub log_batch_timing: bool,
}

// This does not print any values avoid accidentally leaking any sensitive env vars
impl fmt::Debug for EnvVars {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "env vars")
    }
}

impl EnvVars {
    pub fn from_env() -> Result<Self, envconfig::Error> {
        let inner = Inner::init_from_env()?;
        let store = InnerStore::init_from_env()?.into();

        Ok(Self {
            store,
            visit_batch_size: inner.visit_batch_size,
            unresolved_hosts: inner.unresolved_hosts,
            log_levels: inner.log_levels,
            log_batch_timing: inner.log_batch_timing.0,
        })
    }
}

#[derive(Clone, Debug, Envconfig)]
struct Inner {
    #[envconfig(from = "LOGRECEIVER_VISIT_BATCH_SIZE", default = "1000")]
    visit_batch_size: usize,
    #[envconfig(from = "LOGRECEIVER_UNRESOLVED_HOSTS", default = "discard")]
    unresolved_hosts: UnresolvedHostPolicy,
    #[envconfig(from = "LOGRECEIVER_LOG")]
    log_levels: Option<String>,
    #[envconfig(from = "LOGRECEIVER_LOG_BATCH_TIMING", default = "false")]
    log_batch_timing: EnvVarBoolean,
}

#[derive(Copy, Clone, Debug)]
pub(crate) struct EnvVarBoolean(pub bool);

impl FromStr for EnvVarBoolean {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "true" | "1" => Ok(Self(true)),
            "false" | "0" => Ok(Self(false)),
            _ => Err("Invalid env. var. flag, expected true / false / 1 / 0".to_string()),
        }
    }
}

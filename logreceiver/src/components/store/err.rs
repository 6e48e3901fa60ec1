use diesel::result::Error as DieselError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store error: {0:#}")]
    Unknown(anyhow::Error),
    #[error("database unavailable")]
    DatabaseUnavailable,
    #[error("internal error: {0}")]
    InternalError(String),
}

// Convenience to report an internal error
#[macro_export]
macro_rules! internal_error {
    ($msg:expr) => {{
        $crate::prelude::StoreError::InternalError(format!("{}", $msg))
    }};
    ($fmt:expr, $($arg:tt)*) => {{
        $crate::prelude::StoreError::InternalError(format!($fmt, $($arg)*))
    }}
}

impl From<DieselError> for StoreError {
    fn from(e: DieselError) -> Self {
        StoreError::Unknown(e.into())
    }
}

impl From<anyhow::Error> for StoreError {
    fn from(e: anyhow::Error) -> Self {
        StoreError::Unknown(e)
    }
}

impl StoreError {
    /// Whether retrying the whole visitation later has a chance of
    /// succeeding. Internal errors point at a bug and will not go away
    /// by themselves
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Unknown(_) | StoreError::DatabaseUnavailable => true,
            StoreError::InternalError(_) => false,
        }
    }
}

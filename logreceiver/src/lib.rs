/// Traits and types for all system components.
pub mod components;

/// Common data types used throughout the log receiver.
pub mod data;

/// Configuration read from environment variables.
pub mod env;

/// Logging facilities based on `slog`.
pub mod log;

/// Utilities.
pub mod util;

pub use anyhow;
pub use slog;

/// A prelude that makes all component traits and data types available.
///
/// Add the following code to import all traits and data types listed below at once.
///
/// ```
/// use logreceiver::prelude::*;
/// ```
pub mod prelude {
    pub use ::anyhow::{self, anyhow, Context as _};
    pub use slog::{self, crit, debug, error, info, o, trace, warn, Logger};
    pub use std::fmt::Debug;
    pub use std::sync::Arc;

    pub use crate::components::store::{HostResolver, MatchCursor, MatchStore, StoreError};
    pub use crate::components::visitor::MessageVisitor;
    pub use crate::data::matches::{
        Host, HostId, MatchId, MatchPointer, MessageId, Subscription, SubscriptionId,
    };
    pub use crate::env::{UnresolvedHostPolicy, ENV_VARS};
}

use std::fmt;

/// Declare a newtype around an `i64` database id. The ids are `bigint`
/// columns in Postgres, hence the signed representation.
macro_rules! id_type {
    ($(#[$attr:meta])* $name:ident) => {
        $(#[$attr])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub i64);

        impl $name {
            pub fn as_i64(&self) -> i64 {
                self.0
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                $name(id)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> i64 {
                id.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl slog::Value for $name {
            fn serialize(
                &self,
                _rec: &slog::Record,
                key: slog::Key,
                serializer: &mut dyn slog::Serializer,
            ) -> slog::Result {
                serializer.emit_i64(key, self.0)
            }
        }
    };
}

id_type!(
    /// Primary key of a row in the pointer store. Assigned by the store
    /// from a sequence, so ids grow with insertion order
    MatchId
);
id_type!(SubscriptionId);
id_type!(
    /// Each host has its own id sequence for messages, so a message id is
    /// only unique together with the host id
    MessageId
);
id_type!(HostId);

/// A row recording that one message matched one subscription. The
/// message is referenced by `(host_id, message_id)`; its content lives in
/// the host's message partition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MatchPointer {
    pub match_id: MatchId,
    pub subscription_id: SubscriptionId,
    pub message_id: MessageId,
    pub host_id: HostId,
}

/// A host that sends log messages to the receiver.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Host {
    pub id: HostId,
    pub name: String,
    /// The key of the message partition that stores this host's messages
    pub partition: String,
}

impl Host {
    pub fn new(id: HostId, name: impl Into<String>, partition: impl Into<String>) -> Self {
        Host {
            id,
            name: name.into(),
            partition: partition.into(),
        }
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.name, self.id)
    }
}

/// The parts of a subscription that matter when visiting its matches.
/// Everything else about subscriptions (owner, host group, expression)
/// is managed elsewhere.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub name: String,
    pub enabled: bool,
    /// How many matches to process per batch; `None` means to use the
    /// configured default
    pub max_batch_size: Option<usize>,
}

impl Subscription {
    pub fn new(id: SubscriptionId, name: impl Into<String>) -> Self {
        Subscription {
            id,
            name: name.into(),
            enabled: true,
            max_batch_size: None,
        }
    }
}

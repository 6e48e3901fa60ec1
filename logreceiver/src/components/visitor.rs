use crate::data::matches::{Host, MessageId};

/// Receives the matches of one subscription, grouped by host.
///
/// A visitation session calls `begin` once, then `visit` once for each
/// contiguous run of matches that belong to the same host, and finally
/// `close`. Once `begin` has succeeded, `close` is called exactly once no
/// matter how the session ends; `success` tells whether every batch was
/// delivered and cleaned up.
///
/// Errors returned from any of these methods abort the session. Matches
/// of the batch that was being delivered stay in the store and will be
/// delivered again by the next session.
pub trait MessageVisitor {
    fn begin(&mut self) -> Result<(), anyhow::Error>;

    /// Visit the messages with ids `message_ids` of `host`, in the order in
    /// which they were matched. `message_ids` is never empty.
    fn visit(&mut self, host: &Host, message_ids: &[MessageId]) -> Result<(), anyhow::Error>;

    fn close(&mut self, success: bool) -> Result<(), anyhow::Error>;
}

impl<V: MessageVisitor + ?Sized> MessageVisitor for Box<V> {
    fn begin(&mut self) -> Result<(), anyhow::Error> {
        (**self).begin()
    }

    fn visit(&mut self, host: &Host, message_ids: &[MessageId]) -> Result<(), anyhow::Error> {
        (**self).visit(host, message_ids)
    }

    fn close(&mut self, success: bool) -> Result<(), anyhow::Error> {
        (**self).close(success)
    }
}

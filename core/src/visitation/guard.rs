use logreceiver::prelude::*;

/// Makes sure that a visitor that was begun also gets closed. Sessions
/// call `close` explicitly; if the guard is dropped without that, for
/// example because a visitor panicked, the visitor is closed as failed.
pub(super) struct VisitorGuard<'v> {
    logger: Logger,
    visitor: &'v mut dyn MessageVisitor,
    closed: bool,
}

impl<'v> VisitorGuard<'v> {
    pub fn begin(
        logger: &Logger,
        visitor: &'v mut dyn MessageVisitor,
    ) -> Result<Self, anyhow::Error> {
        visitor.begin()?;
        Ok(VisitorGuard {
            logger: logger.clone(),
            visitor,
            closed: false,
        })
    }

    pub fn visitor(&mut self) -> &mut (dyn MessageVisitor + 'v) {
        &mut *self.visitor
    }

    pub fn close(mut self, success: bool) -> Result<(), anyhow::Error> {
        self.closed = true;
        self.visitor.close(success)
    }
}

impl Drop for VisitorGuard<'_> {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.visitor.close(false) {
            error!(self.logger, "Failed to close visitor";
                "error" => format!("{:#}", e));
        }
    }
}

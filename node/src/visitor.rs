use logreceiver::prelude::*;

/// A visitor that logs every run of matched messages it is given. It does
/// not look at the messages themselves; that needs access to the host's
/// partition.
pub struct LoggingVisitor {
    logger: Logger,
    runs: usize,
    messages: usize,
}

impl LoggingVisitor {
    pub fn new(logger: &Logger) -> Self {
        LoggingVisitor {
            logger: logger.new(o!("component" => "LoggingVisitor")),
            runs: 0,
            messages: 0,
        }
    }

    pub fn runs(&self) -> usize {
        self.runs
    }

    pub fn messages(&self) -> usize {
        self.messages
    }
}

impl MessageVisitor for LoggingVisitor {
    fn begin(&mut self) -> Result<(), anyhow::Error> {
        self.runs = 0;
        self.messages = 0;
        debug!(self.logger, "Start visiting matched messages");
        Ok(())
    }

    fn visit(&mut self, host: &Host, message_ids: &[MessageId]) -> Result<(), anyhow::Error> {
        self.runs += 1;
        self.messages += message_ids.len();
        info!(self.logger, "Matched messages";
            "host" => host.name.as_str(),
            "host_id" => host.id,
            "partition" => host.partition.as_str(),
            "count" => message_ids.len(),
            "first" => message_ids.first().copied(),
            "last" => message_ids.last().copied());
        Ok(())
    }

    fn close(&mut self, success: bool) -> Result<(), anyhow::Error> {
        if success {
            info!(self.logger, "Finished visiting matched messages";
                "runs" => self.runs,
                "messages" => self.messages);
        } else {
            warn!(self.logger, "Visiting matched messages was aborted";
                "runs" => self.runs,
                "messages" => self.messages);
        }
        Ok(())
    }
}

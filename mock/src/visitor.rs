use logreceiver::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VisitorEvent {
    Begin,
    Visit { host: i64, messages: Vec<i64> },
    Close(bool),
}

impl VisitorEvent {
    pub fn visit(host: i64, messages: &[i64]) -> Self {
        VisitorEvent::Visit {
            host,
            messages: messages.to_vec(),
        }
    }
}

/// A visitor that records the calls it receives. It can be told to fail
/// or panic on the n-th call to `visit` (counting from 1), or to fail in
/// `begin` or `close`.
#[derive(Default)]
pub struct RecordingVisitor {
    pub events: Vec<VisitorEvent>,
    visits: usize,
    fail_begin: bool,
    fail_close: bool,
    fail_visit_at: Option<usize>,
    panic_visit_at: Option<usize>,
}

impl RecordingVisitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_begin() -> Self {
        RecordingVisitor {
            fail_begin: true,
            ..Default::default()
        }
    }

    pub fn failing_close() -> Self {
        RecordingVisitor {
            fail_close: true,
            ..Default::default()
        }
    }

    pub fn failing_visit_at(n: usize) -> Self {
        RecordingVisitor {
            fail_visit_at: Some(n),
            ..Default::default()
        }
    }

    pub fn panicking_visit_at(n: usize) -> Self {
        RecordingVisitor {
            panic_visit_at: Some(n),
            ..Default::default()
        }
    }

    /// Only the `Visit` events
    pub fn visits(&self) -> Vec<VisitorEvent> {
        self.events
            .iter()
            .filter(|event| matches!(event, VisitorEvent::Visit { .. }))
            .cloned()
            .collect()
    }

    /// All delivered message ids, in delivery order
    pub fn messages(&self) -> Vec<i64> {
        self.events
            .iter()
            .filter_map(|event| match event {
                VisitorEvent::Visit { messages, .. } => Some(messages.clone()),
                _ => None,
            })
            .flatten()
            .collect()
    }
}

impl MessageVisitor for RecordingVisitor {
    fn begin(&mut self) -> Result<(), anyhow::Error> {
        if self.fail_begin {
            return Err(anyhow!("begin failed"));
        }
        self.events.push(VisitorEvent::Begin);
        Ok(())
    }

    fn visit(&mut self, host: &Host, message_ids: &[MessageId]) -> Result<(), anyhow::Error> {
        self.visits += 1;
        if self.panic_visit_at == Some(self.visits) {
            panic!("visitor panicked on visit #{}", self.visits);
        }
        if self.fail_visit_at == Some(self.visits) {
            return Err(anyhow!("visit #{} failed", self.visits));
        }
        self.events.push(VisitorEvent::Visit {
            host: host.id.0,
            messages: message_ids.iter().map(|id| id.0).collect(),
        });
        Ok(())
    }

    fn close(&mut self, success: bool) -> Result<(), anyhow::Error> {
        self.events.push(VisitorEvent::Close(success));
        if self.fail_close {
            return Err(anyhow!("close failed"));
        }
        Ok(())
    }
}

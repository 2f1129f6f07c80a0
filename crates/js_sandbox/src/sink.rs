//! Destinations for output records.

use common::OutputRecord;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;

/// Receives records in emission order.
///
/// Emission is synchronous and infallible from the script's point of view:
/// a sink that can no longer deliver drops the record.
pub trait RecordSink {
    fn emit(&self, record: OutputRecord);
}

impl<S: RecordSink + ?Sized> RecordSink for Rc<S> {
    fn emit(&self, record: OutputRecord) {
        (**self).emit(record)
    }
}

/// Sink feeding the outbound half of an isolation channel.
pub struct ChannelSink {
    tx: UnboundedSender<OutputRecord>,
    terminated: Arc<AtomicBool>,
}

impl ChannelSink {
    pub fn new(tx: UnboundedSender<OutputRecord>, terminated: Arc<AtomicBool>) -> Self {
        Self { tx, terminated }
    }
}

impl RecordSink for ChannelSink {
    fn emit(&self, record: OutputRecord) {
        if self.terminated.load(Ordering::Acquire) {
            return;
        }
        if self.tx.send(record).is_err() {
            tracing::trace!("Record stream closed, dropping record");
        }
    }
}

/// In-process sink that keeps every record.
#[derive(Default)]
pub struct VecSink {
    records: RefCell<Vec<OutputRecord>>,
}

impl VecSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the records emitted so far.
    pub fn records(&self) -> Vec<OutputRecord> {
        self.records.borrow().clone()
    }

    /// Take the records emitted so far.
    pub fn take(&self) -> Vec<OutputRecord> {
        std::mem::take(&mut *self.records.borrow_mut())
    }

    pub fn len(&self) -> usize {
        self.records.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.borrow().is_empty()
    }
}

impl RecordSink for VecSink {
    fn emit(&self, record: OutputRecord) {
        self.records.borrow_mut().push(record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::RecordType;
    use tokio::sync::mpsc;

    #[test]
    fn test_vec_sink_keeps_order() {
        let sink = VecSink::new();
        sink.emit(OutputRecord::text(RecordType::Log, "first"));
        sink.emit(OutputRecord::text(RecordType::Warn, "second"));

        let records = sink.take();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].display_text(), "first");
        assert_eq!(records[1].record_type, RecordType::Warn);
        assert!(sink.is_empty());
    }

    #[test]
    fn test_channel_sink_stops_after_termination() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let terminated = Arc::new(AtomicBool::new(false));
        let sink = ChannelSink::new(tx, terminated.clone());

        sink.emit(OutputRecord::text(RecordType::Log, "delivered"));
        terminated.store(true, Ordering::Release);
        sink.emit(OutputRecord::text(RecordType::Log, "dropped"));
        drop(sink);

        assert_eq!(rx.blocking_recv().map(|r| r.display_text()), Some("delivered".to_string()));
        assert!(rx.blocking_recv().is_none());
    }

    #[test]
    fn test_channel_sink_tolerates_closed_receiver() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let sink = ChannelSink::new(tx, Arc::new(AtomicBool::new(false)));
        sink.emit(OutputRecord::text(RecordType::Log, "nobody listens"));
    }
}

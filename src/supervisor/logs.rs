// src/supervisor/logs.rs

//! Log fan-out for supervised services.
//!
//! Every line read from a service is offered to two bounded queues:
//! - the instance's own queue ([`InstanceQueue`], 100 entries), closed when
//!   the process exits;
//! - every subscriber of the global [`LogHub`] (1,000 entries each).
//!
//! Offers never wait. A full queue drops the entry so a slow consumer can
//! never stall the reader draining the process's pipe.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::trace;

use crate::state::LogEntry;

pub const INSTANCE_LOG_CAPACITY: usize = 100;
pub const GLOBAL_LOG_CAPACITY: usize = 1000;

/// Broadcast of log entries from all services to any number of subscribers.
#[derive(Debug)]
pub struct LogHub {
    capacity: usize,
    subscribers: Mutex<Vec<mpsc::Sender<LogEntry>>>,
}

impl LogHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// New receiver of every entry published from now on.
    pub fn subscribe(&self) -> mpsc::Receiver<LogEntry> {
        let (tx, rx) = mpsc::channel(self.capacity);
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    /// Offer `entry` to every subscriber; drop it for those that are full and
    /// forget those that hung up.
    pub fn publish(&self, entry: &LogEntry) {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        subscribers.retain(|tx| match tx.try_send(entry.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                trace!(service = %entry.service_name, "global log queue full; dropping entry");
                true
            }
            Err(TrySendError::Closed(_)) => false,
        });
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Default for LogHub {
    fn default() -> Self {
        Self::new(GLOBAL_LOG_CAPACITY)
    }
}

/// Producer side of one instance's log queue, shared by its two readers and
/// its exit monitor.
///
/// Holds the only sender, so [`close`](Self::close) ends the stream for the
/// receiver once buffered entries are consumed.
#[derive(Debug, Clone)]
pub(crate) struct InstanceQueue {
    tx: Arc<Mutex<Option<mpsc::Sender<LogEntry>>>>,
}

impl InstanceQueue {
    pub(crate) fn new(capacity: usize) -> (Self, mpsc::Receiver<LogEntry>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                tx: Arc::new(Mutex::new(Some(tx))),
            },
            rx,
        )
    }

    /// Returns false if the entry was dropped (full or closed).
    pub(crate) fn offer(&self, entry: LogEntry) -> bool {
        let guard = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            Some(tx) => tx.try_send(entry).is_ok(),
            None => false,
        }
    }

    pub(crate) fn close(&self) {
        self.tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LogStream;

    fn entry(line: &str) -> LogEntry {
        LogEntry::now("api", line, LogStream::Stdout)
    }

    #[tokio::test]
    async fn full_subscriber_drops_without_blocking() {
        let hub = LogHub::new(2);
        let mut rx = hub.subscribe();

        for i in 0..10 {
            hub.publish(&entry(&format!("line {i}")));
        }

        assert_eq!(rx.recv().await.unwrap().line, "line 0");
        assert_eq!(rx.recv().await.unwrap().line, "line 1");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn closed_subscribers_are_pruned() {
        let hub = LogHub::default();
        let keep = hub.subscribe();
        drop(hub.subscribe());

        hub.publish(&entry("hello"));

        assert_eq!(hub.subscriber_count(), 1);
        drop(keep);
    }

    #[tokio::test]
    async fn closing_instance_queue_ends_stream_after_buffer() {
        let (queue, mut rx) = InstanceQueue::new(INSTANCE_LOG_CAPACITY);
        assert!(queue.offer(entry("before close")));

        queue.close();
        assert!(!queue.offer(entry("after close")));

        assert_eq!(rx.recv().await.unwrap().line, "before close");
        assert!(rx.recv().await.is_none());
    }
}

use async_trait::async_trait;
use backlog_broker::{FieldValue, PublishSink};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::{sleep, Instant};

#[derive(Clone, Debug, PartialEq)]
pub struct PublishedRow {
    pub timestamp: Option<i64>,
    pub fields: Vec<FieldValue>,
}

/// Sink double that stores every row it is handed.
///
/// A gated sink parks each publish until [`RecordingSink::release`] hands it
/// a permit, which lets tests observe the link while a publish is in flight.
#[derive(Clone)]
pub struct RecordingSink {
    rows: Arc<Mutex<Vec<PublishedRow>>>,
    accept: Arc<AtomicBool>,
    gate: Option<Arc<Semaphore>>,
    publish_started: Arc<AtomicUsize>,
}

impl Default for RecordingSink {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingSink {
    pub fn new() -> Self {
        Self {
            rows: Arc::new(Mutex::new(Vec::new())),
            accept: Arc::new(AtomicBool::new(true)),
            gate: None,
            publish_started: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn gated() -> Self {
        Self {
            gate: Some(Arc::new(Semaphore::new(0))),
            ..Self::new()
        }
    }

    /// Lets `permits` parked publishes complete.
    pub fn release(&self, permits: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(permits);
        }
    }

    pub fn set_accept(&self, accept: bool) {
        self.accept.store(accept, Ordering::SeqCst);
    }

    pub fn publish_started(&self) -> usize {
        self.publish_started.load(Ordering::SeqCst)
    }

    pub fn rows(&self) -> Vec<PublishedRow> {
        self.rows.lock().expect("rows lock poisoned").clone()
    }

    pub fn row_count(&self) -> usize {
        self.rows.lock().expect("rows lock poisoned").len()
    }

    pub async fn wait_for_rows(&self, count: usize, within: Duration) -> bool {
        let deadline = Instant::now() + within;
        while Instant::now() < deadline {
            if self.row_count() >= count {
                return true;
            }
            sleep(Duration::from_millis(10)).await;
        }
        self.row_count() >= count
    }

    pub async fn wait_for_publish_started(&self, count: usize, within: Duration) -> bool {
        let deadline = Instant::now() + within;
        while Instant::now() < deadline {
            if self.publish_started() >= count {
                return true;
            }
            sleep(Duration::from_millis(10)).await;
        }
        self.publish_started() >= count
    }
}

#[async_trait]
impl PublishSink for RecordingSink {
    async fn publish(&self, timestamp: Option<i64>, fields: Vec<FieldValue>) -> bool {
        self.publish_started.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            match gate.acquire().await {
                Ok(permit) => permit.forget(),
                Err(_) => return false,
            }
        }
        if !self.accept.load(Ordering::SeqCst) {
            return false;
        }
        self.rows
            .lock()
            .expect("rows lock poisoned")
            .push(PublishedRow { timestamp, fields });
        true
    }
}

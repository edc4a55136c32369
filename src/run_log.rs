//! Progress transcript for extraction runs.
//!
//! `RunLogger` keeps every message in memory for the caller and forwards
//! thread-scoped messages to a `LogSink` from a single delivery task, so the
//! sink sees them in call order. Delivery failures never reach the workflow.

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

/// One persisted progress message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub id: String,
    pub thread_id: String,
    pub run_id: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// External store for run transcripts
#[async_trait]
pub trait LogSink: Send + Sync {
    /// Clear every entry for the thread, then record the optional first message
    async fn start_run(&self, thread_id: &str, run_id: &str, initial: Option<&str>) -> Result<()>;

    async fn append_logs(&self, thread_id: &str, run_id: &str, messages: &[String]) -> Result<()>;

    /// Entries for the thread, oldest first
    async fn list_logs_by_thread(&self, thread_id: &str) -> Result<Vec<LogEntry>>;
}

enum Delivery {
    StartRun(Option<String>),
    Append(String),
}

/// Per-run logger
pub struct RunLogger {
    thread_id: Option<String>,
    run_id: String,
    logs: Mutex<Vec<String>>,
    run_started: AtomicBool,
    tx: Mutex<Option<mpsc::UnboundedSender<Delivery>>>,
    delivery: Mutex<Option<JoinHandle<()>>>,
}

impl RunLogger {
    /// Logger for a run. Without a thread or sink nothing is persisted, but
    /// the in-memory transcript is still collected.
    pub fn new(
        sink: Option<Arc<dyn LogSink>>,
        thread_id: Option<String>,
        run_id: Option<String>,
    ) -> Self {
        let thread_id = thread_id.filter(|t| !t.trim().is_empty());
        let run_id = run_id
            .filter(|r| !r.trim().is_empty())
            .unwrap_or_else(|| format!("run-{}", Utc::now().timestamp_millis()));

        let (tx, delivery) = match (&sink, &thread_id) {
            (Some(sink), Some(thread)) => {
                let (tx, rx) = mpsc::unbounded_channel();
                let handle = tokio::spawn(deliver(
                    sink.clone(),
                    thread.clone(),
                    run_id.clone(),
                    rx,
                ));
                (Some(tx), Some(handle))
            }
            _ => (None, None),
        };

        Self {
            thread_id,
            run_id,
            logs: Mutex::new(Vec::new()),
            run_started: AtomicBool::new(false),
            tx: Mutex::new(tx),
            delivery: Mutex::new(delivery),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn thread_id(&self) -> Option<&str> {
        self.thread_id.as_deref()
    }

    /// Record a progress message; blank messages are ignored
    pub fn record_log(&self, raw: impl AsRef<str>) {
        let message = raw.as_ref().trim();
        if message.is_empty() {
            return;
        }
        debug!(run_id = %self.run_id, "{}", message);
        self.logs.lock().push(message.to_string());
        self.send(Delivery::Append(message.to_string()));
    }

    /// Clear the thread's previous transcript, once per logger. A no-op for
    /// unscoped runs.
    pub fn start_run_if_needed(&self, initial: Option<&str>) {
        if self.thread_id.is_none() || self.run_started.swap(true, Ordering::SeqCst) {
            return;
        }

        let initial = initial.map(str::trim).filter(|m| !m.is_empty());
        if let Some(message) = initial {
            self.logs.lock().push(message.to_string());
        }
        self.send(Delivery::StartRun(initial.map(str::to_string)));
    }

    /// Messages recorded so far, in order
    pub fn all_logs(&self) -> Vec<String> {
        self.logs.lock().clone()
    }

    /// Stop accepting deliveries and wait for queued ones to reach the sink
    pub async fn finish(&self) {
        self.tx.lock().take();
        let handle = self.delivery.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "Log delivery task ended abnormally");
            }
        }
    }

    fn send(&self, delivery: Delivery) {
        if let Some(tx) = self.tx.lock().as_ref() {
            let _ = tx.send(delivery);
        }
    }
}

async fn deliver(
    sink: Arc<dyn LogSink>,
    thread_id: String,
    run_id: String,
    mut rx: mpsc::UnboundedReceiver<Delivery>,
) {
    while let Some(first) = rx.recv().await {
        let mut pending = Some(first);

        while let Some(delivery) = pending.take() {
            match delivery {
                Delivery::StartRun(initial) => {
                    if let Err(e) = sink.start_run(&thread_id, &run_id, initial.as_deref()).await {
                        warn!(error = %e, thread_id = %thread_id, "Failed to start run log");
                    }
                }
                Delivery::Append(message) => {
                    // Batch whatever else is already queued behind this message
                    let mut batch = vec![message];
                    while let Ok(next) = rx.try_recv() {
                        match next {
                            Delivery::Append(m) => batch.push(m),
                            other => {
                                pending = Some(other);
                                break;
                            }
                        }
                    }
                    if let Err(e) = sink.append_logs(&thread_id, &run_id, &batch).await {
                        warn!(error = %e, thread_id = %thread_id, "Failed to deliver run logs");
                    }
                }
            }
        }
    }
}

/// Process-local log store
#[derive(Default)]
pub struct InMemoryLogStore {
    entries: Mutex<Vec<LogEntry>>,
    last_stamp: Mutex<Option<DateTime<Utc>>>,
}

impl InMemoryLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Strictly increasing timestamps, so entries sort in insertion order
    fn next_stamp(&self) -> DateTime<Utc> {
        let mut last = self.last_stamp.lock();
        let now = Utc::now();
        let stamp = match *last {
            Some(prev) if now <= prev => prev + Duration::milliseconds(1),
            _ => now,
        };
        *last = Some(stamp);
        stamp
    }

    fn insert(&self, thread_id: &str, run_id: &str, message: &str) {
        let entry = LogEntry {
            id: Uuid::new_v4().to_string(),
            thread_id: thread_id.to_string(),
            run_id: run_id.to_string(),
            message: message.to_string(),
            created_at: self.next_stamp(),
        };
        self.entries.lock().push(entry);
    }
}

#[async_trait]
impl LogSink for InMemoryLogStore {
    async fn start_run(&self, thread_id: &str, run_id: &str, initial: Option<&str>) -> Result<()> {
        self.entries.lock().retain(|e| e.thread_id != thread_id);
        if let Some(message) = initial {
            self.insert(thread_id, run_id, message);
        }
        Ok(())
    }

    async fn append_logs(&self, thread_id: &str, run_id: &str, messages: &[String]) -> Result<()> {
        for message in messages {
            self.insert(thread_id, run_id, message);
        }
        Ok(())
    }

    async fn list_logs_by_thread(&self, thread_id: &str) -> Result<Vec<LogEntry>> {
        let mut entries: Vec<LogEntry> = self
            .entries
            .lock()
            .iter()
            .filter(|e| e.thread_id == thread_id)
            .cloned()
            .collect();
        entries.sort_by_key(|e| e.created_at);
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScoutError;

    struct FailingSink;

    #[async_trait]
    impl LogSink for FailingSink {
        async fn start_run(&self, _: &str, _: &str, _: Option<&str>) -> Result<()> {
            Err(ScoutError::Store("unavailable".to_string()))
        }

        async fn append_logs(&self, _: &str, _: &str, _: &[String]) -> Result<()> {
            Err(ScoutError::Store("unavailable".to_string()))
        }

        async fn list_logs_by_thread(&self, _: &str) -> Result<Vec<LogEntry>> {
            Ok(Vec::new())
        }
    }

    fn messages(entries: &[LogEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.message.as_str()).collect()
    }

    #[tokio::test]
    async fn test_messages_delivered_in_order() {
        let store = Arc::new(InMemoryLogStore::new());
        let logger = RunLogger::new(
            Some(store.clone()),
            Some("thread-1".to_string()),
            Some("run-a".to_string()),
        );

        logger.start_run_if_needed(Some("Starting"));
        for i in 0..50 {
            logger.record_log(format!("step {}", i));
        }
        logger.finish().await;

        let entries = store.list_logs_by_thread("thread-1").await.unwrap();
        assert_eq!(entries.len(), 51);
        assert_eq!(entries[0].message, "Starting");
        assert_eq!(entries[50].message, "step 49");
        assert!(entries.windows(2).all(|w| w[0].created_at < w[1].created_at));
        assert_eq!(logger.all_logs().len(), 51);
    }

    #[tokio::test]
    async fn test_new_run_clears_previous_transcript() {
        let store = Arc::new(InMemoryLogStore::new());

        let first = RunLogger::new(Some(store.clone()), Some("t".to_string()), None);
        first.start_run_if_needed(None);
        first.record_log("first run message");
        first.finish().await;

        let second = RunLogger::new(Some(store.clone()), Some("t".to_string()), None);
        second.start_run_if_needed(Some("second run"));
        second.start_run_if_needed(Some("ignored"));
        second.record_log("second run message");
        second.finish().await;

        let entries = store.list_logs_by_thread("t").await.unwrap();
        assert_eq!(messages(&entries), vec!["second run", "second run message"]);
    }

    #[tokio::test]
    async fn test_other_threads_untouched() {
        let store = Arc::new(InMemoryLogStore::new());
        store
            .append_logs("other", "r", &["keep me".to_string()])
            .await
            .unwrap();

        let logger = RunLogger::new(Some(store.clone()), Some("mine".to_string()), None);
        logger.start_run_if_needed(None);
        logger.finish().await;

        assert_eq!(store.list_logs_by_thread("other").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unscoped_logger_keeps_memory_only() {
        let store = Arc::new(InMemoryLogStore::new());
        let logger = RunLogger::new(Some(store.clone()), None, None);

        logger.start_run_if_needed(Some("Starting"));
        logger.record_log("  hello  ");
        logger.record_log("   ");
        logger.finish().await;

        assert_eq!(logger.all_logs(), vec!["hello"]);
        assert!(logger.run_id().starts_with("run-"));
    }

    #[tokio::test]
    async fn test_delivery_failures_swallowed() {
        let logger = RunLogger::new(Some(Arc::new(FailingSink)), Some("t".to_string()), None);
        logger.start_run_if_needed(Some("Starting"));
        logger.record_log("still recorded");
        logger.finish().await;

        assert_eq!(logger.all_logs(), vec!["Starting", "still recorded"]);
    }
}

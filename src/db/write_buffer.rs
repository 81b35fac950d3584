//! Write buffer for async batch inserts of request logs
//!
//! The interceptor hands finished entries to a channel and returns the response
//! immediately; this task writes them out in batches. A failed batch is dropped
//! and only reported at debug level, it never reaches a client.

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::{Database, RequestLogEntry};
use crate::error::PersistError;

/// Sender handle for queueing log entries
pub type LogSender = mpsc::UnboundedSender<RequestLogEntry>;

const BATCH_SIZE: usize = 100;
const FLUSH_INTERVAL_MS: u64 = 250;

/// Start the write buffer background task.
/// Returns the sender the interceptor uses and the task handle, which finishes
/// after every sender is dropped and the remainder has been flushed.
pub fn start_write_buffer(db: Arc<Database>) -> (LogSender, JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();

    let handle = tokio::spawn(write_buffer_task(db, rx));

    (tx, handle)
}

/// Background task that collects entries and writes them in batches
async fn write_buffer_task(db: Arc<Database>, mut rx: mpsc::UnboundedReceiver<RequestLogEntry>) {
    let mut buffer: Vec<RequestLogEntry> = Vec::with_capacity(BATCH_SIZE);
    let mut flush_interval =
        tokio::time::interval(tokio::time::Duration::from_millis(FLUSH_INTERVAL_MS));

    info!(
        "Request log buffer started (batch_size={}, flush_interval={}ms)",
        BATCH_SIZE, FLUSH_INTERVAL_MS
    );

    loop {
        tokio::select! {
            entry = rx.recv() => {
                match entry {
                    Some(e) => {
                        buffer.push(e);
                        if buffer.len() >= BATCH_SIZE {
                            flush_batch(&db, &mut buffer).await;
                        }
                    }
                    None => {
                        // Channel closed, flush remaining and exit
                        if !buffer.is_empty() {
                            flush_batch(&db, &mut buffer).await;
                        }
                        info!("Request log buffer shutting down");
                        break;
                    }
                }
            }
            // Periodic flush for low-traffic periods
            _ = flush_interval.tick() => {
                if !buffer.is_empty() {
                    flush_batch(&db, &mut buffer).await;
                }
            }
        }
    }
}

/// Flush buffered entries to the database in a single transaction
async fn flush_batch(db: &Database, buffer: &mut Vec<RequestLogEntry>) {
    let count = buffer.len();
    debug!("Flushing {} request log entries", count);

    match db
        .batch_insert_request_logs(buffer)
        .await
        .map_err(PersistError::Log)
    {
        Ok(()) => debug!("Flushed {} request log entries", count),
        Err(e) => debug!("Dropped {} request log entries: {}", count, e),
    }

    buffer.clear();
}

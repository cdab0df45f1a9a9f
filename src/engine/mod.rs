mod buffer;
mod dispatch;
mod message;
mod reconcile;
mod timers;
mod worker;

pub use buffer::{SegmentMetadata, SegmentStatus};
pub use message::FlushAction;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::sync::{oneshot, watch};

use crate::classify::{CommandClassifier, CompletenessClassifier};
use crate::config::EngineConfig;
use crate::emit::SegmentSink;
use crate::error::EngineError;
use message::EngineMsg;
use worker::EngineWorker;

/// Handle to a running segmentation engine. Cheap to clone; every clone
/// talks to the same worker. `append`/`pause`/`resume`/`status` are
/// synchronous and never block, so they are safe to call from inside
/// the emit callback.
#[derive(Clone)]
pub struct SegmentEngine {
    tx: UnboundedSender<EngineMsg>,
    status_rx: watch::Receiver<SegmentStatus>,
}

impl SegmentEngine {
    /// Spawns the worker onto the current tokio runtime. `classifier`
    /// and `commands` are optional: without a completeness classifier
    /// the Thought policy still finalizes through its auto-complete
    /// timer, and without a command classifier spoken cues are matched
    /// against the built-in phrase table.
    pub fn spawn(
        config: EngineConfig,
        sink: Arc<dyn SegmentSink>,
        classifier: Option<Arc<dyn CompletenessClassifier>>,
        commands: Option<Arc<dyn CommandClassifier>>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(SegmentStatus::Open);
        let worker = EngineWorker::new(config, rx, tx.clone(), sink, classifier, commands, status_tx);
        tokio::spawn(worker.run());
        Self { tx, status_rx }
    }

    /// Feeds a snapshot of newly transcribed text, stamped now.
    pub fn append(&self, text: impl Into<String>) {
        self.append_at(text, Utc::now());
    }

    /// Feeds text with a caller-supplied timestamp (recorded on the
    /// segment's start/end metadata).
    pub fn append_at(&self, text: impl Into<String>, at: DateTime<Utc>) {
        let _ = self.tx.send(EngineMsg::Append { text: text.into(), at });
    }

    /// Stops accumulating; appended text is dropped until resume.
    pub fn pause(&self) {
        let _ = self.tx.send(EngineMsg::Pause);
    }

    pub fn resume(&self) {
        let _ = self.tx.send(EngineMsg::Resume);
    }

    /// Buffer status as of the last message the worker processed.
    pub fn status(&self) -> SegmentStatus {
        *self.status_rx.borrow()
    }

    /// Finalizes (Store) or drops (Discard) the current buffer.
    /// Returns the emitted or dropped text, None when the buffer was
    /// empty.
    pub async fn flush(&self, action: FlushAction) -> Result<Option<String>, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineMsg::Flush { action, reply: reply_tx })
            .map_err(|_| EngineError::Stopped)?;
        reply_rx.await.map_err(|_| EngineError::Stopped)
    }

    /// Cancels timers and in-flight classification, flushes any
    /// remaining content (reason "shutdown"), and stops the worker.
    /// After this returns no further emit fires. Idempotent.
    pub async fn stop(&self) -> Result<(), EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.tx.send(EngineMsg::Stop { reply: reply_tx }).is_err() {
            // Worker already gone; stopping twice is fine.
            return Ok(());
        }
        let _ = reply_rx.await;
        Ok(())
    }
}

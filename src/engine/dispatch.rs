use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use super::message::EngineMsg;
use crate::classify::CompletenessClassifier;

/// Snapshots shorter than this carry too little signal to judge.
const MIN_CLASSIFIABLE_CHARS: usize = 3;

/// Bounded, non-blocking submission of snapshots to the completeness
/// classifier. At capacity submissions are dropped, not queued; callers
/// retry through the next timer fire or append. Each accepted task owns
/// an independent copy of its snapshot and reports back by message.
pub(crate) struct ClassificationDispatcher {
    classifier: Option<Arc<dyn CompletenessClassifier>>,
    slots: Arc<Semaphore>,
    tracker: TaskTracker,
    cancel: CancellationToken,
    tx: UnboundedSender<EngineMsg>,
    classify_timeout: Duration,
}

impl ClassificationDispatcher {
    pub fn new(
        classifier: Option<Arc<dyn CompletenessClassifier>>,
        max_workers: usize,
        classify_timeout: Duration,
        tx: UnboundedSender<EngineMsg>,
    ) -> Self {
        Self {
            classifier,
            slots: Arc::new(Semaphore::new(max_workers)),
            tracker: TaskTracker::new(),
            cancel: CancellationToken::new(),
            tx,
            classify_timeout,
        }
    }

    /// Returns whether the snapshot was accepted. A false return is
    /// backpressure or a guard, never an error.
    pub fn submit(&self, snapshot: String) -> bool {
        let Some(classifier) = self.classifier.clone() else {
            trace!("no completeness classifier wired; submission skipped");
            return false;
        };
        if snapshot.trim().len() < MIN_CLASSIFIABLE_CHARS {
            trace!(chars = snapshot.len(), "snapshot too short to classify");
            return false;
        }
        let permit = match Arc::clone(&self.slots).try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                debug!("classification slots exhausted; snapshot dropped");
                return false;
            }
        };

        let request_id = Uuid::new_v4();
        let tx = self.tx.clone();
        let cancel = self.cancel.clone();
        let deadline = self.classify_timeout;
        debug!(%request_id, chars = snapshot.len(), "snapshot submitted for classification");

        self.tracker.spawn(async move {
            // Slot is held for the lifetime of the request.
            let _permit = permit;
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(%request_id, "classification abandoned at shutdown");
                }
                outcome = timeout(deadline, classifier.classify(&snapshot)) => match outcome {
                    Ok(Ok(verdict)) => {
                        let _ = tx.send(EngineMsg::Verdict { snapshot, verdict });
                    }
                    Ok(Err(err)) => {
                        // Inconclusive: nothing is delivered, a later
                        // trigger resubmits.
                        warn!(%request_id, error = %err, "classifier error; verdict dropped");
                    }
                    Err(_) => {
                        warn!(%request_id, "classification timed out; verdict dropped");
                    }
                },
            }
        });
        true
    }

    /// Cancels in-flight work and waits for the tasks to wind down. No
    /// verdict message is acted on after this: the worker loop exits
    /// right after, dropping anything still queued.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.tracker.close();
        self.tracker.wait().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{Verdict, VerdictSource};
    use crate::error::ClassifyError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;

    /// Classifier that parks until released, counting concurrent calls.
    struct ParkedClassifier {
        started: AtomicUsize,
        release: tokio::sync::Notify,
    }

    #[async_trait]
    impl CompletenessClassifier for ParkedClassifier {
        async fn classify(&self, _text: &str) -> Result<Verdict, ClassifyError> {
            self.started.fetch_add(1, Ordering::SeqCst);
            self.release.notified().await;
            Ok(Verdict {
                is_complete: true,
                confidence: 0.99,
                rationale: "test".into(),
                source: VerdictSource::Classifier,
            })
        }
    }

    #[tokio::test]
    async fn rejects_above_capacity_without_blocking() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let classifier = Arc::new(ParkedClassifier {
            started: AtomicUsize::new(0),
            release: tokio::sync::Notify::new(),
        });
        let dispatcher = ClassificationDispatcher::new(
            Some(classifier.clone()),
            2,
            Duration::from_secs(15),
            tx,
        );

        assert!(dispatcher.submit("First snapshot text.".into()));
        assert!(dispatcher.submit("Second snapshot text.".into()));
        for _ in 0..20 {
            assert!(
                !dispatcher.submit("Overflow snapshot.".into()),
                "submissions beyond capacity must be dropped"
            );
        }
        // 20 rejected submits completed synchronously; nothing beyond
        // the two accepted ones ever started.
        tokio::task::yield_now().await;
        assert!(classifier.started.load(Ordering::SeqCst) <= 2);

        classifier.release.notify_waiters();
        dispatcher.shutdown().await;
    }

    #[tokio::test]
    async fn short_snapshots_are_skipped() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let classifier = Arc::new(ParkedClassifier {
            started: AtomicUsize::new(0),
            release: tokio::sync::Notify::new(),
        });
        let dispatcher =
            ClassificationDispatcher::new(Some(classifier), 2, Duration::from_secs(15), tx);
        assert!(!dispatcher.submit("ok".into()));
        assert!(!dispatcher.submit("  a ".into()));
    }
}

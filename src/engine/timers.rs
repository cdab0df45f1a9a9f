use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio::task::AbortHandle;
use tokio::time::sleep;

use super::message::{EngineMsg, TimerKind};

/// One-shot, cancellable timers. Each kind carries a monotonically
/// increasing generation; schedule/cancel bump it, and a fire whose
/// generation is stale is ignored by the worker. Aborting the sleep
/// task is best-effort, the generation check is the actual guard
/// against a timer that was already mid-fire when cancelled.
pub(crate) struct TimerSet {
    tx: UnboundedSender<EngineMsg>,
    generations: [u64; TimerKind::COUNT],
    handles: [Option<AbortHandle>; TimerKind::COUNT],
}

impl TimerSet {
    pub fn new(tx: UnboundedSender<EngineMsg>) -> Self {
        Self {
            tx,
            generations: [0; TimerKind::COUNT],
            handles: [None, None, None, None],
        }
    }

    /// Cancel-and-reschedule: any previous timer of this kind is dead
    /// from this point on, even if its task already woke up.
    pub fn schedule(&mut self, kind: TimerKind, delay: Duration) {
        let idx = kind.index();
        self.generations[idx] += 1;
        let generation = self.generations[idx];
        if let Some(handle) = self.handles[idx].take() {
            handle.abort();
        }
        let tx = self.tx.clone();
        let task = tokio::spawn(async move {
            sleep(delay).await;
            let _ = tx.send(EngineMsg::TimerFired { kind, generation });
        });
        self.handles[idx] = Some(task.abort_handle());
    }

    pub fn cancel(&mut self, kind: TimerKind) {
        let idx = kind.index();
        self.generations[idx] += 1;
        if let Some(handle) = self.handles[idx].take() {
            handle.abort();
        }
    }

    pub fn cancel_all(&mut self) {
        for kind in TimerKind::ALL {
            self.cancel(kind);
        }
    }

    pub fn is_current(&self, kind: TimerKind, generation: u64) -> bool {
        self.generations[kind.index()] == generation
    }
}

use chrono::{DateTime, Utc};
use tokio::sync::oneshot;

use crate::classify::Verdict;
use crate::control::DetectedCommand;

/// The four one-shot timers the worker arms. Pause and AutoComplete
/// belong to the Thought policy, Gap to the Topic policy; Lifetime runs
/// under both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TimerKind {
    Pause,
    AutoComplete,
    Gap,
    Lifetime,
}

impl TimerKind {
    pub(crate) const COUNT: usize = 4;
    pub(crate) const ALL: [TimerKind; TimerKind::COUNT] = [
        TimerKind::Pause,
        TimerKind::AutoComplete,
        TimerKind::Gap,
        TimerKind::Lifetime,
    ];

    pub(crate) fn index(self) -> usize {
        match self {
            TimerKind::Pause => 0,
            TimerKind::AutoComplete => 1,
            TimerKind::Gap => 2,
            TimerKind::Lifetime => 3,
        }
    }

    pub(crate) fn as_str(self) -> &'static str {
        match self {
            TimerKind::Pause => "pause",
            TimerKind::AutoComplete => "auto_complete",
            TimerKind::Gap => "gap",
            TimerKind::Lifetime => "lifetime",
        }
    }
}

/// What `flush` should do with the buffered content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushAction {
    /// Finalize and emit (reason "manual_flush").
    Store,
    /// Clear without emitting.
    Discard,
}

/// Everything the worker loop reacts to. External callers only produce
/// Append/Pause/Resume/Flush/Stop; the rest are sent by the engine's
/// own timer tasks, classification tasks, and command scans.
#[derive(Debug)]
pub(crate) enum EngineMsg {
    Append {
        text: String,
        at: DateTime<Utc>,
    },
    /// A timer elapsed. Carries the generation captured at schedule
    /// time; the worker drops fires whose generation has moved on.
    TimerFired {
        kind: TimerKind,
        generation: u64,
    },
    /// A completeness verdict for the snapshot it was computed from.
    Verdict {
        snapshot: String,
        verdict: Verdict,
    },
    /// Result of one command scan over the side buffer.
    Commands {
        batch: Vec<DetectedCommand>,
        fallback: bool,
    },
    Pause,
    Resume,
    Flush {
        action: FlushAction,
        reply: oneshot::Sender<Option<String>>,
    },
    Stop {
        reply: oneshot::Sender<()>,
    },
}

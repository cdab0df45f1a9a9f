use std::time::Duration;

/// Which finalize policy the engine runs. The two policies share the
/// whole architecture; they differ only in which timers arm on append
/// and whether verdicts flow through the reconciler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentationPolicy {
    /// Pause-timer submits to the classifier; auto-complete timer
    /// guarantees forward progress when the classifier never answers.
    Thought,
    /// Gap-timer finalizes directly, bypassing the classifier.
    Topic,
}

impl SegmentationPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SegmentationPolicy::Thought => "thought",
            SegmentationPolicy::Topic => "topic",
        }
    }
}

/// Immutable per-instance engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub policy: SegmentationPolicy,

    /// Quiet period after the last append before the current text is
    /// submitted for completeness classification (Thought policy).
    pub min_pause_before_analysis: Duration,
    /// Hard ceiling on waiting for a classifier opinion; fires a
    /// synthesized complete verdict (Thought policy).
    pub auto_complete_timeout: Duration,
    /// Quiet period after which the buffer finalizes directly
    /// (Topic policy).
    pub max_gap: Duration,
    /// Ceiling on total buffer age regardless of activity. Started on
    /// the first append, never reset by later ones.
    pub max_lifetime: Duration,
    /// Housekeeping cadence of the worker loop; drives the control
    /// interpreter's trigger checks.
    pub short_gap: Duration,

    /// In-flight classification slots. At capacity, submissions are
    /// dropped, not queued.
    pub max_workers: usize,
    /// A verdict finalizes only above this confidence. The command
    /// threshold (0.7) is separate, see control module.
    pub confidence_threshold: f32,
    /// Per-request ceiling on a completeness classification.
    pub classify_timeout: Duration,

    /// Command scan fires at least this often while raw text is pending.
    pub command_check_interval: Duration,
    /// An input gap this long also triggers a command scan.
    pub pause_threshold: Duration,
    /// Per-request ceiling on a command detection call.
    pub command_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            policy: SegmentationPolicy::Thought,
            min_pause_before_analysis: Duration::from_millis(500),
            auto_complete_timeout: Duration::from_secs(5),
            max_gap: Duration::from_secs(3),
            max_lifetime: Duration::from_secs(300),
            short_gap: Duration::from_millis(500),
            max_workers: 3,
            confidence_threshold: 0.8,
            classify_timeout: Duration::from_secs(15),
            command_check_interval: Duration::from_secs(5),
            pause_threshold: Duration::from_secs(2),
            command_timeout: Duration::from_secs(5),
        }
    }
}

impl EngineConfig {
    pub fn topic() -> Self {
        Self {
            policy: SegmentationPolicy::Topic,
            ..Self::default()
        }
    }
}

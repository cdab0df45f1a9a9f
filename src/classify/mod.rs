pub mod openai;
pub mod prompts;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::control::DetectedCommand;
use crate::error::ClassifyError;

/// Where a completeness judgment came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictSource {
    /// The external classifier answered.
    Classifier,
    /// Synthesized by the auto-complete timer; always complete at
    /// confidence 1.0.
    AutoTimeout,
}

/// A completeness judgment for one specific snapshot of the growing
/// text. Only ever interpreted together with the snapshot it was issued
/// for; the reconciler decides whether that snapshot still matters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verdict {
    pub is_complete: bool,
    /// 0.0..=1.0
    pub confidence: f32,
    pub rationale: String,
    pub source: VerdictSource,
}

impl Verdict {
    /// The verdict the auto-complete timer manufactures when the
    /// classifier never got back to us.
    pub fn auto_timeout() -> Self {
        Self {
            is_complete: true,
            confidence: 1.0,
            rationale: "auto-complete timeout elapsed".to_string(),
            source: VerdictSource::AutoTimeout,
        }
    }
}

/// Judges whether a snapshot of accumulated text is a complete thought.
/// Implementations may take up to the engine's classify timeout; errors
/// and overruns are treated as inconclusive, never fatal.
#[async_trait]
pub trait CompletenessClassifier: Send + Sync {
    async fn classify(&self, text: &str) -> Result<Verdict, ClassifyError>;
}

/// Scans raw accumulated text for spoken control commands. On failure
/// the engine falls back to substring matching, so implementations
/// should return an error rather than inventing low-confidence output.
#[async_trait]
pub trait CommandClassifier: Send + Sync {
    async fn detect_commands(&self, text: &str) -> Result<Vec<DetectedCommand>, ClassifyError>;
}

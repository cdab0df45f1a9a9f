pub mod classify;
pub mod config;
pub mod control;
pub mod emit;
pub mod engine;
pub mod error;

// Re-export the types most callers need directly
pub use classify::{CommandClassifier, CompletenessClassifier, Verdict, VerdictSource};
pub use config::{EngineConfig, SegmentationPolicy};
pub use control::{ControlCommand, DetectedCommand};
pub use emit::{ChannelSink, FinalizedSegment, SegmentSink};
pub use engine::{FlushAction, SegmentEngine, SegmentMetadata, SegmentStatus};
pub use error::{ClassifyError, EngineError};

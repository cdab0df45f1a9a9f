use std::sync::Arc;

use tokio::sync::mpsc;

use crate::engine::SegmentMetadata;

/// Receives every finalized segment, exactly once each. Called inline
/// by the engine worker: keep it fast or hand off. Re-entering the
/// engine handle from inside the callback is allowed; it observes the
/// already-reset buffer.
pub trait SegmentSink: Send + Sync {
    fn on_segment_complete(&self, text: &str, meta: &SegmentMetadata);
}

impl<F> SegmentSink for F
where
    F: Fn(&str, &SegmentMetadata) + Send + Sync,
{
    fn on_segment_complete(&self, text: &str, meta: &SegmentMetadata) {
        self(text, meta)
    }
}

/// A finalized segment as carried by `ChannelSink`.
#[derive(Debug, Clone)]
pub struct FinalizedSegment {
    pub text: String,
    pub metadata: SegmentMetadata,
}

/// Sink that forwards segments onto an unbounded channel. The send is
/// non-blocking, which keeps the worker's emit path fast; used by the
/// tests and by pipelines that consume segments elsewhere.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<FinalizedSegment>,
}

impl ChannelSink {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<FinalizedSegment>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

impl SegmentSink for ChannelSink {
    fn on_segment_complete(&self, text: &str, meta: &SegmentMetadata) {
        let _ = self.tx.send(FinalizedSegment {
            text: text.to_string(),
            metadata: meta.clone(),
        });
    }
}

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::classify::Verdict;
use crate::config::SegmentationPolicy;

/// Externally observable buffer states. Closed is an instantaneous
/// transition inside finalize/discard, never a rest state, so it does
/// not appear here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SegmentStatus {
    Open,
    Paused,
}

/// Metadata handed to the emit collaborator alongside the segment text.
#[derive(Debug, Clone, Serialize)]
pub struct SegmentMetadata {
    /// Finalize policy that produced the segment ("thought" / "topic").
    pub kind: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub sentence_count: usize,
    /// Ordered log of triggering reasons; the finalize reason is always
    /// the last entry.
    pub control_flags: Vec<String>,
    pub reason: String,
    /// Present when a classifier verdict caused the finalize.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
}

/// Result of one append.
pub(crate) struct AppendOutcome {
    /// Full accumulated text after the append, for snapshot comparison.
    pub joined: String,
    /// The buffer went empty -> non-empty with this append.
    pub first: bool,
}

/// The single active segment: ordered sentence units plus lifecycle
/// state. Owned exclusively by the worker; all methods are plain
/// mutations, serialization is the worker's message queue.
pub(crate) struct SegmentBuffer {
    policy: SegmentationPolicy,
    content: Vec<String>,
    status: SegmentStatus,
    start_time: Option<DateTime<Utc>>,
    last_update: Option<DateTime<Utc>>,
    control_flags: Vec<String>,
}

impl SegmentBuffer {
    pub fn new(policy: SegmentationPolicy) -> Self {
        Self {
            policy,
            content: Vec::new(),
            status: SegmentStatus::Open,
            start_time: None,
            last_update: None,
            control_flags: Vec::new(),
        }
    }

    pub fn status(&self) -> SegmentStatus {
        self.status
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    pub fn joined(&self) -> String {
        self.content.join(" ")
    }

    /// Splits incoming text into sentence units and extends the buffer.
    /// Returns None (and drops the text) while paused, or when the text
    /// contains nothing accumulable.
    pub fn append(&mut self, text: &str, at: DateTime<Utc>) -> Option<AppendOutcome> {
        if self.status == SegmentStatus::Paused {
            return None;
        }
        let units = split_sentences(text);
        if units.is_empty() {
            return None;
        }
        let first = self.content.is_empty();
        if first {
            self.start_time = Some(at);
        }
        self.content.extend(units);
        self.last_update = Some(at);
        Some(AppendOutcome { joined: self.joined(), first })
    }

    pub fn pause(&mut self) -> bool {
        if self.status == SegmentStatus::Open {
            self.status = SegmentStatus::Paused;
            true
        } else {
            false
        }
    }

    pub fn resume(&mut self) -> bool {
        if self.status == SegmentStatus::Paused {
            self.status = SegmentStatus::Open;
            true
        } else {
            false
        }
    }

    /// Records a control flag on the live segment (voice-cue log).
    pub fn note_flag(&mut self, flag: &str) {
        self.control_flags.push(flag.to_string());
    }

    /// Replaces the sentence units without touching timestamps, flags,
    /// or status. Used when a trigger phrase is cut out of the content
    /// before a command-driven finalize.
    pub fn rewrite(&mut self, text: &str) {
        self.content = split_sentences(text);
    }

    /// Closes the segment: snapshots content + metadata, resets to a
    /// fresh OPEN segment, and returns what to emit. The reset happens
    /// before the caller can invoke the sink, so a sink that re-enters
    /// the engine observes the new buffer. Empty buffer: no-op.
    pub fn finalize(
        &mut self,
        reason: &str,
        verdict: Option<&Verdict>,
    ) -> Option<(String, SegmentMetadata)> {
        if self.content.is_empty() {
            return None;
        }
        let text = self.joined();
        let count = self.content.len();
        let meta = self.take_metadata(count, reason, verdict);
        Some((text, meta))
    }

    /// Verdict-driven close: emits the judged snapshot, not the current
    /// (possibly longer) content. The whole buffer still resets, so any
    /// unjudged tail is dropped with it.
    pub fn finalize_snapshot(
        &mut self,
        snapshot: &str,
        reason: &str,
        verdict: Option<&Verdict>,
    ) -> Option<(String, SegmentMetadata)> {
        if self.content.is_empty() {
            return None;
        }
        let count = split_sentences(snapshot).len();
        let meta = self.take_metadata(count, reason, verdict);
        Some((snapshot.to_string(), meta))
    }

    /// Clears without emitting. Returns the dropped text, if any.
    pub fn discard(&mut self) -> Option<String> {
        if self.content.is_empty() {
            return None;
        }
        let text = self.joined();
        self.reset();
        Some(text)
    }

    fn take_metadata(
        &mut self,
        sentence_count: usize,
        reason: &str,
        verdict: Option<&Verdict>,
    ) -> SegmentMetadata {
        let start_time = self.start_time.unwrap_or_else(Utc::now);
        let end_time = self.last_update.unwrap_or(start_time);
        let mut control_flags = std::mem::take(&mut self.control_flags);
        control_flags.push(reason.to_string());
        let meta = SegmentMetadata {
            kind: self.policy.as_str().to_string(),
            start_time,
            end_time,
            sentence_count,
            control_flags,
            reason: reason.to_string(),
            confidence: verdict.map(|v| v.confidence),
            rationale: verdict.map(|v| v.rationale.clone()),
        };
        self.reset();
        meta
    }

    fn reset(&mut self) {
        self.content.clear();
        self.control_flags.clear();
        self.start_time = None;
        self.last_update = None;
        self.status = SegmentStatus::Open;
    }
}

/// Splits text into sentence units: a unit ends at `.`, `!` or `?`
/// followed by whitespace. A trailing fragment without terminal
/// punctuation is kept as its own unit; empty fragments are dropped.
pub(crate) fn split_sentences(text: &str) -> Vec<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    let mut units = Vec::new();
    let mut current = String::new();
    let mut chars = trimmed.chars().peekable();
    while let Some(c) = chars.next() {
        current.push(c);
        if matches!(c, '.' | '!' | '?') && chars.peek().is_some_and(|n| n.is_whitespace()) {
            while chars.peek().is_some_and(|n| n.is_whitespace()) {
                chars.next();
            }
            let unit = current.trim().to_string();
            if !unit.is_empty() {
                units.push(unit);
            }
            current.clear();
        }
    }
    let tail = current.trim().to_string();
    if !tail.is_empty() {
        units.push(tail);
    }
    units
}

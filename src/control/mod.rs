use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Spoken control commands the interpreter can act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlCommand {
    NewSegment,
    Discard,
    Pause,
    Resume,
    ManualFlush,
}

impl ControlCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            ControlCommand::NewSegment => "new_segment",
            ControlCommand::Discard => "discard",
            ControlCommand::Pause => "pause",
            ControlCommand::Resume => "resume",
            ControlCommand::ManualFlush => "manual_flush",
        }
    }

    /// Lenient name parsing: accepts the canonical names plus the legacy
    /// tool names some prompt revisions still emit.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "new_segment" | "new_note" => Some(ControlCommand::NewSegment),
            "discard" | "discard_previous" => Some(ControlCommand::Discard),
            "pause" | "pause_note" => Some(ControlCommand::Pause),
            "resume" | "resume_note" => Some(ControlCommand::Resume),
            "manual_flush" | "flush" | "flush_current" => Some(ControlCommand::ManualFlush),
            _ => None,
        }
    }
}

/// One command found in a scan of the raw side buffer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectedCommand {
    pub command: ControlCommand,
    /// 0.0..=1.0
    pub confidence: f32,
    /// The words that triggered the command, as they appear in the text.
    pub trigger_phrase: String,
}

/// Only the first command at or above this confidence is acted on;
/// the rest of the batch is ignored.
pub const COMMAND_CONFIDENCE_THRESHOLD: f32 = 0.7;

/// Confidence assigned to phrase-table matches in degraded mode. Must
/// clear COMMAND_CONFIDENCE_THRESHOLD or the fallback could never act.
pub const FALLBACK_CONFIDENCE: f32 = 0.75;

/// Deterministic cue table for degraded mode (command classifier down).
const FALLBACK_PHRASES: &[(&str, ControlCommand)] = &[
    ("new note", ControlCommand::NewSegment),
    ("discard that", ControlCommand::Discard),
    ("pause note", ControlCommand::Pause),
    ("resume note", ControlCommand::Resume),
    ("flush note", ControlCommand::ManualFlush),
];

/// Case-insensitive substring scan against the fixed phrase table.
/// Matches are ordered by where they occur in the text, so "first
/// command acted on" means first spoken, same as the classifier path.
pub fn fallback_detect(text: &str) -> Vec<DetectedCommand> {
    let lowered = text.to_ascii_lowercase();
    let mut found: Vec<(usize, DetectedCommand)> = Vec::new();
    for (phrase, command) in FALLBACK_PHRASES {
        if let Some(pos) = lowered.find(phrase) {
            found.push((
                pos,
                DetectedCommand {
                    command: *command,
                    confidence: FALLBACK_CONFIDENCE,
                    trigger_phrase: (*phrase).to_string(),
                },
            ));
        }
    }
    found.sort_by_key(|(pos, _)| *pos);
    found.into_iter().map(|(_, cmd)| cmd).collect()
}

/// Splits accumulated text around the first occurrence of a trigger
/// phrase, case-insensitively. Returns (before, after), both trimmed.
/// None when the phrase does not occur, e.g. a classifier paraphrased
/// the trigger words.
pub fn split_at_phrase(text: &str, phrase: &str) -> Option<(String, String)> {
    if phrase.trim().is_empty() {
        return None;
    }
    let pos = text.to_ascii_lowercase().find(&phrase.to_ascii_lowercase())?;
    let before = text[..pos].trim().to_string();
    let after = text[pos + phrase.len()..].trim().to_string();
    Some((before, after))
}

/// Removes the first occurrence of the trigger phrase, joining the
/// surrounding text with a single space.
pub fn strip_phrase(text: &str, phrase: &str) -> String {
    match split_at_phrase(text, phrase) {
        Some((before, after)) if before.is_empty() => after,
        Some((before, after)) if after.is_empty() => before,
        Some((before, after)) => format!("{} {}", before, after),
        None => text.to_string(),
    }
}

/// Side-channel state for the control interpreter: raw incoming text
/// (absorbed even while the segment buffer is paused, so "resume" stays
/// detectable) plus the two trigger clocks.
pub struct ControlMonitor {
    accumulated: String,
    last_check: Instant,
    last_input: Option<Instant>,
    in_flight: bool,
}

impl ControlMonitor {
    pub fn new(now: Instant) -> Self {
        Self {
            accumulated: String::new(),
            last_check: now,
            last_input: None,
            in_flight: false,
        }
    }

    pub fn absorb(&mut self, text: &str, now: Instant) {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return;
        }
        if !self.accumulated.is_empty() {
            self.accumulated.push(' ');
        }
        self.accumulated.push_str(trimmed);
        self.last_input = Some(now);
    }

    /// A scan is due when raw text is pending, no scan is already in
    /// flight, and either the interval elapsed since the last scan or
    /// the input has gone quiet for pause_threshold.
    pub fn due(&self, now: Instant, interval: Duration, pause_threshold: Duration) -> bool {
        if self.in_flight || self.accumulated.is_empty() {
            return false;
        }
        if now.duration_since(self.last_check) >= interval {
            return true;
        }
        match self.last_input {
            Some(t) => now.duration_since(t) >= pause_threshold,
            None => false,
        }
    }

    /// Takes the side buffer for a scan. Cleared here, before the
    /// classifier answers: the scan consumes this text regardless of
    /// outcome.
    pub fn begin(&mut self, now: Instant) -> String {
        self.in_flight = true;
        self.last_check = now;
        self.last_input = None;
        std::mem::take(&mut self.accumulated)
    }

    pub fn complete(&mut self) {
        self.in_flight = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_matches_known_phrases() {
        let cmds = fallback_detect("ok discard that please");
        assert_eq!(cmds.len(), 1);
        assert_eq!(cmds[0].command, ControlCommand::Discard);
        assert_eq!(cmds[0].trigger_phrase, "discard that");
        assert!(cmds[0].confidence >= COMMAND_CONFIDENCE_THRESHOLD);
    }

    #[test]
    fn fallback_is_case_insensitive_and_position_ordered() {
        let cmds = fallback_detect("Pause Note for a second, then NEW NOTE");
        assert_eq!(cmds.len(), 2);
        // "pause note" occurs before "new note" in the utterance.
        assert_eq!(cmds[0].command, ControlCommand::Pause);
        assert_eq!(cmds[1].command, ControlCommand::NewSegment);
    }

    #[test]
    fn fallback_ignores_unrelated_text() {
        assert!(fallback_detect("the weather is nice today").is_empty());
    }

    #[test]
    fn split_at_phrase_divides_around_trigger() {
        let (before, after) =
            split_at_phrase("First point. new note Second point.", "new note").unwrap();
        assert_eq!(before, "First point.");
        assert_eq!(after, "Second point.");
    }

    #[test]
    fn split_at_phrase_missing_phrase_is_none() {
        assert!(split_at_phrase("no cue here", "new note").is_none());
    }

    #[test]
    fn strip_phrase_removes_trigger_only() {
        assert_eq!(
            strip_phrase("Keep this. flush note", "flush note"),
            "Keep this."
        );
        assert_eq!(
            strip_phrase("Before flush note after", "flush note"),
            "Before after"
        );
        assert_eq!(strip_phrase("untouched text", "flush note"), "untouched text");
    }

    #[test]
    fn command_parse_accepts_legacy_names() {
        assert_eq!(ControlCommand::parse("new_note"), Some(ControlCommand::NewSegment));
        assert_eq!(ControlCommand::parse("FLUSH_CURRENT"), Some(ControlCommand::ManualFlush));
        assert_eq!(ControlCommand::parse("discard"), Some(ControlCommand::Discard));
        assert_eq!(ControlCommand::parse("unknown_verb"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn monitor_triggers_on_interval_and_gap() {
        let interval = Duration::from_secs(5);
        let gap = Duration::from_secs(2);
        let mut mon = ControlMonitor::new(Instant::now());

        // Empty side buffer never triggers.
        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(!mon.due(Instant::now(), interval, gap));

        // Fresh input: neither clock has elapsed yet.
        mon.absorb("hello there", Instant::now());
        assert!(!mon.due(Instant::now(), interval, gap));

        // Input gap of 2s triggers before the 5s interval does.
        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(mon.due(Instant::now(), interval, gap));

        let taken = mon.begin(Instant::now());
        assert_eq!(taken, "hello there");
        // In flight: no re-trigger even though clocks keep running.
        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(!mon.due(Instant::now(), interval, gap));

        mon.complete();
        // Side buffer was consumed; still nothing to scan.
        assert!(!mon.due(Instant::now(), interval, gap));

        // Continuous input: the interval clock fires even with no gap.
        for _ in 0..11 {
            mon.absorb("more", Instant::now());
            tokio::time::advance(Duration::from_millis(500)).await;
        }
        assert!(mon.due(Instant::now(), interval, gap));
    }
}

use crate::classify::Verdict;

/// What to do with an arrived verdict. Pure decision, no side effects;
/// the worker acts on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Reconciliation {
    /// Relevant, complete, confident: close the segment.
    Finalize,
    /// The judged snapshot no longer matches the buffer; drop silently.
    Stale,
    /// Relevant but not complete or not confident enough; keep waiting.
    Inconclusive,
}

/// Trims whitespace and strips trailing punctuation so that "same text,
/// one more period" compares equal.
pub(crate) fn normalize(text: &str) -> &str {
    text.trim()
        .trim_end_matches(|c: char| c.is_whitespace() || matches!(c, '.' | '!' | '?' | ',' | ';' | ':'))
}

/// A verdict still applies when the current content equals the judged
/// snapshot, or extends it as a string prefix. Growth beyond the judged
/// span keeps the verdict relevant; the finalize then emits the
/// original snapshot, not the longer content.
pub(crate) fn is_relevant(current: &str, snapshot: &str) -> bool {
    let current = normalize(current);
    let snapshot = normalize(snapshot);
    if snapshot.is_empty() {
        return false;
    }
    current == snapshot || current.starts_with(snapshot)
}

pub(crate) fn reconcile(
    current: &str,
    snapshot: &str,
    verdict: &Verdict,
    confidence_threshold: f32,
) -> Reconciliation {
    if !is_relevant(current, snapshot) {
        return Reconciliation::Stale;
    }
    if verdict.is_complete && verdict.confidence > confidence_threshold {
        Reconciliation::Finalize
    } else {
        Reconciliation::Inconclusive
    }
}

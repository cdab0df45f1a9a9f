use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::sync::{oneshot, watch};
use tokio::time::{interval, timeout, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::buffer::{SegmentBuffer, SegmentMetadata, SegmentStatus};
use super::dispatch::ClassificationDispatcher;
use super::message::{EngineMsg, FlushAction, TimerKind};
use super::reconcile::{reconcile, Reconciliation};
use super::timers::TimerSet;
use crate::classify::{CommandClassifier, CompletenessClassifier, Verdict, VerdictSource};
use crate::config::{EngineConfig, SegmentationPolicy};
use crate::control::{self, ControlMonitor, DetectedCommand};
use crate::control::{ControlCommand, COMMAND_CONFIDENCE_THRESHOLD};
use crate::emit::SegmentSink;

/// Single owner of all mutable engine state. External callers and the
/// engine's own timer/classifier tasks talk to it exclusively through
/// `EngineMsg`; the message queue is the serialization, there is no
/// lock.
pub(crate) struct EngineWorker {
    config: EngineConfig,
    rx: UnboundedReceiver<EngineMsg>,
    tx: UnboundedSender<EngineMsg>,
    buffer: SegmentBuffer,
    timers: TimerSet,
    dispatcher: ClassificationDispatcher,
    control: ControlMonitor,
    commands: Option<Arc<dyn CommandClassifier>>,
    sink: Arc<dyn SegmentSink>,
    status_tx: watch::Sender<SegmentStatus>,
    cancel: CancellationToken,
    /// When the lifetime timer will fire, while running.
    lifetime_deadline: Option<Instant>,
    /// Time left on the lifetime clock, frozen while paused.
    lifetime_remaining: Option<std::time::Duration>,
}

impl EngineWorker {
    pub fn new(
        config: EngineConfig,
        rx: UnboundedReceiver<EngineMsg>,
        tx: UnboundedSender<EngineMsg>,
        sink: Arc<dyn SegmentSink>,
        classifier: Option<Arc<dyn CompletenessClassifier>>,
        commands: Option<Arc<dyn CommandClassifier>>,
        status_tx: watch::Sender<SegmentStatus>,
    ) -> Self {
        let dispatcher = ClassificationDispatcher::new(
            classifier,
            config.max_workers,
            config.classify_timeout,
            tx.clone(),
        );
        Self {
            buffer: SegmentBuffer::new(config.policy),
            timers: TimerSet::new(tx.clone()),
            dispatcher,
            control: ControlMonitor::new(Instant::now()),
            commands,
            sink,
            status_tx,
            cancel: CancellationToken::new(),
            lifetime_deadline: None,
            lifetime_remaining: None,
            config,
            rx,
            tx,
        }
    }

    pub async fn run(mut self) {
        info!(policy = self.config.policy.as_str(), "segmentation engine started");

        // Housekeeping cadence; only evaluates control-scan triggers.
        let mut cadence = interval(self.config.short_gap);
        cadence.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                maybe = self.rx.recv() => match maybe {
                    Some(msg) => {
                        if self.handle(msg).await {
                            break;
                        }
                    }
                    None => {
                        debug!("all senders dropped; engine loop exiting");
                        break;
                    }
                },
                _ = cadence.tick() => {
                    self.maybe_scan_commands();
                }
            }
        }

        info!("segmentation engine stopped");
    }

    /// Returns true when the loop should exit.
    async fn handle(&mut self, msg: EngineMsg) -> bool {
        match msg {
            EngineMsg::Append { text, at } => {
                self.handle_append(&text, at);
                false
            }
            EngineMsg::TimerFired { kind, generation } => {
                self.handle_timer(kind, generation);
                false
            }
            EngineMsg::Verdict { snapshot, verdict } => {
                self.handle_verdict(&snapshot, verdict);
                false
            }
            EngineMsg::Commands { batch, fallback } => {
                self.control.complete();
                self.apply_commands(batch, fallback);
                false
            }
            EngineMsg::Pause => {
                self.do_pause(None);
                false
            }
            EngineMsg::Resume => {
                self.do_resume(None);
                false
            }
            EngineMsg::Flush { action, reply } => {
                self.handle_flush(action, reply);
                false
            }
            EngineMsg::Stop { reply } => {
                self.shutdown(reply).await;
                true
            }
        }
    }

    // === Input path ===

    fn handle_append(&mut self, text: &str, at: DateTime<Utc>) {
        // The side buffer sees everything, paused or not, so a spoken
        // "resume" stays detectable.
        self.control.absorb(text, Instant::now());

        if self.buffer.status() == SegmentStatus::Paused {
            debug!(chars = text.len(), "append dropped; buffer is paused");
            return;
        }
        self.accumulate(text, at);
    }

    fn accumulate(&mut self, text: &str, at: DateTime<Utc>) {
        let Some(outcome) = self.buffer.append(text, at) else {
            return;
        };
        trace!(total_chars = outcome.joined.len(), "text accumulated");

        self.arm_policy_timers();
        if outcome.first {
            // Lifetime starts once per segment and is never pushed
            // back by later appends.
            self.timers.schedule(TimerKind::Lifetime, self.config.max_lifetime);
            self.lifetime_deadline = Some(Instant::now() + self.config.max_lifetime);
        }
    }

    fn arm_policy_timers(&mut self) {
        match self.config.policy {
            SegmentationPolicy::Thought => {
                self.timers
                    .schedule(TimerKind::Pause, self.config.min_pause_before_analysis);
                self.timers
                    .schedule(TimerKind::AutoComplete, self.config.auto_complete_timeout);
            }
            SegmentationPolicy::Topic => {
                self.timers.schedule(TimerKind::Gap, self.config.max_gap);
            }
        }
    }

    // === Timer path ===

    fn handle_timer(&mut self, kind: TimerKind, generation: u64) {
        if !self.timers.is_current(kind, generation) {
            trace!(timer = kind.as_str(), "stale timer fire ignored");
            return;
        }
        match kind {
            TimerKind::Pause => {
                if !self.buffer.is_empty() {
                    // A false return is backpressure; the next pause
                    // timer or the auto-complete timer resubmits.
                    let _ = self.dispatcher.submit(self.buffer.joined());
                }
            }
            TimerKind::AutoComplete => {
                if !self.buffer.is_empty() {
                    let snapshot = self.buffer.joined();
                    self.handle_verdict(&snapshot, Verdict::auto_timeout());
                }
            }
            TimerKind::Gap => {
                let _ = self.finalize_current("max_gap_exceeded", None);
            }
            TimerKind::Lifetime => {
                let _ = self.finalize_current("max_lifetime_exceeded", None);
            }
        }
    }

    // === Verdict path ===

    fn handle_verdict(&mut self, snapshot: &str, verdict: Verdict) {
        let current = self.buffer.joined();
        match reconcile(&current, snapshot, &verdict, self.config.confidence_threshold) {
            Reconciliation::Finalize => {
                let reason = match verdict.source {
                    VerdictSource::Classifier => "classified_complete",
                    VerdictSource::AutoTimeout => "auto_complete_timeout",
                };
                // Emits the judged snapshot; any newer tail resets away
                // with the buffer.
                if let Some((text, meta)) =
                    self.buffer.finalize_snapshot(snapshot, reason, Some(&verdict))
                {
                    self.finish_emit(&text, meta);
                }
            }
            Reconciliation::Stale => {
                trace!(snapshot_chars = snapshot.len(), "stale verdict discarded");
            }
            Reconciliation::Inconclusive => {
                debug!(
                    is_complete = verdict.is_complete,
                    confidence = verdict.confidence,
                    "verdict inconclusive; buffer stays open"
                );
            }
        }
    }

    // === Control command path ===

    fn maybe_scan_commands(&mut self) {
        let now = Instant::now();
        if !self
            .control
            .due(now, self.config.command_check_interval, self.config.pause_threshold)
        {
            return;
        }
        let text = self.control.begin(now);

        match self.commands.clone() {
            Some(classifier) => {
                debug!(chars = text.len(), "dispatching command scan");
                let tx = self.tx.clone();
                let cancel = self.cancel.clone();
                let deadline = self.config.command_timeout;
                tokio::spawn(async move {
                    tokio::select! {
                        _ = cancel.cancelled() => {}
                        outcome = timeout(deadline, classifier.detect_commands(&text)) => {
                            let msg = match outcome {
                                Ok(Ok(batch)) => EngineMsg::Commands { batch, fallback: false },
                                Ok(Err(err)) => {
                                    warn!(error = %err, "command classifier failed; using phrase table");
                                    EngineMsg::Commands {
                                        batch: control::fallback_detect(&text),
                                        fallback: true,
                                    }
                                }
                                Err(_) => {
                                    warn!("command classifier timed out; using phrase table");
                                    EngineMsg::Commands {
                                        batch: control::fallback_detect(&text),
                                        fallback: true,
                                    }
                                }
                            };
                            let _ = tx.send(msg);
                        }
                    }
                });
            }
            None => {
                // No classifier wired: the phrase table is the detector.
                let batch = control::fallback_detect(&text);
                self.control.complete();
                if !batch.is_empty() {
                    self.apply_commands(batch, true);
                }
            }
        }
    }

    fn apply_commands(&mut self, batch: Vec<DetectedCommand>, fallback: bool) {
        let Some(cmd) = batch
            .into_iter()
            .find(|c| c.confidence >= COMMAND_CONFIDENCE_THRESHOLD)
        else {
            trace!("command scan found nothing actionable");
            return;
        };
        info!(
            command = cmd.command.as_str(),
            phrase = %cmd.trigger_phrase,
            confidence = cmd.confidence,
            fallback,
            "control command detected"
        );
        match cmd.command {
            ControlCommand::NewSegment => self.manual_split(&cmd),
            ControlCommand::Discard => self.manual_discard(),
            ControlCommand::Pause => self.do_pause(Some(&cmd)),
            ControlCommand::Resume => self.do_resume(Some(&cmd)),
            ControlCommand::ManualFlush => self.manual_flush(&cmd),
        }
    }

    /// Close the current segment at the trigger phrase and open the
    /// next one with whatever followed it.
    fn manual_split(&mut self, cmd: &DetectedCommand) {
        if self.buffer.is_empty() {
            debug!("new-segment command on an empty buffer");
            return;
        }
        let joined = self.buffer.joined();
        match control::split_at_phrase(&joined, &cmd.trigger_phrase) {
            Some((before, after)) => {
                if before.is_empty() {
                    // The cue opened the utterance; nothing to close.
                    self.buffer.discard();
                    self.after_reset();
                } else {
                    self.buffer.rewrite(&before);
                    let _ = self.finalize_current("manual_split", None);
                }
                if !after.is_empty() {
                    self.accumulate(&after, Utc::now());
                }
            }
            // Classifier paraphrased the trigger words; close as-is.
            None => {
                let _ = self.finalize_current("manual_split", None);
            }
        }
    }

    fn manual_discard(&mut self) {
        if let Some(dropped) = self.buffer.discard() {
            info!(chars = dropped.len(), "segment discarded by command");
            self.after_reset();
        }
    }

    fn manual_flush(&mut self, cmd: &DetectedCommand) {
        if self.buffer.is_empty() {
            debug!("flush command on an empty buffer");
            return;
        }
        let joined = self.buffer.joined();
        let stripped = control::strip_phrase(&joined, &cmd.trigger_phrase);
        if stripped.is_empty() {
            // The buffer held nothing but the trigger words.
            self.buffer.discard();
            self.after_reset();
        } else {
            self.buffer.rewrite(&stripped);
            let _ = self.finalize_current("manual_flush", None);
        }
    }

    // === Pause / resume ===

    fn do_pause(&mut self, origin: Option<&DetectedCommand>) {
        if !self.buffer.pause() {
            debug!("pause ignored; already paused");
            return;
        }
        if let Some(cmd) = origin {
            // Spoken cues are directives, not content.
            let joined = self.buffer.joined();
            let stripped = control::strip_phrase(&joined, &cmd.trigger_phrase);
            if stripped != joined {
                self.buffer.rewrite(&stripped);
            }
            self.buffer.note_flag(cmd.command.as_str());
        }
        // Freeze the lifetime clock; paused time does not count.
        self.lifetime_remaining = self
            .lifetime_deadline
            .take()
            .map(|d| d.saturating_duration_since(Instant::now()));
        self.timers.cancel_all();
        let _ = self.status_tx.send(SegmentStatus::Paused);
        info!(by_command = origin.is_some(), "segmentation paused");
    }

    fn do_resume(&mut self, origin: Option<&DetectedCommand>) {
        if !self.buffer.resume() {
            debug!("resume ignored; not paused");
            return;
        }
        if let Some(cmd) = origin {
            self.buffer.note_flag(cmd.command.as_str());
        }
        let _ = self.status_tx.send(SegmentStatus::Open);
        if self.buffer.is_empty() {
            self.lifetime_remaining = None;
        } else {
            self.arm_policy_timers();
            let remaining = self
                .lifetime_remaining
                .take()
                .unwrap_or(self.config.max_lifetime);
            self.timers.schedule(TimerKind::Lifetime, remaining);
            self.lifetime_deadline = Some(Instant::now() + remaining);
        }
        info!(by_command = origin.is_some(), "segmentation resumed");
    }

    // === Finalize / flush / stop ===

    fn handle_flush(&mut self, action: FlushAction, reply: oneshot::Sender<Option<String>>) {
        let result = match action {
            FlushAction::Store => self.finalize_current("manual_flush", None),
            FlushAction::Discard => {
                let dropped = self.buffer.discard();
                if dropped.is_some() {
                    self.after_reset();
                }
                dropped
            }
        };
        let _ = reply.send(result);
    }

    fn finalize_current(&mut self, reason: &str, verdict: Option<&Verdict>) -> Option<String> {
        let (text, meta) = self.buffer.finalize(reason, verdict)?;
        self.finish_emit(&text, meta);
        Some(text)
    }

    /// Buffer is already reset when this runs; clear the timers and
    /// only then hand the segment to the sink, so a sink that calls
    /// back into the engine sees a quiet, fresh instance.
    fn finish_emit(&mut self, text: &str, meta: SegmentMetadata) {
        self.timers.cancel_all();
        self.lifetime_deadline = None;
        self.lifetime_remaining = None;
        let _ = self.status_tx.send(SegmentStatus::Open);
        info!(
            reason = %meta.reason,
            sentences = meta.sentence_count,
            chars = text.len(),
            "segment finalized"
        );
        self.sink.on_segment_complete(text, &meta);
    }

    fn after_reset(&mut self) {
        self.timers.cancel_all();
        self.lifetime_deadline = None;
        self.lifetime_remaining = None;
        let _ = self.status_tx.send(SegmentStatus::Open);
    }

    async fn shutdown(&mut self, reply: oneshot::Sender<()>) {
        info!("engine stopping");
        self.timers.cancel_all();
        self.cancel.cancel();
        self.dispatcher.shutdown().await;
        // Whatever is still buffered goes out exactly once; any verdict
        // still in the queue dies with the loop.
        if self.finalize_current("shutdown", None).is_none() {
            debug!("nothing buffered at shutdown");
        }
        let _ = reply.send(());
    }
}

use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use segue::{
    ChannelSink, EngineConfig, EngineError, FlushAction, SegmentEngine, SegmentMetadata,
    SegmentSink, SegmentStatus,
};
use tokio::time::sleep;

/// Every timer pushed out far enough that nothing finalizes unless the
/// test asks for it.
fn manual_only_config() -> EngineConfig {
    EngineConfig {
        auto_complete_timeout: Duration::from_secs(600),
        max_lifetime: Duration::from_secs(600),
        command_check_interval: Duration::from_secs(600),
        pause_threshold: Duration::from_secs(600),
        ..EngineConfig::default()
    }
}

#[tokio::test(start_paused = true)]
async fn test_flush_store_emits_exactly_once() {
    let (sink, mut rx) = ChannelSink::new();
    let engine = SegmentEngine::spawn(manual_only_config(), sink, None, None);

    engine.append("First sentence. Second sentence.");
    engine.append("Third one.");

    // Flush is queued behind the appends, so it sees all of them.
    let flushed = engine.flush(FlushAction::Store).await.unwrap();
    assert_eq!(
        flushed.as_deref(),
        Some("First sentence. Second sentence. Third one.")
    );

    let seg = rx.try_recv().expect("flush must emit the segment");
    assert_eq!(seg.text, "First sentence. Second sentence. Third one.");
    assert_eq!(seg.metadata.sentence_count, 3, "three sentence units were buffered");
    assert_eq!(seg.metadata.reason, "manual_flush");
    assert_eq!(seg.metadata.kind, "thought");
    assert_eq!(
        seg.metadata.control_flags.last().map(String::as_str),
        Some("manual_flush"),
        "the finalize reason is always the last control flag"
    );
    assert!(seg.metadata.confidence.is_none(), "manual flush carries no verdict");
    assert!(seg.metadata.start_time <= seg.metadata.end_time);

    assert!(rx.try_recv().is_err(), "a segment is emitted exactly once");

    // Flushing the now-empty buffer is a no-op.
    assert_eq!(engine.flush(FlushAction::Store).await.unwrap(), None);
    assert!(rx.try_recv().is_err(), "empty flush must not emit");

    println!("Test Passed: flush emits exactly once");
}

#[tokio::test(start_paused = true)]
async fn test_pause_drops_appends_until_resume() {
    let (sink, mut rx) = ChannelSink::new();
    let engine = SegmentEngine::spawn(manual_only_config(), sink, None, None);
    assert_eq!(engine.status(), SegmentStatus::Open, "fresh engine starts open");

    // 1. Accumulate, then pause.
    engine.append("Alpha start.");
    engine.pause();
    sleep(Duration::from_millis(1)).await; // let the worker drain its queue
    assert_eq!(engine.status(), SegmentStatus::Paused);

    // 2. Text arriving while paused is dropped, not buffered.
    engine.append("Lost while paused.");

    // 3. Resume and keep accumulating.
    engine.resume();
    sleep(Duration::from_millis(1)).await;
    assert_eq!(engine.status(), SegmentStatus::Open);
    engine.append("Back again.");

    let flushed = engine.flush(FlushAction::Store).await.unwrap();
    assert_eq!(flushed.as_deref(), Some("Alpha start. Back again."));

    let seg = rx.try_recv().expect("flush must emit");
    assert_eq!(seg.metadata.sentence_count, 2, "paused text must not be counted");
    assert!(!seg.text.contains("Lost"), "paused append must not leak into the segment");

    println!("Test Passed: pause drops, resume recovers");
}

#[tokio::test(start_paused = true)]
async fn test_flush_while_paused_still_emits() {
    let (sink, mut rx) = ChannelSink::new();
    let engine = SegmentEngine::spawn(manual_only_config(), sink, None, None);

    engine.append("Keep me.");
    engine.pause();
    sleep(Duration::from_millis(1)).await;
    assert_eq!(engine.status(), SegmentStatus::Paused);

    // An explicit flush closes even a paused segment.
    let flushed = engine.flush(FlushAction::Store).await.unwrap();
    assert_eq!(flushed.as_deref(), Some("Keep me."));
    let seg = rx.try_recv().expect("paused buffer still flushes on demand");
    assert_eq!(seg.metadata.reason, "manual_flush");

    // Finalize leaves a fresh OPEN buffer behind.
    assert_eq!(engine.status(), SegmentStatus::Open);

    println!("Test Passed: flush works while paused");
}

#[tokio::test(start_paused = true)]
async fn test_discard_is_silent_and_returns_text() {
    let (sink, mut rx) = ChannelSink::new();
    let engine = SegmentEngine::spawn(manual_only_config(), sink, None, None);

    // Discarding an empty buffer is a no-op.
    assert_eq!(engine.flush(FlushAction::Discard).await.unwrap(), None);

    engine.append("Gone soon.");
    let dropped = engine.flush(FlushAction::Discard).await.unwrap();
    assert_eq!(dropped.as_deref(), Some("Gone soon."));

    assert_eq!(
        engine.flush(FlushAction::Store).await.unwrap(),
        None,
        "discard must leave the buffer empty"
    );
    assert!(rx.try_recv().is_err(), "discard never emits");

    engine.stop().await.unwrap();
    assert!(rx.try_recv().is_err(), "nothing left for shutdown to flush");

    println!("Test Passed: discard is silent");
}

#[tokio::test(start_paused = true)]
async fn test_whitespace_appends_accumulate_nothing() {
    let (sink, mut rx) = ChannelSink::new();
    let engine = SegmentEngine::spawn(manual_only_config(), sink, None, None);

    engine.append("");
    engine.append("   \n\t  ");

    assert_eq!(engine.flush(FlushAction::Store).await.unwrap(), None);
    assert!(rx.try_recv().is_err(), "whitespace must not produce a segment");

    println!("Test Passed: whitespace is ignored");
}

#[tokio::test(start_paused = true)]
async fn test_stop_flushes_remaining_content() {
    let (sink, mut rx) = ChannelSink::new();
    let engine = SegmentEngine::spawn(manual_only_config(), sink, None, None);

    engine.append("One. Two.");
    engine.stop().await.unwrap();

    let seg = rx.try_recv().expect("stop must flush buffered text");
    assert_eq!(seg.text, "One. Two.");
    assert_eq!(seg.metadata.sentence_count, 2);
    assert_eq!(seg.metadata.reason, "shutdown");

    // The handle goes inert: appends are swallowed, flush cannot answer.
    engine.append("ignored after stop");
    assert_eq!(
        engine.flush(FlushAction::Store).await,
        Err(EngineError::Stopped)
    );
    engine.stop().await.unwrap(); // second stop is fine
    assert!(rx.try_recv().is_err(), "no emissions after shutdown");

    println!("Test Passed: stop flushes exactly once and goes inert");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_appenders_all_arrive() {
    let (sink, mut rx) = ChannelSink::new();
    let engine = SegmentEngine::spawn(manual_only_config(), sink, None, None);

    // Three tasks hammer the same handle; clones share the worker.
    let mut tasks = Vec::new();
    for t in 0..3 {
        let handle = engine.clone();
        tasks.push(tokio::spawn(async move {
            for i in 0..5 {
                handle.append(format!("worker {} line {}.", t, i));
                tokio::task::yield_now().await;
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let flushed = engine.flush(FlushAction::Store).await.unwrap();
    let text = flushed.expect("all appends must have landed");

    let seg = rx.try_recv().expect("flush must emit");
    assert_eq!(seg.metadata.sentence_count, 15, "every append from every task counts");
    for t in 0..3 {
        for i in 0..5 {
            let needle = format!("worker {} line {}.", t, i);
            assert!(text.contains(&needle), "missing append: {}", needle);
        }
    }

    println!("Test Passed: 15/15 concurrent appends arrived");
}

#[tokio::test(start_paused = true)]
async fn test_sink_may_reenter_engine_handle() {
    // (text, status the sink observed) per emission.
    let emitted: Arc<Mutex<Vec<(String, SegmentStatus)>>> = Arc::new(Mutex::new(Vec::new()));
    let slot: Arc<OnceLock<SegmentEngine>> = Arc::new(OnceLock::new());

    let sink_emitted = emitted.clone();
    let sink_slot = slot.clone();
    let sink: Arc<dyn SegmentSink> = Arc::new(move |text: &str, _meta: &SegmentMetadata| {
        if let Some(engine) = sink_slot.get() {
            // Call back into the engine from inside the emit callback.
            sink_emitted.lock().unwrap().push((text.to_string(), engine.status()));
            engine.append("Echo from sink.");
        }
    });

    let engine = SegmentEngine::spawn(manual_only_config(), sink, None, None);
    slot.set(engine.clone()).ok();

    engine.append("Original text.");
    let first = engine.flush(FlushAction::Store).await.unwrap();
    assert_eq!(first.as_deref(), Some("Original text."));

    // The append made from inside the sink landed in the fresh buffer.
    sleep(Duration::from_millis(1)).await;
    let second = engine.flush(FlushAction::Store).await.unwrap();
    assert_eq!(second.as_deref(), Some("Echo from sink."));

    {
        let log = emitted.lock().unwrap();
        assert_eq!(log[0].0, "Original text.");
        assert_eq!(log[1].0, "Echo from sink.");
        assert!(
            log.iter().all(|(_, status)| *status == SegmentStatus::Open),
            "the sink must observe the already-reset buffer"
        );
    }

    // The second emit queued one more echo; shutdown flushes it.
    engine.stop().await.unwrap();
    assert_eq!(emitted.lock().unwrap().len(), 3, "shutdown flushes the last echo");

    println!("Test Passed: sink re-entry does not deadlock");
}

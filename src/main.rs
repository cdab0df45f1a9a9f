use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use segue::classify::openai::OpenAiClassifier;
use segue::{
    CommandClassifier, CompletenessClassifier, EngineConfig, FlushAction, SegmentEngine,
    SegmentMetadata, SegmentSink, SegmentationPolicy,
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut config = EngineConfig::default();
    if let Ok(policy) = std::env::var("SEGUE_POLICY") {
        config.policy = match policy.to_ascii_lowercase().as_str() {
            "topic" => SegmentationPolicy::Topic,
            _ => SegmentationPolicy::Thought,
        };
    }

    // Optional LLM collaborators. Without them the engine runs on
    // timers and the built-in phrase table alone.
    let (classifier, commands) = match std::env::var("SEGUE_LLM_URL") {
        Ok(url) => {
            let model =
                std::env::var("SEGUE_LLM_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());
            let mut llm = OpenAiClassifier::new(url, model, Duration::from_secs(10));
            if let Ok(key) = std::env::var("SEGUE_LLM_API_KEY") {
                llm = llm.with_api_key(key);
            }
            let shared = Arc::new(llm);
            (
                Some(shared.clone() as Arc<dyn CompletenessClassifier>),
                Some(shared as Arc<dyn CommandClassifier>),
            )
        }
        Err(_) => (None, None),
    };

    let sink: Arc<dyn SegmentSink> = Arc::new(|text: &str, meta: &SegmentMetadata| {
        println!(
            "--- segment [{}] {} sentence(s), flags {:?}",
            meta.reason, meta.sentence_count, meta.control_flags
        );
        println!("{}", text);
    });

    let engine = SegmentEngine::spawn(config, sink, classifier, commands);
    tracing::info!("engine live; type text, or /pause /resume /flush /discard /status /quit");

    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();
    while let Some(line) = lines.next_line().await? {
        match line.trim() {
            "" => continue,
            "/quit" => break,
            "/pause" => engine.pause(),
            "/resume" => engine.resume(),
            "/status" => println!("status: {:?}", engine.status()),
            "/flush" => match engine.flush(FlushAction::Store).await? {
                Some(text) => println!("flushed: {}", text),
                None => println!("nothing to flush"),
            },
            "/discard" => match engine.flush(FlushAction::Discard).await? {
                Some(text) => println!("discarded: {}", text),
                None => println!("nothing to discard"),
            },
            text => engine.append(text),
        }
    }

    engine.stop().await?;
    Ok(())
}

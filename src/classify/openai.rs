use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::prompts::{COMMAND_SYSTEM_PROMPT, COMPLETENESS_SYSTEM_PROMPT};
use super::{CommandClassifier, CompletenessClassifier, Verdict, VerdictSource};
use crate::control::{ControlCommand, DetectedCommand};
use crate::error::ClassifyError;

/// Classifier backed by any OpenAI-compatible chat completions endpoint
/// (llama-server, vLLM, OpenAI itself). One instance implements both
/// collaborator traits; it is stateless and safe to share.
#[derive(Clone)]
pub struct OpenAiClassifier {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

#[derive(Deserialize)]
struct VerdictPayload {
    is_complete: bool,
    confidence: f32,
    #[serde(default)]
    reasoning: String,
}

#[derive(Deserialize)]
struct CommandsPayload {
    #[serde(default)]
    commands: Vec<CommandPayload>,
}

#[derive(Deserialize)]
struct CommandPayload {
    command: String,
    confidence: f32,
    #[serde(default)]
    trigger_phrase: String,
}

impl OpenAiClassifier {
    /// `base_url` is the API root, e.g. "http://localhost:8080/v1".
    /// `timeout` is the network-level hard ceiling per request; the
    /// engine applies its own (usually longer) timeout on top.
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_else(|_| Client::new()),
            base_url: base_url.into(),
            model: model.into(),
            api_key: None,
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    async fn chat(&self, system: &'static str, user: &str) -> Result<String, ClassifyError> {
        let request_body = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage { role: "system", content: system.to_string() },
                ChatMessage { role: "user", content: user.to_string() },
            ],
            temperature: 0.1,
            max_tokens: 200,
        };

        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let mut request = self.client.post(&url).json(&request_body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(ClassifyError::Status(response.status()));
        }

        let parsed: ChatResponse = response.json().await?;
        let choice = parsed.choices.into_iter().next().ok_or(ClassifyError::EmptyResponse)?;
        Ok(choice.message.content)
    }
}

/// Models wrap JSON in markdown fences often enough that we strip them
/// before parsing instead of failing the whole classification.
fn strip_code_fences(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the fence line itself ("```json" or bare "```").
    let body = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    body.trim().trim_end_matches("```").trim()
}

fn parse_verdict(content: &str) -> Result<Verdict, ClassifyError> {
    let payload: VerdictPayload = serde_json::from_str(strip_code_fences(content))?;
    Ok(Verdict {
        is_complete: payload.is_complete,
        confidence: payload.confidence.clamp(0.0, 1.0),
        rationale: payload.reasoning,
        source: VerdictSource::Classifier,
    })
}

fn parse_commands(content: &str) -> Result<Vec<DetectedCommand>, ClassifyError> {
    let payload: CommandsPayload = serde_json::from_str(strip_code_fences(content))?;
    let mut commands = Vec::new();
    for cmd in payload.commands {
        match ControlCommand::parse(&cmd.command) {
            Some(command) => commands.push(DetectedCommand {
                command,
                confidence: cmd.confidence.clamp(0.0, 1.0),
                trigger_phrase: cmd.trigger_phrase,
            }),
            None => debug!(name = %cmd.command, "skipping unknown command name"),
        }
    }
    Ok(commands)
}

#[async_trait]
impl CompletenessClassifier for OpenAiClassifier {
    async fn classify(&self, text: &str) -> Result<Verdict, ClassifyError> {
        let content = self.chat(COMPLETENESS_SYSTEM_PROMPT, text).await?;
        parse_verdict(&content)
    }
}

#[async_trait]
impl CommandClassifier for OpenAiClassifier {
    async fn detect_commands(&self, text: &str) -> Result<Vec<DetectedCommand>, ClassifyError> {
        let content = self.chat(COMMAND_SYSTEM_PROMPT, text).await?;
        parse_commands(&content)
    }
}

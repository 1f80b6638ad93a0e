//! Summarizer backed by an OpenAI-compatible chat completions endpoint.
//!
//! Long documents are split into word-aligned chunks; each chunk is
//! summarized on its own and, when there is more than one, the chunk
//! summaries are summarized again into one overview. Key points are the
//! bullet lines of the final answer.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use finch_core::{
  artifact::DocumentType,
  summarize::{SummarizeError, Summarizer, SummaryDraft},
};

use crate::{Result, extract};

/// Roughly 3000 tokens at three characters per token.
pub const MAX_CHUNK_CHARS: usize = 9_000;

const SYSTEM_PROMPT: &str =
  "You are a helpful assistant that summarizes financial document excerpts.";

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
  /// Without a key the summarizer reports itself unavailable.
  pub api_key:  Option<String>,
  pub model:    String,
  pub base_url: String,
  pub timeout:  Duration,
}

impl Default for OpenAiConfig {
  fn default() -> Self {
    Self {
      api_key:  None,
      model:    "gpt-4o-mini".into(),
      base_url: "https://api.openai.com/v1".into(),
      timeout:  Duration::from_secs(120),
    }
  }
}

// ─── Wire format ─────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
  model:       &'a str,
  messages:    [ChatMessage<'a>; 2],
  max_tokens:  u32,
  temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
  role:    &'a str,
  content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
  choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
  message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
  #[serde(default)]
  content: Option<String>,
}

// ─── Summarizer ──────────────────────────────────────────────────────────────

pub struct OpenAiSummarizer {
  client: Client,
  config: OpenAiConfig,
}

impl OpenAiSummarizer {
  pub fn new(config: OpenAiConfig) -> Result<Self> {
    let client = Client::builder().timeout(config.timeout).build()?;
    Ok(Self { client, config })
  }

  /// Whether an API key is configured.
  pub fn is_enabled(&self) -> bool { self.api_key().is_some() }

  fn api_key(&self) -> Option<&str> {
    self.config.api_key.as_deref().map(str::trim).filter(|k| !k.is_empty())
  }

  async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String, SummarizeError> {
    let api_key = self
      .api_key()
      .ok_or_else(|| SummarizeError::Unavailable("no OpenAI API key configured".into()))?;
    let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
    let body = ChatRequest {
      model: &self.config.model,
      messages: [
        ChatMessage { role: "system", content: SYSTEM_PROMPT },
        ChatMessage { role: "user", content: prompt },
      ],
      max_tokens,
      temperature: 0.3,
    };

    let resp = self
      .client
      .post(&url)
      .bearer_auth(api_key)
      .json(&body)
      .send()
      .await
      .map_err(upstream)?;
    if !resp.status().is_success() {
      return Err(SummarizeError::Upstream(format!("POST {url} → {}", resp.status())));
    }
    let parsed: ChatResponse = resp.json().await.map_err(upstream)?;
    parsed
      .choices
      .into_iter()
      .next()
      .and_then(|c| c.message.content)
      .map(|c| c.trim().to_owned())
      .filter(|c| !c.is_empty())
      .ok_or_else(|| SummarizeError::Upstream("empty completion".into()))
  }
}

fn upstream(e: reqwest::Error) -> SummarizeError { SummarizeError::Upstream(e.to_string()) }

fn chunk_prompt(document_type: &DocumentType, chunk: &str) -> String {
  format!(
    "Please provide a concise summary of the following {document_type} document excerpt. \
     Focus on key financial metrics, significant events, risks, and forward-looking statements. \
     If the text is too short or irrelevant, indicate that.\n\n\
     Document Excerpt:\n\"\"\"\n{chunk}\n\"\"\"\n\nConcise Summary:"
  )
}

fn overview_prompt(document_type: &DocumentType, summaries: &[String]) -> String {
  let combined = summaries
    .iter()
    .enumerate()
    .map(|(i, s)| format!("Summary of Chunk {}:\n{s}", i + 1))
    .collect::<Vec<_>>()
    .join("\n\n---\n\n");
  format!(
    "Please provide a coherent high-level summary of the following combined chunk summaries \
     from a {document_type} financial document. List the most important points as bullet \
     points.\n\n{combined}"
  )
}

/// Bullet lines of `text` (`-`, `*`, `•` or `1.` style), without the marker.
pub fn key_points(text: &str) -> Vec<String> {
  text
    .lines()
    .filter_map(|line| {
      let line = line.trim();
      let rest = line
        .strip_prefix("- ")
        .or_else(|| line.strip_prefix("* "))
        .or_else(|| line.strip_prefix("• "))
        .or_else(|| {
          let digits = line.find(|c: char| !c.is_ascii_digit())?;
          if digits == 0 {
            return None;
          }
          line[digits..].strip_prefix(". ").or_else(|| line[digits..].strip_prefix(") "))
        })?;
      let rest = rest.trim();
      (!rest.is_empty()).then(|| rest.to_owned())
    })
    .collect()
}

#[async_trait]
impl Summarizer for OpenAiSummarizer {
  async fn summarize(
    &self,
    bytes: &[u8],
    document_type: &DocumentType,
  ) -> Result<SummaryDraft, SummarizeError> {
    if !self.is_enabled() {
      return Err(SummarizeError::Unavailable("no OpenAI API key configured".into()));
    }
    let text = extract::document_text(bytes)
      .ok_or_else(|| SummarizeError::Extraction("no extractable text".into()))?;
    let chunks = extract::chunk_text(&text, MAX_CHUNK_CHARS);
    debug!(document_type = %document_type, chunks = chunks.len(), "summarizing");

    let mut summaries = Vec::with_capacity(chunks.len());
    for (i, chunk) in chunks.iter().enumerate() {
      match self.complete(&chunk_prompt(document_type, chunk), 300).await {
        Ok(summary) => summaries.push(summary),
        Err(e) => warn!(chunk = i + 1, error = %e, "chunk summary failed"),
      }
    }

    let text = match summaries.len() {
      0 => return Err(SummarizeError::Upstream("no chunk could be summarized".into())),
      1 => summaries.remove(0),
      _ => self.complete(&overview_prompt(document_type, &summaries), 600).await?,
    };

    Ok(SummaryDraft {
      key_points: key_points(&text),
      text,
      model: Some(self.config.model.clone()),
    })
  }
}

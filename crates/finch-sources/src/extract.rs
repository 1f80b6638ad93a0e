//! Plain-text extraction and chunking for summarization.
//!
//! HTML is reduced to its visible text with a handful of regular
//! expressions: non-content elements are dropped wholesale, block-level tags
//! become line breaks and every other tag is removed. This is deliberately
//! lossy; the output only has to be good enough for a language model.

use std::sync::LazyLock;

use regex::Regex;

/// Elements whose contents never carry document text.
const DROPPED_ELEMENTS: &[&str] =
  &["script", "style", "head", "title", "nav", "footer", "header", "aside", "noscript"];

static DROPPED: LazyLock<Vec<Regex>> = LazyLock::new(|| {
  DROPPED_ELEMENTS
    .iter()
    .map(|tag| {
      Regex::new(&format!(r"(?is)<{tag}\b[^>]*>.*?</{tag}\s*>")).expect("static regex")
    })
    .collect()
});

static COMMENT: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").expect("static regex"));

static BLOCK_BREAK: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"(?i)<br\s*/?>|</?(p|div|li|ul|ol|tr|table|section|article|h[1-6])\b[^>]*>")
    .expect("static regex")
});

static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").expect("static regex"));

static NUMERIC_ENTITY: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"&#(x[0-9a-fA-F]+|[0-9]+);").expect("static regex"));

static HTML_MARKER: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"(?i)<(!doctype\s+html|html|body|div|p|table)\b").expect("static regex")
});

/// Decode bytes as UTF-8, falling back to Latin-1 (every byte maps to a
/// code point, so this never fails).
pub fn decode_text(bytes: &[u8]) -> String {
  match std::str::from_utf8(bytes) {
    Ok(s) => s.to_owned(),
    Err(_) => bytes.iter().map(|&b| b as char).collect(),
  }
}

/// `true` if `text` looks like an HTML document or fragment.
pub fn looks_like_html(text: &str) -> bool { HTML_MARKER.is_match(text) }

/// Reduce an HTML document to its visible text, one paragraph per line.
pub fn html_to_text(html: &str) -> String {
  let mut text = COMMENT.replace_all(html, " ").into_owned();
  for re in DROPPED.iter() {
    text = re.replace_all(&text, " ").into_owned();
  }
  let text = BLOCK_BREAK.replace_all(&text, "\n");
  let text = TAG.replace_all(&text, " ");
  normalize_lines(&decode_entities(&text))
}

/// Extract summarizable text from raw artifact bytes.
///
/// Returns `None` for formats with no text extraction (PDF, office
/// documents) and for documents with no visible text.
pub fn document_text(bytes: &[u8]) -> Option<String> {
  if bytes.starts_with(b"%PDF") || bytes.starts_with(b"PK\x03\x04") {
    return None;
  }
  let decoded = decode_text(bytes);
  let text = if looks_like_html(&decoded) {
    html_to_text(&decoded)
  } else {
    normalize_lines(&decoded)
  };
  (!text.is_empty()).then_some(text)
}

/// Split `text` into word-aligned chunks of at most `max_chars` characters.
/// A single word longer than `max_chars` becomes its own chunk.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
  let mut chunks = Vec::new();
  let mut current = String::new();
  let mut current_len = 0;

  for word in text.split_whitespace() {
    let word_len = word.chars().count();
    let sep = usize::from(!current.is_empty());
    if current_len + sep + word_len > max_chars && !current.is_empty() {
      chunks.push(std::mem::take(&mut current));
      current_len = 0;
    }
    if !current.is_empty() {
      current.push(' ');
      current_len += 1;
    }
    current.push_str(word);
    current_len += word_len;
  }
  if !current.is_empty() {
    chunks.push(current);
  }
  chunks
}

fn decode_entities(text: &str) -> String {
  let text = NUMERIC_ENTITY.replace_all(text, |caps: &regex::Captures<'_>| {
    let raw = &caps[1];
    let code = match raw.strip_prefix('x') {
      Some(hex) => u32::from_str_radix(hex, 16).ok(),
      None => raw.parse().ok(),
    };
    code
      .and_then(char::from_u32)
      .map(String::from)
      .unwrap_or_default()
  });
  text
    .replace("&nbsp;", " ")
    .replace("&lt;", "<")
    .replace("&gt;", ">")
    .replace("&quot;", "\"")
    .replace("&apos;", "'")
    .replace("&amp;", "&")
}

fn normalize_lines(text: &str) -> String {
  text
    .lines()
    .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
    .filter(|line| !line.is_empty())
    .collect::<Vec<_>>()
    .join("\n")
}

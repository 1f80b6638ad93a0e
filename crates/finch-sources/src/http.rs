//! Shared HTTP plumbing: a polite client with a minimum interval between
//! requests.

use std::time::Duration;

use bytes::Bytes;
use reqwest::{Client, StatusCode, header};
use serde::de::DeserializeOwned;
use tokio::{
  sync::Mutex,
  time::{Instant, sleep_until},
};
use tracing::trace;

use crate::{Error, Result};

// ─── Throttle ────────────────────────────────────────────────────────────────

/// Enforces a minimum interval between successive requests.
///
/// Callers queue on an async mutex, so concurrent users of one throttle are
/// serialized rather than bursting.
#[derive(Debug)]
pub struct Throttle {
  min_interval: Duration,
  last:         Mutex<Option<Instant>>,
}

impl Throttle {
  pub fn new(min_interval: Duration) -> Self { Self { min_interval, last: Mutex::new(None) } }

  pub fn min_interval(&self) -> Duration { self.min_interval }

  /// Wait until a request may be issued, then claim the slot.
  pub async fn wait(&self) {
    let mut last = self.last.lock().await;
    if let Some(prev) = *last {
      sleep_until(prev + self.min_interval).await;
    }
    *last = Some(Instant::now());
  }
}

// ─── Fetcher ─────────────────────────────────────────────────────────────────

/// A downloaded response body.
#[derive(Debug, Clone)]
pub struct Fetched {
  pub bytes:        Bytes,
  pub content_type: Option<String>,
  /// URL after redirects.
  pub final_url:    String,
}

/// A [`reqwest::Client`] paired with a [`Throttle`].
///
/// Cheap to share behind an `Arc`; the inner client is reference-counted.
#[derive(Debug)]
pub struct HttpFetcher {
  client:   Client,
  throttle: Throttle,
}

impl HttpFetcher {
  pub fn new(user_agent: &str, timeout: Duration, min_interval: Duration) -> Result<Self> {
    let client = Client::builder()
      .user_agent(user_agent)
      .timeout(timeout)
      .build()?;
    Ok(Self { client, throttle: Throttle::new(min_interval) })
  }

  pub fn client(&self) -> &Client { &self.client }

  /// Throttled `GET`, failing on any non-success status.
  pub async fn get(&self, url: &str) -> Result<Fetched> {
    self.throttle.wait().await;
    trace!(url, "GET");
    let resp = self.client.get(url).send().await?;
    check_status(url, resp.status())?;

    let content_type = resp
      .headers()
      .get(header::CONTENT_TYPE)
      .and_then(|v| v.to_str().ok())
      .map(|v| v.to_ascii_lowercase());
    let final_url = resp.url().to_string();
    let bytes = resp.bytes().await?;
    Ok(Fetched { bytes, content_type, final_url })
  }

  /// Throttled `GET` of a JSON document.
  pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
    let fetched = self.get(url).await?;
    Ok(serde_json::from_slice(&fetched.bytes)?)
  }

  /// Unthrottled `HEAD` probe with its own timeout; `true` on a 2xx answer
  /// (after redirects).
  pub async fn probe(&self, url: &str, timeout: Duration) -> bool {
    match self.client.head(url).timeout(timeout).send().await {
      Ok(resp) => resp.status().is_success(),
      Err(e) => {
        trace!(url, error = %e, "probe failed");
        false
      }
    }
  }
}

fn check_status(url: &str, status: StatusCode) -> Result<()> {
  if status.is_success() {
    Ok(())
  } else {
    Err(Error::Status { url: url.to_owned(), status })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn throttle_spaces_requests() {
    let throttle = Throttle::new(Duration::from_millis(40));
    let start = Instant::now();
    throttle.wait().await;
    throttle.wait().await;
    throttle.wait().await;
    assert!(start.elapsed() >= Duration::from_millis(80));
  }

  #[tokio::test]
  async fn first_request_is_immediate() {
    let throttle = Throttle::new(Duration::from_secs(10));
    let start = Instant::now();
    throttle.wait().await;
    assert!(start.elapsed() < Duration::from_secs(1));
  }
}

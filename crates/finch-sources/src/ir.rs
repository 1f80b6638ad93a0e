//! Investor-relations page adapter.
//!
//! Finds a company's IR landing page (configured, or guessed from common URL
//! patterns), scans it for links that look like financial documents, and
//! downloads each one. Links are classified by keyword; anything that does
//! not match a known document type is ignored.

use std::{collections::HashSet, sync::LazyLock, time::Duration};

use async_stream::stream;
use futures::stream::BoxStream;
use regex::Regex;
use reqwest::Url;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use finch_core::{
  artifact::{DocumentType, Source},
  company::CompanyRecord,
  source::{Candidate, CandidateError, DocumentTypeFilter, SourceAdapter},
};

use crate::{Error, Result, http::HttpFetcher};

// ─── Config ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct IrConfig {
  pub user_agent:    String,
  /// Pause between document downloads.
  pub min_interval:  Duration,
  pub timeout:       Duration,
  /// Timeout of each landing-page probe.
  pub probe_timeout: Duration,
}

impl Default for IrConfig {
  fn default() -> Self {
    Self {
      user_agent:    "Mozilla/5.0 (compatible; finch/0.1)".into(),
      min_interval:  Duration::from_millis(500),
      timeout:       Duration::from_secs(60),
      probe_timeout: Duration::from_secs(5),
    }
  }
}

// ─── Link classification ─────────────────────────────────────────────────────

/// Label for links to a listing of SEC filings rather than a document.
const SEC_FILINGS: &str = "SEC Filings";

/// Document types and the phrases that identify them, in priority order.
const KEYWORDS: &[(&str, &[&str])] = &[
  ("10-K", &["10-k", "annual report"]),
  ("10-Q", &["10-q", "quarterly report"]),
  ("8-K", &["8-k", "current report"]),
  ("Earnings Release", &["earnings release", "results announcement"]),
  ("Presentation", &["presentation", "slide deck", "investor deck", "webcast slides"]),
  ("Transcript", &["transcript", "earnings call transcript"]),
  (SEC_FILINGS, &["sec filings", "edgar filings"]),
];

const GENERIC_KEYWORDS: &[&str] =
  &["financials", "report", "filing", "investor", "quarterly", "annual"];

const DOCUMENT_EXTENSIONS: &[&str] = &[".pdf", ".xls", ".xlsx", ".doc", ".docx", ".ppt", ".pptx"];

/// Classify a link by its text and target. Returns the document type label,
/// or `None` if the link does not look like a financial document.
pub fn classify_link(text: &str, href: &str) -> Option<&'static str> {
  let text = text.to_lowercase();
  let href = href.to_lowercase();

  let by_text = KEYWORDS
    .iter()
    .find(|(_, kws)| kws.iter().any(|kw| text.contains(kw)));
  let by_href = || {
    KEYWORDS
      .iter()
      .find(|(_, kws)| kws.iter().any(|kw| href.contains(&kw.replace(' ', ""))))
  };
  if let Some((label, _)) = by_text.or_else(by_href) {
    return Some(label);
  }

  let generic = GENERIC_KEYWORDS
    .iter()
    .any(|kw| text.contains(kw) || href.contains(kw));
  let path = href.split(['?', '#']).next().unwrap_or_default();
  let is_document = DOCUMENT_EXTENSIONS.iter().any(|ext| path.ends_with(ext));
  if !(generic && is_document) {
    return None;
  }

  let specific = [
    ("10-k", "10-K"),
    ("10-q", "10-Q"),
    ("earnings", "Earnings Release"),
    ("slide", "Presentation"),
    ("transcript", "Transcript"),
  ];
  Some(
    specific
      .iter()
      .find(|(kw, _)| text.contains(kw))
      .map_or("Financial Document", |(_, label)| label),
  )
}

// ─── Link extraction ─────────────────────────────────────────────────────────

static ANCHOR: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r#"(?is)<a\b[^>]*?\bhref\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>]+))[^>]*>(.*?)</a\s*>"#)
    .expect("static regex")
});

static INNER_TAG: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").expect("static regex"));

/// A classified document link found on an IR page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrLink {
  pub url:   String,
  pub text:  String,
  pub label: &'static str,
}

/// Extract classified links from `html`, resolving them against `page_url`.
/// Fragment and `javascript:` links are skipped, as are listings of SEC
/// filings hosted anywhere but sec.gov. Each URL appears at most once.
pub fn extract_links(html: &str, page_url: &Url) -> Vec<IrLink> {
  let mut seen = HashSet::new();
  let mut links = Vec::new();

  for caps in ANCHOR.captures_iter(html) {
    let href = caps
      .get(1)
      .or_else(|| caps.get(2))
      .or_else(|| caps.get(3))
      .map_or("", |m| m.as_str())
      .trim();
    if href.is_empty() || href.starts_with('#') || href.to_lowercase().starts_with("javascript:") {
      continue;
    }
    let text = INNER_TAG.replace_all(&caps[4], " ");
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");

    let Some(label) = classify_link(&text, href) else { continue };
    let Ok(url) = page_url.join(href) else { continue };
    if label == SEC_FILINGS && !url.host_str().is_some_and(|h| h.ends_with("sec.gov")) {
      continue;
    }
    if seen.insert(url.to_string()) {
      links.push(IrLink { url: url.to_string(), text, label });
    }
  }
  links
}

// ─── Naming ──────────────────────────────────────────────────────────────────

/// File extension implied by a URL path, if it looks like one (`.pdf`).
fn url_extension(url: &str) -> Option<String> {
  let path = url.split(['?', '#']).next()?;
  let name = path.rsplit('/').next()?;
  let dot = name.rfind('.')?;
  let ext = name[dot..].to_ascii_lowercase();
  let valid = ext.len() > 1
    && ext.len() <= 5
    && ext[1..].chars().all(|c| c.is_ascii_alphanumeric());
  valid.then_some(ext)
}

fn extension_from_content_type(content_type: &str) -> Option<&'static str> {
  let ct = content_type.to_ascii_lowercase();
  let table = [
    ("pdf", ".pdf"),
    ("spreadsheetml", ".xlsx"),
    ("excel", ".xlsx"),
    ("presentationml", ".pptx"),
    ("powerpoint", ".pptx"),
    ("wordprocessingml", ".docx"),
    ("msword", ".docx"),
    ("text/plain", ".txt"),
    ("html", ".html"),
  ];
  table.iter().find(|(kw, _)| ct.contains(kw)).map(|(_, ext)| *ext)
}

/// Stable file name for a downloaded link: the first sixteen hex characters
/// of the URL's SHA-256, plus an extension taken from the URL or, failing
/// that, from the response content type (default `.html`).
pub fn relative_path_for(url: &str, content_type: Option<&str>) -> String {
  let digest = hex::encode(Sha256::digest(url.as_bytes()));
  let ext = url_extension(url)
    .or_else(|| content_type.and_then(extension_from_content_type).map(str::to_owned))
    .unwrap_or_else(|| ".html".to_owned());
  format!("{}{ext}", &digest[..16])
}

/// Landing-page guesses, most specific first.
pub fn candidate_ir_urls(company: &CompanyRecord) -> Vec<String> {
  let name: String = company
    .name
    .to_lowercase()
    .replace('&', "and")
    .chars()
    .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
    .collect();
  let ticker = company.ticker.to_lowercase();

  let mut urls = Vec::new();
  if !name.is_empty() {
    urls.extend([
      format!("https://ir.{name}.com"),
      format!("https://investor.{name}.com"),
      format!("https://investors.{name}.com"),
      format!("https://{name}.com/investor-relations"),
      format!("https://{name}.com/investors"),
      format!("https://www.{name}.com/investor-relations"),
      format!("https://www.{name}.com/investors"),
    ]);
  }
  urls.extend([
    format!("https://ir.{ticker}.com"),
    format!("https://investor.{ticker}.com"),
    format!("https://investors.{ticker}.com"),
    format!("https://www.{ticker}.com/investors"),
  ]);
  urls
}

fn fallback_ir_url(company: &CompanyRecord) -> String {
  format!("https://www.{}.com/investor-relations", company.ticker.to_lowercase())
}

// ─── Adapter ─────────────────────────────────────────────────────────────────

pub struct IrAdapter {
  config: IrConfig,
  http:   HttpFetcher,
}

impl IrAdapter {
  pub fn new(config: IrConfig) -> Result<Self> {
    let http = HttpFetcher::new(&config.user_agent, config.timeout, config.min_interval)?;
    Ok(Self { config, http })
  }

  /// The configured IR page, else the first guess that answers, else
  /// `https://www.<ticker>.com/investor-relations`.
  pub async fn landing_page(&self, company: &CompanyRecord) -> String {
    if let Some(url) = company.ir_url.as_deref().filter(|u| !u.trim().is_empty()) {
      return url.to_owned();
    }
    for url in candidate_ir_urls(company) {
      if self.http.probe(&url, self.config.probe_timeout).await {
        info!(ticker = %company.ticker, url = %url, "found IR page");
        return url;
      }
    }
    let url = fallback_ir_url(company);
    debug!(ticker = %company.ticker, url = %url, "no IR page answered; using fallback");
    url
  }

  async fn scan(&self, page_url: &str) -> Result<Vec<IrLink>> {
    let page = self.http.get(page_url).await?;
    let base = Url::parse(&page.final_url).map_err(|e| Error::Url {
      url:    page.final_url.clone(),
      reason: e.to_string(),
    })?;
    let html = String::from_utf8_lossy(&page.bytes);
    Ok(extract_links(&html, &base))
  }

  async fn download(&self, link: &IrLink) -> Result<Candidate, CandidateError> {
    let document_type =
      DocumentType::sanitized(link.label).map_err(|e| CandidateError::new(&link.url, e))?;
    let fetched = self
      .http
      .get(&link.url)
      .await
      .map_err(|e| CandidateError::new(&link.url, e))?;
    debug!(url = %link.url, label = link.label, size = fetched.bytes.len(), "downloaded IR document");
    Ok(Candidate {
      relative_path: relative_path_for(&link.url, fetched.content_type.as_deref()),
      document_type,
      bytes: fetched.bytes,
      origin_url: Some(link.url.clone()),
      content_type: fetched.content_type,
    })
  }
}

impl SourceAdapter for IrAdapter {
  fn source(&self) -> Source { Source::Ir }

  fn candidates<'a>(
    &'a self,
    company: &'a CompanyRecord,
    filter: &'a DocumentTypeFilter,
  ) -> BoxStream<'a, Result<Candidate, CandidateError>> {
    Box::pin(stream! {
      let page_url = self.landing_page(company).await;
      let links = match self.scan(&page_url).await {
        Ok(links) => links,
        Err(e) => {
          warn!(ticker = %company.ticker, url = %page_url, error = %e, "could not read IR page");
          yield Err(CandidateError::new(&page_url, e));
          return;
        }
      };

      let wanted: Vec<&IrLink> = links
        .iter()
        .filter(|l| {
          DocumentType::sanitized(l.label).is_ok_and(|d| filter.allows(&d))
        })
        .collect();
      debug!(
        ticker = %company.ticker,
        found = links.len(),
        wanted = wanted.len(),
        "scanned IR page"
      );

      for link in wanted {
        yield self.download(link).await;
      }
    })
  }
}

#[cfg(test)]
mod tests {
  use axum::{Router, http::header, routing::get};
  use futures::StreamExt;

  use super::*;
  use crate::test_server::serve;

  #[test]
  fn classifies_by_text_then_href() {
    assert_eq!(classify_link("2024 Annual Report", "/docs/ar.pdf"), Some("10-K"));
    assert_eq!(classify_link("Q3 Earnings Release", "/x"), Some("Earnings Release"));
    assert_eq!(classify_link("Download", "/files/q2-10-q.pdf"), Some("10-Q"));
    assert_eq!(classify_link("Download", "/files/webcastslides.pdf"), Some("Presentation"));
    assert_eq!(classify_link("SEC Filings", "/sec"), Some(SEC_FILINGS));
  }

  #[test]
  fn generic_keywords_need_a_document_extension() {
    assert_eq!(classify_link("Financials", "/financials.xlsx"), Some("Financial Document"));
    assert_eq!(classify_link("Investor overview", "/investor"), None);
    assert_eq!(classify_link("Contact us", "/contact.pdf"), None);
  }

  #[test]
  fn extracts_resolves_and_dedupes_links() {
    let html = r##"
      <a href="#top">Back to top 10-K</a>
      <a href="javascript:void(0)">10-K</a>
      <a class="doc" href="/static/annual.pdf"><span>Annual</span> Report 2024</a>
      <a href='/static/annual.pdf'>Annual report (again)</a>
      <a href="https://cdn.example.com/q3-deck.pdf">Investor Presentation</a>
      <a href="/governance/sec-filings">SEC Filings</a>
      <a href="https://www.sec.gov/cgi-bin/browse-edgar?CIK=42">EDGAR filings</a>
      <a href="/careers">Careers</a>
    "##;
    let base = Url::parse("https://ir.acme.com/home").unwrap();
    let links = extract_links(html, &base);
    let got: Vec<_> = links.iter().map(|l| (l.label, l.url.as_str())).collect();
    assert_eq!(got, vec![
      ("10-K", "https://ir.acme.com/static/annual.pdf"),
      ("Presentation", "https://cdn.example.com/q3-deck.pdf"),
      (SEC_FILINGS, "https://www.sec.gov/cgi-bin/browse-edgar?CIK=42"),
    ]);
    assert_eq!(links[0].text, "Annual Report 2024");
  }

  #[test]
  fn relative_path_is_stable_per_url() {
    let a = relative_path_for("https://ir.acme.com/q3.PDF?v=2", None);
    let b = relative_path_for("https://ir.acme.com/q3.PDF?v=2", Some("text/html"));
    assert_eq!(a, b);
    assert!(a.ends_with(".pdf"));
    assert_eq!(a.len(), 16 + 4);

    let c = relative_path_for("https://ir.acme.com/download?id=7", Some("application/pdf"));
    assert!(c.ends_with(".pdf"));
    let d = relative_path_for("https://ir.acme.com/news/release", None);
    assert!(d.ends_with(".html"));
  }

  #[test]
  fn url_guesses_cover_name_and_ticker() {
    let company = CompanyRecord::new("CVS", None, "CVS Health");
    let urls = candidate_ir_urls(&company);
    assert_eq!(urls[0], "https://ir.cvshealth.com");
    assert!(urls.contains(&"https://investors.cvs.com".to_owned()));
    assert_eq!(fallback_ir_url(&company), "https://www.cvs.com/investor-relations");
  }

  #[tokio::test]
  async fn streams_documents_from_configured_page() {
    let router = Router::new()
      .route(
        "/ir",
        get(|| async {
          (
            [(header::CONTENT_TYPE, "text/html")],
            r#"<html><body>
              <a href="/docs/annual.pdf">Annual Report 2024</a>
              <a href="/docs/deck">Investor Presentation</a>
              <a href="/docs/gone.pdf">Q1 Transcript</a>
            </body></html>"#,
          )
        }),
      )
      .route(
        "/docs/annual.pdf",
        get(|| async { ([(header::CONTENT_TYPE, "application/pdf")], "%PDF-1.7 annual") }),
      )
      .route(
        "/docs/deck",
        get(|| async { ([(header::CONTENT_TYPE, "application/pdf")], "%PDF-1.7 deck") }),
      );
    let base = serve(router).await;
    let adapter = IrAdapter::new(IrConfig {
      min_interval: Duration::from_millis(1),
      ..IrConfig::default()
    })
    .unwrap();
    let company = CompanyRecord {
      ir_url: Some(format!("{base}/ir")),
      ..CompanyRecord::new("ACME", None, "Acme Corp")
    };

    let all = DocumentTypeFilter::any();
    let items: Vec<_> = adapter.candidates(&company, &all).collect().await;
    assert_eq!(items.len(), 3);
    let annual = items[0].as_ref().unwrap();
    assert_eq!(annual.document_type.as_str(), "10-K");
    assert!(annual.relative_path.ends_with(".pdf"));
    let deck = items[1].as_ref().unwrap();
    assert_eq!(deck.document_type.as_str(), "Presentation");
    assert!(deck.relative_path.ends_with(".pdf"));
    assert!(items[2].is_err());

    let only_decks = DocumentTypeFilter::only([DocumentType::new("Presentation").unwrap()]);
    let items: Vec<_> = adapter.candidates(&company, &only_decks).collect().await;
    assert_eq!(items.len(), 1);
  }
}

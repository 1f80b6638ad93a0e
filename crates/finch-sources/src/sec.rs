//! SEC EDGAR filings adapter.
//!
//! For each company the adapter reads the EDGAR submissions index
//! (`/submissions/CIK##########.json`), picks the most recent filings of the
//! requested forms, and downloads each filing's primary document from the
//! archives. EDGAR asks clients for a descriptive `User-Agent` and at most
//! ten requests per second; both are enforced here.

use std::{collections::HashMap, time::Duration};

use async_stream::stream;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::Deserialize;
use tracing::{debug, info, warn};

use finch_core::{
  artifact::{DocumentType, Source},
  company::{CikDirectory, CompanyRecord, normalize_cik},
  source::{Candidate, CandidateError, DocumentTypeFilter, SourceAdapter},
};

use crate::{Result, http::HttpFetcher};

pub const DEFAULT_FORM_TYPES: [&str; 3] = ["10-K", "10-Q", "8-K"];

// ─── Config ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SecConfig {
  /// EDGAR rejects anonymous clients; this should name the operator.
  pub user_agent:        String,
  /// Forms collected when the caller does not restrict document types.
  pub form_types:        Vec<String>,
  /// Most recent filings taken per form.
  pub filings_per_form:  usize,
  pub min_interval:      Duration,
  pub timeout:           Duration,
  /// Host of the submissions API.
  pub data_base_url:     String,
  /// Host of the filing archives and the ticker map.
  pub archives_base_url: String,
}

impl Default for SecConfig {
  fn default() -> Self {
    Self {
      user_agent:        "finch/0.1 admin@example.com".into(),
      form_types:        DEFAULT_FORM_TYPES.iter().map(|f| f.to_string()).collect(),
      filings_per_form:  2,
      min_interval:      Duration::from_millis(100),
      timeout:           Duration::from_secs(60),
      data_base_url:     "https://data.sec.gov".into(),
      archives_base_url: "https://www.sec.gov".into(),
    }
  }
}

// ─── Wire format ─────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct Submissions {
  filings: Filings,
}

#[derive(Debug, Deserialize)]
struct Filings {
  recent: RecentFilings,
}

/// EDGAR lists recent filings as parallel arrays, newest first.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecentFilings {
  #[serde(default)]
  accession_number: Vec<String>,
  #[serde(default)]
  form:             Vec<String>,
  #[serde(default)]
  primary_document: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct TickerEntry {
  cik_str: u64,
  ticker:  String,
}

/// One filing selected for download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilingRef {
  pub accession_number: String,
  pub form:             String,
  pub primary_document: String,
}

impl FilingRef {
  pub fn accession_no_dashes(&self) -> String { self.accession_number.replace('-', "") }

  pub fn relative_path(&self) -> String {
    format!("{}/{}", self.accession_no_dashes(), self.primary_document)
  }
}

impl RecentFilings {
  /// Newest-first filings whose (sanitized) form is in `wanted`, at most
  /// `per_form` of each. Rows missing any column are ignored.
  fn select(&self, wanted: &[DocumentType], per_form: usize) -> Vec<FilingRef> {
    let mut taken: HashMap<&str, usize> = HashMap::new();
    let mut out = Vec::new();
    let rows = self
      .accession_number
      .iter()
      .zip(&self.form)
      .zip(&self.primary_document);
    for ((accession, form), primary) in rows {
      if primary.is_empty() {
        continue;
      }
      let Ok(doc_type) = DocumentType::sanitized(form) else { continue };
      if !wanted.contains(&doc_type) {
        continue;
      }
      let count = taken.entry(form.as_str()).or_default();
      if *count >= per_form {
        continue;
      }
      *count += 1;
      out.push(FilingRef {
        accession_number: accession.clone(),
        form:             form.clone(),
        primary_document: primary.clone(),
      });
    }
    out
  }
}

// ─── Adapter ─────────────────────────────────────────────────────────────────

pub struct SecAdapter {
  config: SecConfig,
  http:   HttpFetcher,
}

impl SecAdapter {
  pub fn new(config: SecConfig) -> Result<Self> {
    let http = HttpFetcher::new(&config.user_agent, config.timeout, config.min_interval)?;
    Ok(Self { config, http })
  }

  pub fn config(&self) -> &SecConfig { &self.config }

  pub fn submissions_url(&self, cik: &str) -> String {
    format!(
      "{}/submissions/CIK{}.json",
      self.config.data_base_url.trim_end_matches('/'),
      normalize_cik(cik)
    )
  }

  /// Archive URL of a filing's primary document. The archive path uses the
  /// CIK without leading zeros and the accession number without dashes.
  pub fn document_url(&self, cik: &str, filing: &FilingRef) -> String {
    format!(
      "{}/Archives/edgar/data/{}/{}/{}",
      self.config.archives_base_url.trim_end_matches('/'),
      cik.trim().trim_start_matches('0'),
      filing.accession_no_dashes(),
      filing.primary_document
    )
  }

  /// Fetch EDGAR's ticker → CIK map, with CIKs zero-padded to ten digits and
  /// tickers upper-cased.
  pub async fn fetch_cik_mapping(&self) -> Result<HashMap<String, String>> {
    let url = format!(
      "{}/files/company_tickers.json",
      self.config.archives_base_url.trim_end_matches('/')
    );
    let entries: HashMap<String, TickerEntry> = self.http.get_json(&url).await?;
    let mapping: HashMap<String, String> = entries
      .into_values()
      .map(|e| (e.ticker.to_ascii_uppercase(), format!("{:010}", e.cik_str)))
      .collect();
    info!(entries = mapping.len(), "fetched SEC ticker map");
    Ok(mapping)
  }

  fn wanted_forms(&self, filter: &DocumentTypeFilter) -> Vec<DocumentType> {
    if filter.is_unrestricted() {
      self
        .config
        .form_types
        .iter()
        .filter_map(|f| DocumentType::sanitized(f).ok())
        .collect()
    } else {
      filter.types().cloned().collect()
    }
  }

  async fn list_filings(&self, cik: &str, filter: &DocumentTypeFilter) -> Result<Vec<FilingRef>> {
    let submissions: Submissions = self.http.get_json(&self.submissions_url(cik)).await?;
    Ok(
      submissions
        .filings
        .recent
        .select(&self.wanted_forms(filter), self.config.filings_per_form),
    )
  }

  async fn download(&self, cik: &str, filing: &FilingRef) -> Result<Candidate, CandidateError> {
    let url = self.document_url(cik, filing);
    let document_type =
      DocumentType::sanitized(&filing.form).map_err(|e| CandidateError::new(&url, e))?;
    let fetched = self
      .http
      .get(&url)
      .await
      .map_err(|e| CandidateError::new(&url, e))?;
    debug!(url = %url, form = %filing.form, size = fetched.bytes.len(), "downloaded filing");
    Ok(Candidate {
      relative_path: filing.relative_path(),
      document_type,
      bytes: fetched.bytes,
      origin_url: Some(url),
      content_type: fetched.content_type,
    })
  }
}

#[async_trait]
impl CikDirectory for SecAdapter {
  async fn cik_mapping(
    &self,
  ) -> std::result::Result<HashMap<String, String>, Box<dyn std::error::Error + Send + Sync>> {
    Ok(self.fetch_cik_mapping().await?)
  }
}

impl SourceAdapter for SecAdapter {
  fn source(&self) -> Source { Source::Sec }

  fn candidates<'a>(
    &'a self,
    company: &'a CompanyRecord,
    filter: &'a DocumentTypeFilter,
  ) -> BoxStream<'a, Result<Candidate, CandidateError>> {
    Box::pin(stream! {
      let Some(cik) = company.cik.as_deref() else {
        yield Err(CandidateError::new(&company.ticker, "no CIK known for company"));
        return;
      };

      let filings = match self.list_filings(cik, filter).await {
        Ok(filings) => filings,
        Err(e) => {
          warn!(ticker = %company.ticker, error = %e, "could not list SEC filings");
          yield Err(CandidateError::new(self.submissions_url(cik), e));
          return;
        }
      };
      debug!(ticker = %company.ticker, filings = filings.len(), "selected SEC filings");

      for filing in &filings {
        yield self.download(cik, filing).await;
      }
    })
  }
}

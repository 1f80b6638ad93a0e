//! The company roster.
//!
//! The roster is maintained outside the ingestion core. The core reads it to
//! resolve tickers and rejects requests for tickers it does not contain.
//! Refreshes (a new list, updated CIKs) replace entries wholesale under a
//! write lock, so readers always see a consistent list.

use std::{
  collections::HashMap,
  sync::{PoisonError, RwLock},
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{Error, Result, artifact::normalize_ticker};

/// One tracked company.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyRecord {
  pub ticker: String,
  /// SEC Central Index Key, zero-padded to ten digits.
  #[serde(default)]
  pub cik:    Option<String>,
  pub name:   String,
  /// Position in the source ranking (e.g. Fortune 100), if known.
  #[serde(default)]
  pub rank:   Option<u32>,
  /// Known investor-relations landing page; skips URL discovery when set.
  #[serde(default)]
  pub ir_url: Option<String>,
}

impl CompanyRecord {
  pub fn new(ticker: &str, cik: Option<&str>, name: &str) -> Self {
    Self {
      ticker: ticker.trim().to_ascii_uppercase(),
      cik:    cik.map(normalize_cik),
      name:   name.to_owned(),
      rank:   None,
      ir_url: None,
    }
  }
}

/// Zero-pad a CIK to the ten digits EDGAR expects (`320193` → `0000320193`).
pub fn normalize_cik(cik: &str) -> String {
  let digits = cik.trim();
  format!("{digits:0>10}")
}

// ─── Roster ──────────────────────────────────────────────────────────────────

/// Read-mostly, refreshable list of tracked companies.
#[derive(Debug, Default)]
pub struct Roster {
  companies: RwLock<Vec<CompanyRecord>>,
}

impl Roster {
  /// Build a roster, normalising tickers and CIKs. A later entry with the same
  /// ticker replaces an earlier one.
  pub fn new(companies: Vec<CompanyRecord>) -> Result<Self> {
    Ok(Self { companies: RwLock::new(normalize_all(companies)?) })
  }

  /// The five-company sample roster used when no list is configured.
  pub fn sample() -> Self {
    let rows = [
      (1, "WMT", "0000104169", "Walmart"),
      (2, "AMZN", "0001018724", "Amazon"),
      (3, "AAPL", "0000320193", "Apple"),
      (4, "CVS", "0000064803", "CVS Health"),
      (5, "UNH", "0000731766", "UnitedHealth Group"),
    ];
    let companies = rows
      .into_iter()
      .map(|(rank, ticker, cik, name)| CompanyRecord {
        rank: Some(rank),
        ..CompanyRecord::new(ticker, Some(cik), name)
      })
      .collect();
    Self { companies: RwLock::new(companies) }
  }

  /// Look up a company by ticker, case-insensitively.
  pub fn get(&self, ticker: &str) -> Result<CompanyRecord> {
    let wanted = ticker.trim().to_ascii_uppercase();
    self
      .read()
      .iter()
      .find(|c| c.ticker == wanted)
      .cloned()
      .ok_or_else(|| Error::UnknownCompany(ticker.to_owned()))
  }

  pub fn contains(&self, ticker: &str) -> bool { self.get(ticker).is_ok() }

  /// A copy of every company, in roster order.
  pub fn all(&self) -> Vec<CompanyRecord> { self.read().clone() }

  pub fn len(&self) -> usize { self.read().len() }

  pub fn is_empty(&self) -> bool { self.read().is_empty() }

  /// Replace the whole roster.
  pub fn replace(&self, companies: Vec<CompanyRecord>) -> Result<()> {
    let normalized = normalize_all(companies)?;
    *self.companies.write().unwrap_or_else(PoisonError::into_inner) = normalized;
    Ok(())
  }

  /// Apply a ticker → CIK mapping (as published by EDGAR). Returns the number
  /// of companies whose CIK changed. Tickers absent from the mapping keep
  /// their current CIK.
  pub fn apply_cik_mapping(&self, mapping: &HashMap<String, String>) -> usize {
    let mut companies = self.companies.write().unwrap_or_else(PoisonError::into_inner);
    let mut updated = 0;
    for company in companies.iter_mut() {
      let Some(cik) = mapping.get(&company.ticker) else { continue };
      let cik = normalize_cik(cik);
      if company.cik.as_deref() != Some(cik.as_str()) {
        company.cik = Some(cik);
        updated += 1;
      }
    }
    updated
  }

  fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<CompanyRecord>> {
    self.companies.read().unwrap_or_else(PoisonError::into_inner)
  }
}

// ─── CIK directory ───────────────────────────────────────────────────────────

/// Publishes the ticker → CIK mapping used to fill in missing CIKs.
#[async_trait]
pub trait CikDirectory: Send + Sync {
  /// Fetch the full mapping. Keys are upper-case tickers.
  async fn cik_mapping(
    &self,
  ) -> std::result::Result<HashMap<String, String>, Box<dyn std::error::Error + Send + Sync>>;
}

/// Fetch the mapping from `directory` and apply it to `roster`. Returns the
/// number of companies whose CIK changed.
pub async fn refresh_ciks(
  roster: &Roster,
  directory: &dyn CikDirectory,
) -> std::result::Result<usize, Box<dyn std::error::Error + Send + Sync>> {
  let mapping = directory.cik_mapping().await?;
  Ok(roster.apply_cik_mapping(&mapping))
}

fn normalize_all(companies: Vec<CompanyRecord>) -> Result<Vec<CompanyRecord>> {
  let mut out: Vec<CompanyRecord> = Vec::with_capacity(companies.len());
  for mut company in companies {
    company.ticker = normalize_ticker(&company.ticker)?;
    company.cik = company.cik.as_deref().map(str::trim).filter(|c| !c.is_empty()).map(normalize_cik);
    match out.iter_mut().find(|c| c.ticker == company.ticker) {
      Some(existing) => *existing = company,
      None => out.push(company),
    }
  }
  Ok(out)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn lookup_is_case_insensitive() {
    let roster = Roster::sample();
    assert_eq!(roster.get("aapl").unwrap().name, "Apple");
    assert_eq!(roster.len(), 5);
  }

  #[test]
  fn unknown_ticker_is_rejected() {
    let roster = Roster::sample();
    let err = roster.get("DOESNOTEXIST").unwrap_err();
    assert!(matches!(err, Error::UnknownCompany(_)));
  }

  #[test]
  fn new_normalises_and_dedupes() {
    let roster = Roster::new(vec![
      CompanyRecord::new("acme", Some("42"), "Acme Old"),
      CompanyRecord::new("ACME", Some("42"), "Acme Corp"),
    ])
    .unwrap();
    assert_eq!(roster.len(), 1);
    let acme = roster.get("ACME").unwrap();
    assert_eq!(acme.name, "Acme Corp");
    assert_eq!(acme.cik.as_deref(), Some("0000000042"));
  }

  #[test]
  fn cik_mapping_counts_only_changes() {
    let roster = Roster::sample();
    let mut mapping = HashMap::new();
    mapping.insert("AAPL".to_owned(), "320193".to_owned()); // unchanged once padded
    mapping.insert("WMT".to_owned(), "999".to_owned());
    assert_eq!(roster.apply_cik_mapping(&mapping), 1);
    assert_eq!(roster.get("WMT").unwrap().cik.as_deref(), Some("0000000999"));
  }

  #[test]
  fn replace_swaps_the_list() {
    let roster = Roster::sample();
    roster
      .replace(vec![CompanyRecord::new("ACME", None, "Acme")])
      .unwrap();
    assert_eq!(roster.len(), 1);
    assert!(!roster.contains("AAPL"));
  }
}

//! Runtime configuration, deserialised from `config.toml` layered with
//! `FINCH__`-prefixed environment variables
//! (e.g. `FINCH__OPENAI__API_KEY`, `FINCH__SCHEDULE__DAILY_TIME`).

use std::{
  path::{Path, PathBuf},
  time::Duration,
};

use anyhow::Context as _;
use finch_core::company::{CompanyRecord, Roster};
use finch_ingest::{DailySchedule, SchedulerConfig};
use finch_sources::{IrConfig, OpenAiConfig, SecConfig};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
  pub host:      String,
  pub port:      u16,
  /// Holds `index.json` and the `raw/` artifact tree.
  pub data_dir:  PathBuf,
  pub schedule:  ScheduleSettings,
  pub sec:       SecSettings,
  pub ir:        IrSettings,
  pub openai:    OpenAiSettings,
  /// Tracked companies. Empty means the built-in five-company sample.
  pub companies: Vec<CompanyRecord>,
}

impl Default for Settings {
  fn default() -> Self {
    Self {
      host:      "0.0.0.0".into(),
      port:      5000,
      data_dir:  PathBuf::from("data"),
      schedule:  ScheduleSettings::default(),
      sec:       SecSettings::default(),
      ir:        IrSettings::default(),
      openai:    OpenAiSettings::default(),
      companies: Vec::new(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScheduleSettings {
  /// `HH:MM`, UTC.
  pub daily_time:        String,
  pub run_on_startup:    bool,
  /// Zero disables the periodic refresh.
  pub cik_refresh_hours: u64,
}

impl Default for ScheduleSettings {
  fn default() -> Self {
    Self { daily_time: "02:00".into(), run_on_startup: false, cik_refresh_hours: 168 }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SecSettings {
  pub user_agent:       String,
  pub form_types:       Vec<String>,
  pub filings_per_form: usize,
  pub min_interval_ms:  u64,
}

impl Default for SecSettings {
  fn default() -> Self {
    let sec = SecConfig::default();
    Self {
      user_agent:       sec.user_agent,
      form_types:       sec.form_types,
      filings_per_form: sec.filings_per_form,
      min_interval_ms:  100,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IrSettings {
  pub enabled:         bool,
  pub min_interval_ms: u64,
  pub timeout_secs:    u64,
}

impl Default for IrSettings {
  fn default() -> Self { Self { enabled: true, min_interval_ms: 500, timeout_secs: 60 } }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OpenAiSettings {
  pub api_key:  Option<String>,
  pub model:    String,
  pub base_url: String,
}

impl Default for OpenAiSettings {
  fn default() -> Self {
    let openai = OpenAiConfig::default();
    Self { api_key: None, model: openai.model, base_url: openai.base_url }
  }
}

impl Settings {
  /// Read `path` (optional) and the environment.
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(
        config::Environment::with_prefix("FINCH")
          .prefix_separator("__")
          .separator("__")
          .list_separator(",")
          .with_list_parse_key("sec.form_types")
          .try_parsing(true),
      )
      .build()
      .context("failed to read configuration")?
      .try_deserialize()
      .context("failed to deserialise Settings")
  }

  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }

  pub fn raw_dir(&self) -> PathBuf { self.data_dir.join("raw") }

  pub fn roster(&self) -> anyhow::Result<Roster> {
    if self.companies.is_empty() {
      return Ok(Roster::sample());
    }
    Roster::new(self.companies.clone()).context("invalid company list")
  }

  pub fn scheduler(&self) -> SchedulerConfig {
    SchedulerConfig {
      daily:          DailySchedule::parse_or_default(&self.schedule.daily_time),
      run_on_startup: self.schedule.run_on_startup,
    }
  }

  pub fn cik_refresh_interval(&self) -> Option<Duration> {
    (self.schedule.cik_refresh_hours > 0)
      .then(|| Duration::from_secs(self.schedule.cik_refresh_hours * 3600))
  }

  pub fn sec_config(&self) -> SecConfig {
    SecConfig {
      user_agent: self.sec.user_agent.clone(),
      form_types: self.sec.form_types.clone(),
      filings_per_form: self.sec.filings_per_form,
      min_interval: Duration::from_millis(self.sec.min_interval_ms),
      ..SecConfig::default()
    }
  }

  pub fn ir_config(&self) -> IrConfig {
    IrConfig {
      min_interval: Duration::from_millis(self.ir.min_interval_ms),
      timeout: Duration::from_secs(self.ir.timeout_secs),
      ..IrConfig::default()
    }
  }

  pub fn openai_config(&self) -> OpenAiConfig {
    OpenAiConfig {
      api_key: self.openai.api_key.clone(),
      model: self.openai.model.clone(),
      base_url: self.openai.base_url.clone(),
      ..OpenAiConfig::default()
    }
  }
}

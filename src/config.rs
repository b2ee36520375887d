use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use url::Url;

use crate::net::resolve;

const DEFAULT_ORIGIN: &str = "http://localhost:3000";

const DEFAULT_PRECACHE: &[&str] = &[
  "/",
  "/static/js/bundle.js",
  "/static/css/main.css",
  "/manifest.json",
  "/offline.html",
  "https://fonts.googleapis.com/css2?family=Noto+Sans+Devanagari:wght@400;500;600;700&display=swap",
];

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
  /// Origin the app is served from; relative URLs resolve against it
  pub origin: String,
  pub cache: CacheConfig,
  /// URLs fetched verbatim at install, in order
  pub precache: Vec<String>,
  /// Page served to navigations when both cache and network miss
  pub offline_page: String,
  pub offline: OfflineConfig,
  pub network: NetworkConfig,
  pub logging: LoggingConfig,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      origin: DEFAULT_ORIGIN.to_string(),
      cache: CacheConfig::default(),
      precache: DEFAULT_PRECACHE.iter().map(|s| s.to_string()).collect(),
      offline_page: "/offline.html".to_string(),
      offline: OfflineConfig::default(),
      network: NetworkConfig::default(),
      logging: LoggingConfig::default(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  pub prefix: String,
  /// Bumping this retires every namespace of the previous version at activation
  pub version: String,
  /// SQLite file (default: $XDG_DATA_HOME/medaid-sw/cache.db)
  pub database: Option<PathBuf>,
  /// Request headers that take part in the cache key (case-insensitive)
  #[serde(deserialize_with = "deserialize_lowercase_vec")]
  pub vary_headers: Vec<String>,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      prefix: "medaid".to_string(),
      version: "v1".to_string(),
      database: None,
      vary_headers: Vec::new(),
    }
  }
}

fn deserialize_lowercase_vec<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
  D: serde::Deserializer<'de>,
{
  let v: Vec<String> = Vec::deserialize(deserializer)?;
  Ok(v.into_iter().map(|s| s.to_lowercase()).collect())
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OfflineConfig {
  /// Number quoted in the generic offline reply
  pub emergency_number: String,
  /// Also match a symptom when the query contains the first word of its canned reply
  pub reply_lead_matching: bool,
}

impl Default for OfflineConfig {
  fn default() -> Self {
    Self {
      emergency_number: "108".to_string(),
      reply_lead_matching: true,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
  pub timeout_secs: u64,
}

impl Default for NetworkConfig {
  fn default() -> Self {
    Self { timeout_secs: 10 }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
  /// Filter used when RUST_LOG is unset
  pub level: String,
  /// Daily-rolling log file; stderr only when unset
  pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
  fn default() -> Self {
    Self {
      level: "info".to_string(),
      file: None,
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./medaid-sw.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/medaid-sw/config.yaml
  ///
  /// Falls back to built-in defaults when no file exists. `MEDAID_SW_ORIGIN`
  /// overrides the origin either way.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    let mut config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Config::default(),
    };

    if let Ok(origin) = std::env::var("MEDAID_SW_ORIGIN") {
      config.origin = origin;
    }

    config.validate()?;
    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("medaid-sw.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("medaid-sw").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config: Config = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    Ok(config)
  }

  fn validate(&self) -> Result<()> {
    let origin = self.origin_url()?;
    for asset in &self.precache {
      resolve(&origin, asset)?;
    }
    resolve(&origin, &self.offline_page)?;
    if self.cache.prefix.is_empty() || self.cache.version.is_empty() {
      return Err(eyre!("cache.prefix and cache.version must not be empty"));
    }
    Ok(())
  }

  pub fn origin_url(&self) -> Result<Url> {
    Url::parse(&self.origin).map_err(|e| eyre!("Invalid origin '{}': {}", self.origin, e))
  }

  /// Precache manifest resolved against the origin.
  pub fn precache_urls(&self) -> Result<Vec<Url>> {
    let origin = self.origin_url()?;
    self.precache.iter().map(|raw| resolve(&origin, raw)).collect()
  }

  pub fn offline_page_url(&self) -> Result<Url> {
    resolve(&self.origin_url()?, &self.offline_page)
  }

  /// Path of the cache database.
  pub fn database_path(&self) -> Result<PathBuf> {
    if let Some(path) = &self.cache.database {
      return Ok(path.clone());
    }

    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("medaid-sw").join("cache.db"))
  }
}

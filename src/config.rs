//! # Configuration
//!
//! Profiles live in a JSON5 file (comments allowed) looked up at
//! `./s3dock.json5`, `~/.s3dock/config.json5`, then `/etc/s3dock/config.json5`.
//! A missing file falls back to built-in defaults; an explicitly named file
//! that cannot be read is an error.
//!
//! Resolution order for each connection field: command-line override, then
//! environment variable, then the selected profile, then the built-in
//! default.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_BUCKET, DEFAULT_REGION, PULL_MAX_ATTEMPTS};
use crate::error::{Error, Result};

/// Parsed configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Profile used when none is named on the command line.
    #[serde(default)]
    pub default_profile: String,
    /// Named connection profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
    /// Tool-wide defaults.
    #[serde(default)]
    pub defaults: Defaults,
}

/// One connection profile.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub bucket: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub access_key: String,
    #[serde(default)]
    pub secret_key: String,
}

/// Tool-wide defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Defaults {
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            retry_count: default_retry_count(),
            log_level: default_log_level(),
        }
    }
}

fn default_retry_count() -> u32 {
    PULL_MAX_ATTEMPTS
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Fully resolved connection settings handed to adapters.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub bucket: String,
    pub region: String,
    pub endpoint: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub retry_count: u32,
    pub log_level: String,
}

impl Config {
    /// Loads configuration from `path`, or from the search locations when
    /// `path` is `None`. Absence of any config file yields defaults.
    pub fn load(path: Option<&Path>) -> Result<Config> {
        let actual = match path {
            Some(explicit) => explicit.to_path_buf(),
            None => match find_config_file() {
                Some(found) => found,
                None => return Ok(Config::default_config()),
            },
        };

        let raw = std::fs::read_to_string(&actual).map_err(|e| {
            Error::Config(format!("failed to read config file {}: {e}", actual.display()))
        })?;

        json5::from_str(&raw).map_err(|e| {
            Error::Config(format!("failed to parse config file {}: {e}", actual.display()))
        })
    }

    /// Built-in defaults used when no file exists.
    pub fn default_config() -> Config {
        let mut profiles = HashMap::new();
        profiles.insert(
            "default".to_string(),
            Profile {
                bucket: DEFAULT_BUCKET.to_string(),
                region: DEFAULT_REGION.to_string(),
                ..Profile::default()
            },
        );
        Config {
            default_profile: "default".to_string(),
            profiles,
            defaults: Defaults::default(),
        }
    }

    /// Profile names, sorted for stable output.
    pub fn profile_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.profiles.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Loads and resolves configuration into concrete connection settings.
pub fn resolve(
    config_path: Option<&Path>,
    profile_name: Option<&str>,
    bucket_override: Option<&str>,
) -> Result<ResolvedConfig> {
    let config = Config::load(config_path)?;

    let profile_name = profile_name
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .or_else(|| {
            (!config.default_profile.is_empty()).then(|| config.default_profile.clone())
        })
        .unwrap_or_else(|| "default".to_string());

    let profile = config
        .profiles
        .get(&profile_name)
        .cloned()
        .ok_or_else(|| Error::Config(format!("profile '{profile_name}' not found in config")))?;

    Ok(ResolvedConfig {
        bucket: first_of(&[
            bucket_override.map(str::to_string),
            env_var("S3DOCK_BUCKET"),
            non_empty(profile.bucket),
        ])
        .unwrap_or_else(|| DEFAULT_BUCKET.to_string()),
        region: first_of(&[env_var("AWS_REGION"), non_empty(profile.region)])
            .unwrap_or_else(|| DEFAULT_REGION.to_string()),
        endpoint: first_of(&[env_var("AWS_ENDPOINT_URL"), non_empty(profile.endpoint)]),
        access_key: first_of(&[env_var("AWS_ACCESS_KEY_ID"), non_empty(profile.access_key)]),
        secret_key: first_of(&[
            env_var("AWS_SECRET_ACCESS_KEY"),
            non_empty(profile.secret_key),
        ]),
        retry_count: config.defaults.retry_count,
        log_level: config.defaults.log_level,
    })
}

/// Default config file content written by `config init`.
pub const INIT_TEMPLATE: &str = r#"{
  // s3dock configuration file
  "default_profile": "default",

  "profiles": {
    "default": {
      "bucket": "s3dock-containers",
      "region": "us-east-1"
      // Add endpoint, access_key, secret_key as needed
    }
  },

  "defaults": {
    "retry_count": 3,
    "log_level": "info"
  }
}
"#;

fn find_config_file() -> Option<PathBuf> {
    let mut candidates = vec![PathBuf::from("./s3dock.json5")];
    if let Some(home) = dirs::home_dir() {
        candidates.push(home.join(".s3dock").join("config.json5"));
    }
    candidates.push(PathBuf::from("/etc/s3dock/config.json5"));

    candidates.into_iter().find(|path| path.exists())
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.is_empty())
}

fn non_empty(value: String) -> Option<String> {
    (!value.is_empty()).then_some(value)
}

fn first_of(candidates: &[Option<String>]) -> Option<String> {
    candidates.iter().flatten().next().cloned()
}

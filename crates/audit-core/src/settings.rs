use clap::{CommandFactory, Parser};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{AuditError, Result};
use crate::pricing::DiscountPolicy;

// ── OutputFormat ───────────────────────────────────────────────────────────────

/// File format of the relations written into a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Csv,
    Json,
}

impl FromStr for OutputFormat {
    type Err = AuditError;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_lowercase().as_str() {
            "csv" => Ok(OutputFormat::Csv),
            "json" => Ok(OutputFormat::Json),
            other => Err(AuditError::Config(format!("unknown output format: {other}"))),
        }
    }
}

impl OutputFormat {
    /// File extension used for relations in this format.
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Csv => "csv",
            OutputFormat::Json => "json",
        }
    }
}

// ── Settings (CLI) ─────────────────────────────────────────────────────────────

/// Audit cloud usage bills against a contractual price list
#[derive(Parser, Debug, Clone)]
#[command(
    name = "billing-audit",
    about = "Audit cloud usage bills against a contractual price list",
    version
)]
pub struct Settings {
    /// Staging directory holding usage/, prices/ and unit_factors/ partitions
    #[arg(long, env = "BILLING_AUDIT_STAGING_DIR")]
    pub staging_dir: Option<PathBuf>,

    /// Explicit usage CSV (overrides staging discovery)
    #[arg(long)]
    pub usage_file: Option<PathBuf>,

    /// Explicit price list JSON (overrides staging discovery)
    #[arg(long)]
    pub prices_file: Option<PathBuf>,

    /// Explicit unit factor CSV (overrides staging discovery)
    #[arg(long)]
    pub unit_factors_file: Option<PathBuf>,

    /// Directory receiving one sub-directory per run snapshot
    #[arg(long, default_value = "audit-output")]
    pub output_dir: PathBuf,

    /// Snapshot identifier (defaults to a UTC timestamp)
    #[arg(long)]
    pub run_id: Option<String>,

    /// Output relation format
    #[arg(long, default_value = "csv", value_parser = ["csv", "json"])]
    pub format: String,

    /// Also write the intermediate joined_cost relation
    #[arg(long)]
    pub materialize_joined: bool,

    /// Config file path (defaults to ~/.billing-audit/config.json)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Logging level
    #[arg(long, default_value = "INFO", value_parser = ["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL"])]
    pub log_level: String,

    /// Log file path
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,

    /// Clear saved configuration
    #[arg(long)]
    pub clear: bool,

    /// Discount schedule, loaded from the config file.
    #[arg(skip)]
    pub policy: DiscountPolicy,
}

// ── AuditConfig ────────────────────────────────────────────────────────────────

/// Persisted configuration saved to `~/.billing-audit/config.json`.
#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq)]
pub struct AuditConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub staging_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub materialize_joined: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy: Option<DiscountPolicy>,
}

impl AuditConfig {
    /// Return the default path to the persisted config file.
    pub fn config_path() -> PathBuf {
        Self::config_path_in(&dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
    }

    /// Return the config path rooted at `base_dir` (used for testing).
    pub fn config_path_in(base_dir: &Path) -> PathBuf {
        base_dir.join(".billing-audit").join("config.json")
    }

    /// Load the config from an explicit path.
    ///
    /// An absent file yields the default config. A file that exists but does
    /// not parse is an error, since it may carry a discount schedule.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(AuditError::FileRead {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Atomically write the config to an explicit path.
    pub fn save_to(&self, path: &Path) -> std::result::Result<(), std::io::Error> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;

        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, &json)?;
        std::fs::rename(&tmp, path)?;

        Ok(())
    }

    /// Delete the config file at an explicit path if it exists.
    pub fn clear_at(path: &Path) -> std::result::Result<(), std::io::Error> {
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }
}

// ── Settings impl ──────────────────────────────────────────────────────────────

impl Settings {
    /// Parse CLI arguments, merge with the config file where no explicit CLI
    /// value was provided, validate, and persist the result.
    pub fn load_with_config() -> Result<Self> {
        Self::load_with_config_impl(std::env::args_os().collect(), None)
    }

    /// Full implementation. `default_config_path` replaces the home-directory
    /// location so that tests can redirect to a temporary directory.
    pub fn load_with_config_impl(
        args: Vec<std::ffi::OsString>,
        default_config_path: Option<&Path>,
    ) -> Result<Self> {
        let matches = Settings::command()
            .try_get_matches_from(args.clone())
            .map_err(|e| AuditError::Config(e.to_string()))?;
        let mut settings =
            Settings::try_parse_from(args).map_err(|e| AuditError::Config(e.to_string()))?;

        let config_path = match (&settings.config, default_config_path) {
            (Some(explicit), _) => explicit.clone(),
            (None, Some(default)) => default.to_path_buf(),
            (None, None) => AuditConfig::config_path(),
        };

        if settings.clear {
            AuditConfig::clear_at(&config_path)?;
            return Ok(Self::resolve(settings));
        }

        let saved = AuditConfig::load_from(&config_path)?;

        // CLI always wins over the persisted file.
        if !is_arg_explicitly_set(&matches, "staging_dir") {
            if let Some(v) = saved.staging_dir {
                settings.staging_dir = Some(v);
            }
        }
        if !is_arg_explicitly_set(&matches, "output_dir") {
            if let Some(v) = saved.output_dir {
                settings.output_dir = v;
            }
        }
        if !is_arg_explicitly_set(&matches, "format") {
            if let Some(v) = saved.format {
                OutputFormat::from_str(&v)?;
                settings.format = v;
            }
        }
        if !is_arg_explicitly_set(&matches, "materialize_joined") {
            if let Some(v) = saved.materialize_joined {
                settings.materialize_joined = v;
            }
        }
        if let Some(policy) = saved.policy {
            settings.policy = policy;
        }
        settings.policy.validate()?;

        let settings = Self::resolve(settings);

        if let Err(e) = AuditConfig::from(&settings).save_to(&config_path) {
            tracing::warn!(path = %config_path.display(), error = %e, "could not persist config");
        }

        Ok(settings)
    }

    /// Parsed output format.
    pub fn output_format(&self) -> OutputFormat {
        // `format` is restricted by the clap value parser and by the config
        // merge above, so only the two known values reach this point.
        OutputFormat::from_str(&self.format).unwrap_or(OutputFormat::Csv)
    }

    /// Apply the `--debug` flag.
    fn resolve(mut settings: Settings) -> Settings {
        if settings.debug {
            settings.log_level = "DEBUG".to_string();
        }
        settings
    }
}

// ── Conversion ─────────────────────────────────────────────────────────────────

impl From<&Settings> for AuditConfig {
    fn from(s: &Settings) -> Self {
        AuditConfig {
            staging_dir: s.staging_dir.clone(),
            output_dir: Some(s.output_dir.clone()),
            format: Some(s.format.clone()),
            materialize_joined: Some(s.materialize_joined),
            policy: Some(s.policy.clone()),
        }
    }
}

// ── Helper: check if an arg was explicitly set on the command line ─────────────

/// Returns `true` when `name` was supplied explicitly on the command line or
/// through its environment variable.
fn is_arg_explicitly_set(matches: &clap::ArgMatches, name: &str) -> bool {
    matches!(
        matches.value_source(name),
        Some(clap::parser::ValueSource::CommandLine) | Some(clap::parser::ValueSource::EnvVariable)
    )
}

// ── Tests ──────────────────────────────────────────────────────────────────────

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// File name looked up in the project root before the user-wide config.
pub const PROJECT_CONFIG_FILE: &str = "rimutate.toml";

/// Largest accepted `execution.timeout_factor`.
pub const MAX_TIMEOUT_FACTOR: f64 = 1000.0;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings
    #[serde(default)]
    pub general: GeneralConfig,

    /// Worker pool and deadlines
    #[serde(default)]
    pub execution: ExecutionConfig,

    /// How the test suite is invoked
    #[serde(default)]
    pub runner: RunnerConfig,

    /// Operator id -> enabled flag or detailed settings
    #[serde(default)]
    pub operators: BTreeMap<String, OperatorSetting>,

    /// Extra named constants operators may resolve
    #[serde(default)]
    pub constants: BTreeMap<String, i64>,

    /// Regions excluded from mutation
    #[serde(default)]
    pub ignore: Vec<IgnoreEntry>,

    /// In-source comment markers switching mutation off and on
    #[serde(default)]
    pub markers: MarkerConfig,

    /// Minimum scores for a passing run
    #[serde(default)]
    pub thresholds: ThresholdConfig,
}

/// Startup errors. Any of these aborts the run before mutation work begins.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unknown mutation operator `{0}`")]
    UnknownOperator(String),

    #[error("operator `{operator}` has no rule `{rule}`")]
    UnknownRule { operator: String, rule: String },

    #[error("operator `{operator}`: rule `{rule}` refers to undefined constant `{name}`")]
    UnknownConstant {
        operator: String,
        rule: String,
        name: String,
    },

    #[error("ignore entry for `{glob}` refers to unknown operator `{operator}`")]
    UnknownIgnoredOperator { glob: String, operator: String },

    #[error("invalid value for `{field}`: {reason}")]
    InvalidValue { field: String, reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Number of mutants tested concurrently
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Multiplier applied to the baseline time of the selected tests
    #[serde(default = "default_timeout_factor")]
    pub timeout_factor: f64,

    /// Fixed allowance added to every deadline
    #[serde(default = "default_timeout_margin_ms")]
    pub timeout_margin_ms: u64,

    /// Upper bound for the unmutated baseline run
    #[serde(default = "default_baseline_timeout")]
    pub baseline_timeout_seconds: u64,

    /// Additional attempts when the test process cannot be started
    #[serde(default = "default_spawn_retries")]
    pub spawn_retries: u32,

    /// Skip mutants whose source is identical to an earlier one
    #[serde(default = "default_enabled")]
    pub deduplicate: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Program to execute in the working copy
    #[serde(default = "default_program")]
    pub program: String,

    /// Arguments. `{tests}` expands to one argument per selected test and
    /// `{filter}` to the tests joined by `|`; with neither, tests are appended.
    #[serde(default = "default_args")]
    pub args: Vec<String>,

    /// Extra environment for the test process
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Output fragments that mean the mutant did not build
    #[serde(default = "default_compile_error_markers")]
    pub compile_error_markers: Vec<String>,

    /// Captured output kept per mutant
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,
}

/// An operator is either switched on/off or configured in detail:
///
/// ```toml
/// [operators]
/// logical_flip = false
///
/// [operators.call_rename]
/// rules = { mb_strlen = false }
/// renames = { widen_length = { target = "length", max_args = 1 } }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OperatorSetting {
    Enabled(bool),
    Detailed(OperatorOptions),
}

impl OperatorSetting {
    pub fn enabled(&self) -> bool {
        match self {
            OperatorSetting::Enabled(enabled) => *enabled,
            OperatorSetting::Detailed(options) => options.enabled,
        }
    }

    pub fn options(&self) -> Option<&OperatorOptions> {
        match self {
            OperatorSetting::Enabled(_) => None,
            OperatorSetting::Detailed(options) => Some(options),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatorOptions {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Built-in sub-rule name -> enabled
    #[serde(default)]
    pub rules: BTreeMap<String, bool>,

    /// Additional `call_rename` rules keyed by source function
    #[serde(default)]
    pub renames: BTreeMap<String, RenameSetting>,

    /// Additional `mode_rewrite` rules keyed by source function
    #[serde(default)]
    pub modes: BTreeMap<String, ModeSetting>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenameSetting {
    pub target: String,
    #[serde(default)]
    pub max_args: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModeSetting {
    #[serde(default = "default_mode_arg")]
    pub mode_arg: usize,

    #[serde(default = "default_keep_args")]
    pub keep_args: usize,

    /// Mode (integer literal or constant name) -> target function
    pub modes: BTreeMap<String, String>,
}

/// Excludes matching mutations from execution; they are reported as ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IgnoreEntry {
    /// Glob over project-relative paths
    pub glob: String,

    #[serde(default)]
    pub start_line: Option<u32>,

    #[serde(default)]
    pub end_line: Option<u32>,

    /// Restrict to these operators; empty means all
    #[serde(default)]
    pub operators: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkerConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default = "default_marker_off")]
    pub off: String,

    #[serde(default = "default_marker_on")]
    pub on: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThresholdConfig {
    /// Minimum mutation score indicator, in percent
    #[serde(default)]
    pub min_msi: Option<f64>,

    /// Minimum covered mutation score indicator, in percent
    #[serde(default)]
    pub min_covered_msi: Option<f64>,
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_enabled() -> bool {
    true
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn default_timeout_factor() -> f64 {
    2.0
}

fn default_timeout_margin_ms() -> u64 {
    5000
}

fn default_baseline_timeout() -> u64 {
    300
}

fn default_spawn_retries() -> u32 {
    1
}

fn default_program() -> String {
    "cargo".to_string()
}

fn default_args() -> Vec<String> {
    vec![
        "test".to_string(),
        "--".to_string(),
        "--exact".to_string(),
        "{tests}".to_string(),
    ]
}

fn default_compile_error_markers() -> Vec<String> {
    ["error[E", "could not compile", "Parse error", "SyntaxError"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_max_output_bytes() -> usize {
    10_000
}

fn default_mode_arg() -> usize {
    1
}

fn default_keep_args() -> usize {
    1
}

fn default_marker_off() -> String {
    "rimutate:off".to_string()
}

fn default_marker_on() -> String {
    "rimutate:on".to_string()
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            timeout_factor: default_timeout_factor(),
            timeout_margin_ms: default_timeout_margin_ms(),
            baseline_timeout_seconds: default_baseline_timeout(),
            spawn_retries: default_spawn_retries(),
            deduplicate: true,
        }
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: default_args(),
            env: BTreeMap::new(),
            compile_error_markers: default_compile_error_markers(),
            max_output_bytes: default_max_output_bytes(),
        }
    }
}

impl Default for MarkerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            off: default_marker_off(),
            on: default_marker_on(),
        }
    }
}

impl Config {
    /// Load configuration from file, or create default if not found
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = path.map(PathBuf::from).or_else(Self::default_config_path);

        let config: Config = if let Some(ref path) = config_path {
            if path.exists() {
                let contents = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config from {:?}", path))?;
                toml::from_str(&contents)
                    .with_context(|| format!("Failed to parse config from {:?}", path))?
            } else {
                Config::default()
            }
        } else {
            Config::default()
        };

        config.validate()?;
        Ok(config)
    }

    /// Load the explicitly given file, else `rimutate.toml` in the project
    /// root, else the user-wide default.
    pub fn discover(explicit: Option<&Path>, project_root: &Path) -> Result<Self> {
        if explicit.is_some() {
            return Self::load(explicit);
        }
        let local = project_root.join(PROJECT_CONFIG_FILE);
        if local.exists() {
            Self::load(Some(&local))
        } else {
            Self::load(None)
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: Option<&Path>) -> Result<()> {
        let config_path = path
            .map(PathBuf::from)
            .or_else(Self::default_config_path)
            .context("No config path available")?;

        // Ensure parent directory exists
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(&config_path, contents)
            .with_context(|| format!("Failed to write config to {:?}", config_path))?;

        Ok(())
    }

    /// Write the default configuration to `rimutate.toml` in the project
    /// root. An existing file is left alone.
    pub fn init(project_root: &Path) -> Result<PathBuf> {
        let path = project_root.join(PROJECT_CONFIG_FILE);
        if path.exists() {
            anyhow::bail!("{:?} already exists", path);
        }
        Self::default().save(Some(&path))?;
        Ok(path)
    }

    /// Get the default configuration file path
    pub fn default_config_path() -> Option<PathBuf> {
        ProjectDirs::from("com", "rimutate", "rimutate")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Range checks that do not depend on the operator set. Operator ids are
    /// checked when the registry is built.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field: &str, reason: &str| ConfigError::InvalidValue {
            field: field.to_string(),
            reason: reason.to_string(),
        };

        if self.execution.workers == 0 {
            return Err(invalid("execution.workers", "must be at least 1"));
        }
        if !(self.execution.timeout_factor > 0.0
            && self.execution.timeout_factor <= MAX_TIMEOUT_FACTOR)
        {
            return Err(invalid(
                "execution.timeout_factor",
                &format!("must be greater than 0 and at most {}", MAX_TIMEOUT_FACTOR),
            ));
        }
        if self.runner.program.trim().is_empty() {
            return Err(invalid("runner.program", "must not be empty"));
        }
        for (field, value) in [
            ("thresholds.min_msi", self.thresholds.min_msi),
            ("thresholds.min_covered_msi", self.thresholds.min_covered_msi),
        ] {
            if let Some(value) = value {
                if !(0.0..=100.0).contains(&value) {
                    return Err(invalid(field, "must be a percentage between 0 and 100"));
                }
            }
        }
        for entry in &self.ignore {
            if let (Some(start), Some(end)) = (entry.start_line, entry.end_line) {
                if start > end {
                    return Err(invalid(
                        "ignore.start_line",
                        &format!("{} is after end_line {} for `{}`", start, end, entry.glob),
                    ));
                }
            }
        }
        if self.markers.enabled && (self.markers.off.is_empty() || self.markers.on.is_empty()) {
            return Err(invalid("markers", "off and on markers must not be empty"));
        }
        Ok(())
    }
}

//! Application settings for fieldlens.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (FIELDLENS_HOME, FIELDLENS_DETECTOR, FIELDLENS_MODEL)
//! 2. Config file (.fieldlens/config.yaml)
//! 3. Defaults (~/.fieldlens, synthetic detector)
//!
//! Config file discovery:
//! - Searches current directory and parents for .fieldlens/config.yaml
//! - `paths.home` in the config file is relative to the .fieldlens/ directory

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

pub const DEFAULT_MODEL: &str = "yolov8n.pt";
pub const DEFAULT_TRACKER_COMMAND: &str = "fieldlens-tracker";
const DEFAULT_DETECTOR_TIMEOUT_SECS: u64 = 600;

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub detector: Option<DetectorConfig>,
    #[serde(default)]
    pub pipeline: Option<PipelineConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// Data directory for jobs and artifacts (relative to .fieldlens/)
    pub home: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DetectorConfig {
    pub provider: Option<DetectorKind>,
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    pub model: Option<String>,
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Multiplier on the simulated per-stage delays; 0 disables them
    pub stage_delay_scale: Option<f64>,
}

/// Which detection backend runs first
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectorKind {
    #[default]
    Synthetic,
    External,
}

impl FromStr for DetectorKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "synthetic" => Ok(Self::Synthetic),
            "external" => Ok(Self::External),
            other => anyhow::bail!(
                "Unknown detector provider '{}' (expected synthetic or external)",
                other
            ),
        }
    }
}

impl DetectorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Synthetic => "synthetic",
            Self::External => "external",
        }
    }
}

/// Resolved detector settings
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorSettings {
    pub provider: DetectorKind,
    /// External tracker executable
    pub command: String,
    /// Extra arguments placed before the generated ones
    pub args: Vec<String>,
    pub model: String,
    pub timeout: Duration,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            provider: DetectorKind::Synthetic,
            command: DEFAULT_TRACKER_COMMAND.to_string(),
            args: Vec::new(),
            model: DEFAULT_MODEL.to_string(),
            timeout: Duration::from_secs(DEFAULT_DETECTOR_TIMEOUT_SECS),
        }
    }
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Root of persisted jobs and artifacts
    pub home: PathBuf,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    pub detector: DetectorSettings,
    pub stage_delay_scale: f64,
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(".fieldlens").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to the config file's directory
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

/// Merge defaults, an optional config file and environment lookups
fn resolve(
    default_home: PathBuf,
    file: Option<(PathBuf, ConfigFile)>,
    env: impl Fn(&str) -> Option<String>,
) -> Result<ResolvedConfig> {
    let (config_file, parsed) = match file {
        Some((path, parsed)) => (Some(path), parsed),
        None => (None, ConfigFile::default()),
    };

    let home = if let Some(env_home) = env("FIELDLENS_HOME") {
        PathBuf::from(env_home)
    } else if let (Some(path), Some(home_path)) = (&config_file, &parsed.paths.home) {
        let fieldlens_dir = path.parent().unwrap_or(Path::new("."));
        resolve_path(fieldlens_dir, home_path)
    } else {
        default_home
    };

    let mut detector = DetectorSettings::default();
    if let Some(file_detector) = parsed.detector {
        if let Some(provider) = file_detector.provider {
            detector.provider = provider;
        }
        if let Some(command) = file_detector.command {
            detector.command = command;
        }
        detector.args = file_detector.args;
        if let Some(model) = file_detector.model {
            detector.model = model;
        }
        if let Some(secs) = file_detector.timeout_seconds {
            detector.timeout = Duration::from_secs(secs);
        }
    }
    if let Some(provider) = env("FIELDLENS_DETECTOR") {
        detector.provider = provider
            .parse()
            .context("Invalid FIELDLENS_DETECTOR value")?;
    }
    if let Some(model) = env("FIELDLENS_MODEL") {
        detector.model = model;
    }

    let stage_delay_scale = parsed
        .pipeline
        .and_then(|p| p.stage_delay_scale)
        .unwrap_or(1.0);
    if !stage_delay_scale.is_finite() || stage_delay_scale < 0.0 {
        anyhow::bail!(
            "pipeline.stage_delay_scale must be a non-negative number (got {})",
            stage_delay_scale
        );
    }

    Ok(ResolvedConfig {
        home,
        config_file,
        detector,
        stage_delay_scale,
    })
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(".fieldlens");

    let file = match find_config_file() {
        Some(path) => {
            let parsed = load_config_file(&path)?;
            Some((path, parsed))
        }
        None => None,
    };

    resolve(default_home, file, |key| std::env::var(key).ok())
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| format!("{:#}", e)));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}

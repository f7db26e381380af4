use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings
    #[serde(default)]
    pub general: GeneralConfig,

    /// External compiler and test runner
    #[serde(default)]
    pub toolchain: ToolchainConfig,

    /// Worker pool and workspace handling
    #[serde(default)]
    pub execution: ExecutionConfig,

    /// Mutation score policy
    #[serde(default)]
    pub scoring: ScoringConfig,

    /// Data directory (where projects are stored)
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// How sources are compiled and tests are executed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolchainConfig {
    /// Compiler executable
    #[serde(default = "default_compiler")]
    pub compiler: String,

    /// Runtime executable used to launch the test runner
    #[serde(default = "default_runtime")]
    pub runtime: String,

    /// Entry point class of the test runner
    #[serde(default = "default_runner_class")]
    pub runner_class: String,

    /// Directory holding the `*.jar` dependencies (and the runner class)
    #[serde(default = "default_lib_dir")]
    pub lib_dir: PathBuf,

    /// File stem suffix identifying test classes
    #[serde(default = "default_test_suffix")]
    pub test_suffix: String,

    /// Extension of source files, without the dot
    #[serde(default = "default_source_extension")]
    pub source_extension: String,

    /// Name of the document the runner writes into its working directory
    #[serde(default = "default_result_file_name")]
    pub result_file_name: String,

    #[serde(default = "default_timeout")]
    pub compile_timeout_seconds: u64,

    #[serde(default = "default_timeout")]
    pub test_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Number of concurrent mutant runs (0 = one per CPU core)
    #[serde(default)]
    pub workers: usize,

    /// Keep mutant workspaces on disk after their result is stored
    #[serde(default)]
    pub keep_workspaces: bool,

    /// Maximum bytes of compiler/runner output kept in a result document
    #[serde(default = "default_max_error_bytes")]
    pub max_error_bytes: usize,
}

impl ExecutionConfig {
    /// Worker count with `0` resolved to the number of available cores.
    pub fn effective_workers(&self) -> usize {
        if self.workers > 0 {
            return self.workers;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Count trivial mutants as killed in the mutation score
    #[serde(default)]
    pub trivial_counts_as_killed: bool,
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_compiler() -> String {
    "javac".to_string()
}

fn default_runtime() -> String {
    "java".to_string()
}

fn default_runner_class() -> String {
    "TestRunner".to_string()
}

fn default_lib_dir() -> PathBuf {
    PathBuf::from("lib")
}

fn default_test_suffix() -> String {
    "Test".to_string()
}

fn default_source_extension() -> String {
    "java".to_string()
}

fn default_result_file_name() -> String {
    "test_results.json".to_string()
}

fn default_timeout() -> u64 {
    300 // 5 minutes
}

fn default_max_error_bytes() -> usize {
    10_000
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            compiler: default_compiler(),
            runtime: default_runtime(),
            runner_class: default_runner_class(),
            lib_dir: default_lib_dir(),
            test_suffix: default_test_suffix(),
            source_extension: default_source_extension(),
            result_file_name: default_result_file_name(),
            compile_timeout_seconds: default_timeout(),
            test_timeout_seconds: default_timeout(),
        }
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            workers: 0,
            keep_workspaces: false,
            max_error_bytes: default_max_error_bytes(),
        }
    }
}

impl Config {
    /// Load configuration from `path` (or the default location).
    ///
    /// A missing file yields the built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(config_path) = path.map(PathBuf::from).or_else(Self::default_config_path) else {
            return Ok(Config::default());
        };
        if !config_path.exists() {
            tracing::debug!("No config file at {}, using defaults", config_path.display());
            return Ok(Config::default());
        }

        let contents = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config from {}", config_path.display()))?;
        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config from {}", config_path.display()))
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

    /// Get the default configuration file path
    pub fn default_config_path() -> Option<PathBuf> {
        ProjectDirs::from("com", "mutarium", "mutarium")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Get the data directory path
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| {
            ProjectDirs::from("com", "mutarium", "mutarium")
                .map(|dirs| dirs.data_dir().to_path_buf())
                .unwrap_or_else(|| PathBuf::from(".mutarium"))
        })
    }

    /// Directory holding one subdirectory per project
    pub fn projects_dir(&self) -> PathBuf {
        self.data_dir().join("projects")
    }
}

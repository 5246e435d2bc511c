/*!
 * Configuration support for the claims pipeline
 *
 * Provides runtime options for loading, ranking, and writing. The
 * configuration is an explicit value handed to the loader, the engine and
 * the writer; nothing here is process-global.
 */

use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};

use crate::constants::*;

/// Environment variable prefix, e.g. `RXCLAIMS_OUTPUT_DIR`
pub const ENV_PREFIX: &str = "RXCLAIMS";

/// Configuration for a pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    /// Directory the three JSON artifacts are written to
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    #[serde(default = "default_metrics_file")]
    pub metrics_file: String,

    #[serde(default = "default_top_chains_file")]
    pub top_chains_file: String,

    #[serde(default = "default_common_quantity_file")]
    pub common_quantity_file: String,

    /// Chains kept per drug in the chain ranking
    #[serde(default = "default_top_chains_limit")]
    pub top_chains_limit: usize,

    /// Quantities kept per drug in the quantity ranking
    #[serde(default = "default_top_quantities_limit")]
    pub top_quantities_limit: usize,

    /// Decimal places for emitted prices
    #[serde(default = "default_price_precision")]
    pub price_precision: u32,

    /// Number of threads for parallel operations (None = use all available)
    #[serde(default)]
    pub parallel_threads: Option<usize>,

    /// Whether to show progress bars while loading files
    #[serde(default = "default_enable_progress_bar")]
    pub enable_progress_bar: bool,

    /// Validation level for input records
    #[serde(default)]
    pub validation_level: ValidationLevel,

    /// Whether to skip invalid records instead of failing the load
    #[serde(default = "default_skip_invalid_records")]
    pub skip_invalid_records: bool,

    /// Indentation width of written JSON; 0 writes compact JSON
    #[serde(default = "default_json_indent")]
    pub json_indent: usize,
}

/// Validation level for input records
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ValidationLevel {
    /// Typed deserialization only
    None,
    /// Required keys must be present
    Basic,
    /// Required keys plus numeric, finite, non-negative price (recommended)
    #[default]
    Standard,
    /// Standard plus a parseable timestamp
    Strict,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            metrics_file: default_metrics_file(),
            top_chains_file: default_top_chains_file(),
            common_quantity_file: default_common_quantity_file(),
            top_chains_limit: default_top_chains_limit(),
            top_quantities_limit: default_top_quantities_limit(),
            price_precision: default_price_precision(),
            parallel_threads: None,
            enable_progress_bar: default_enable_progress_bar(),
            validation_level: ValidationLevel::Standard,
            skip_invalid_records: default_skip_invalid_records(),
            json_indent: default_json_indent(),
        }
    }
}

// Default value functions for serde
fn default_output_dir() -> PathBuf {
    PathBuf::from(DEFAULT_OUTPUT_DIR)
}

fn default_metrics_file() -> String {
    METRICS_BY_DIMENSION_FILE.to_string()
}

fn default_top_chains_file() -> String {
    TOP_CHAINS_FILE.to_string()
}

fn default_common_quantity_file() -> String {
    COMMON_QUANTITY_FILE.to_string()
}

fn default_top_chains_limit() -> usize {
    DEFAULT_TOP_CHAINS
}

fn default_top_quantities_limit() -> usize {
    DEFAULT_TOP_QUANTITIES
}

fn default_price_precision() -> u32 {
    DEFAULT_PRICE_PRECISION
}

fn default_enable_progress_bar() -> bool {
    true
}

fn default_skip_invalid_records() -> bool {
    true
}

fn default_json_indent() -> usize {
    4
}

impl AnalyticsConfig {
    /// Create a new configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from `RXCLAIMS_*` environment variables over the defaults
    ///
    /// Supported environment variables include:
    /// - `RXCLAIMS_OUTPUT_DIR`: directory path
    /// - `RXCLAIMS_TOP_CHAINS_LIMIT` / `RXCLAIMS_TOP_QUANTITIES_LIMIT`: number
    /// - `RXCLAIMS_PRICE_PRECISION`: number of decimal places
    /// - `RXCLAIMS_PARALLEL_THREADS`: number
    /// - `RXCLAIMS_VALIDATION_LEVEL`: "none", "basic", "standard", or "strict"
    /// - `RXCLAIMS_SKIP_INVALID_RECORDS`: "true" or "false"
    pub fn from_env() -> crate::Result<Self> {
        Self::layered(None, false)
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let config: Self = toml::from_str(&contents)
            .map_err(|e| crate::ClaimsError::Configuration {
                message: format!("Failed to parse config file: {}", e),
                suggestion: Some("Check that the file is valid TOML format".to_string()),
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Check that settings are within their accepted ranges
    pub fn validate(&self) -> crate::Result<()> {
        if self.price_precision > MAX_PRICE_PRECISION {
            return Err(crate::ClaimsError::Configuration {
                message: format!(
                    "price_precision {} is out of range (0..={})",
                    self.price_precision, MAX_PRICE_PRECISION
                ),
                suggestion: Some(format!("Set price_precision to at most {}", MAX_PRICE_PRECISION)),
            });
        }
        Ok(())
    }

    /// Save configuration to a TOML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> crate::Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| crate::ClaimsError::Configuration {
                message: format!("Failed to serialize config: {}", e),
                suggestion: None,
            })?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Get the default configuration file path
    ///
    /// Returns `~/.config/rxclaims/config.toml` on Linux
    /// or `%APPDATA%\rxclaims\config.toml` on Windows
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "rxclaims")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load configuration from defaults, a config file, and the environment
    ///
    /// Priority order, highest first:
    /// 1. Environment variables
    /// 2. `file` if given, otherwise the default config file (if it exists)
    /// 3. Built-in defaults
    pub fn load(file: Option<&Path>) -> crate::Result<Self> {
        Self::layered(file, true)
    }

    fn layered(file: Option<&Path>, use_default_file: bool) -> crate::Result<Self> {
        use ::config::{Config, Environment, File, FileFormat};

        let mut builder = Config::builder();

        if let Some(path) = file {
            if !path.exists() {
                return Err(crate::ClaimsError::file_not_found_with_suggestion(path.to_path_buf()));
            }
            builder = builder.add_source(File::from(path).format(FileFormat::Toml));
        } else if use_default_file {
            if let Some(path) = Self::default_config_path() {
                builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(false));
            }
        }

        builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true));

        let config = builder.build()
            .and_then(|settings| settings.try_deserialize::<Self>())
            .map_err(|e| crate::ClaimsError::Configuration {
                message: format!("Failed to load configuration: {}", e),
                suggestion: Some(format!(
                    "Check the config file and any {}_* environment variables",
                    ENV_PREFIX
                )),
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Create a configuration optimized for throughput on trusted input
    pub fn performance() -> Self {
        Self {
            enable_progress_bar: false,
            parallel_threads: None, // Use all available
            validation_level: ValidationLevel::Basic,
            skip_invalid_records: true,
            json_indent: 0,
            ..Self::default()
        }
    }

    /// Create a configuration that rejects any malformed input
    pub fn strict() -> Self {
        Self {
            parallel_threads: Some(1),
            validation_level: ValidationLevel::Strict,
            skip_invalid_records: false,
            ..Self::default()
        }
    }

    /// Path of the metrics-by-dimension artifact
    pub fn metrics_path(&self) -> PathBuf {
        self.output_dir.join(&self.metrics_file)
    }

    /// Path of the top-chains-per-drug artifact
    pub fn top_chains_path(&self) -> PathBuf {
        self.output_dir.join(&self.top_chains_file)
    }

    /// Path of the most-common-quantity-per-drug artifact
    pub fn common_quantity_path(&self) -> PathBuf {
        self.output_dir.join(&self.common_quantity_file)
    }
}

/// Builder for customizing configuration
#[derive(Default)]
pub struct ConfigBuilder {
    config: AnalyticsConfig,
}

impl ConfigBuilder {
    /// Start building a new configuration
    pub fn new() -> Self {
        Self {
            config: AnalyticsConfig::default(),
        }
    }

    /// Start from an existing configuration
    pub fn from_config(config: AnalyticsConfig) -> Self {
        Self { config }
    }

    /// Set the output directory
    pub fn output_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.config.output_dir = dir.as_ref().to_path_buf();
        self
    }

    /// Set number of chains kept per drug
    pub fn top_chains_limit(mut self, limit: usize) -> Self {
        self.config.top_chains_limit = limit;
        self
    }

    /// Set number of quantities kept per drug
    pub fn top_quantities_limit(mut self, limit: usize) -> Self {
        self.config.top_quantities_limit = limit;
        self
    }

    pub fn price_precision(mut self, precision: u32) -> Self {
        self.config.price_precision = precision;
        self
    }

    /// Set progress bar enabled
    pub fn progress_bar(mut self, enabled: bool) -> Self {
        self.config.enable_progress_bar = enabled;
        self
    }

    /// Set number of parallel threads
    pub fn parallel_threads(mut self, threads: Option<usize>) -> Self {
        self.config.parallel_threads = threads;
        self
    }

    /// Set validation level
    pub fn validation_level(mut self, level: ValidationLevel) -> Self {
        self.config.validation_level = level;
        self
    }

    /// Set skip invalid records
    pub fn skip_invalid_records(mut self, skip: bool) -> Self {
        self.config.skip_invalid_records = skip;
        self
    }

    pub fn json_indent(mut self, indent: usize) -> Self {
        self.config.json_indent = indent;
        self
    }

    /// Build the configuration
    pub fn build(self) -> AnalyticsConfig {
        self.config
    }
}

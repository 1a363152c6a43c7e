//! Application configuration for stixgraph.
//!
//! User config lives at `~/.stixgraph/stixgraph.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, StixGraphError};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "stixgraph.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".stixgraph";

/// Default input/output file names inside the data directory.
pub const EXTRACTED_FILE: &str = "extracted_stix.json";
pub const CLEANED_FILE: &str = "articles_cleaned.json";
pub const INCLUDED_FILE: &str = "input_included.json";
pub const BUNDLE_FILE: &str = "stix_bundle.json";
pub const MANIFEST_FILE: &str = "bundle_manifest.json";
pub const ENRICHED_BUNDLE_FILE: &str = "stix_bundle_enriched.json";

// ---------------------------------------------------------------------------
// Config structs (matching stixgraph.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Where pipeline documents live.
    #[serde(default)]
    pub paths: PathsConfig,

    /// The pipeline's own Creator identity.
    #[serde(default)]
    pub creator: CreatorConfig,

    /// Bundle build behaviour.
    #[serde(default)]
    pub build: BuildConfig,
}

/// `[paths]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory holding the stage documents (relative paths resolve against the cwd).
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

fn default_data_dir() -> String {
    "data".into()
}

/// `[creator]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatorConfig {
    /// Name of the Creator identity written as the first bundle object.
    #[serde(default = "default_creator_name")]
    pub name: String,
}

impl Default for CreatorConfig {
    fn default() -> Self {
        Self {
            name: default_creator_name(),
        }
    }
}

fn default_creator_name() -> String {
    "Geopolitical Collector".into()
}

/// `[build]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Embed cleaned article text on Reports as `x_opencti_content`.
    #[serde(default = "default_true")]
    pub embed_clean_text: bool,

    /// Process at most this many articles (0 = all).
    #[serde(default)]
    pub limit: usize,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            embed_clean_text: true,
            limit: 0,
        }
    }
}

fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Data paths (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Resolved locations of every stage document.
#[derive(Debug, Clone)]
pub struct DataPaths {
    pub extracted: PathBuf,
    pub cleaned: PathBuf,
    pub included: PathBuf,
    pub bundle: PathBuf,
    pub manifest: PathBuf,
    pub enriched_bundle: PathBuf,
}

impl DataPaths {
    /// Default file layout under `data_dir`.
    pub fn under(data_dir: &Path) -> Self {
        Self {
            extracted: data_dir.join(EXTRACTED_FILE),
            cleaned: data_dir.join(CLEANED_FILE),
            included: data_dir.join(INCLUDED_FILE),
            bundle: data_dir.join(BUNDLE_FILE),
            manifest: data_dir.join(MANIFEST_FILE),
            enriched_bundle: data_dir.join(ENRICHED_BUNDLE_FILE),
        }
    }
}

impl From<&AppConfig> for DataPaths {
    fn from(config: &AppConfig) -> Self {
        Self::under(Path::new(&config.paths.data_dir))
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.stixgraph/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| StixGraphError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.stixgraph/stixgraph.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| StixGraphError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        StixGraphError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| StixGraphError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| StixGraphError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| StixGraphError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

use crate::data::RecordFormat;
use crate::types::Gender;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub input: InputConfig,
    #[serde(default)]
    pub dashboard: DashboardConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InputConfig {
    pub men: RecordSourceConfig,
    pub women: RecordSourceConfig,
    pub country_reference: ReferenceConfig,
    pub boundaries: Option<BoundaryConfig>,
    #[serde(default)]
    pub missing_reference: MissingReference,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RecordSourceConfig {
    pub path: PathBuf,
    #[serde(default)]
    pub format: RecordFormat,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReferenceConfig {
    pub path: PathBuf,
    #[serde(default = "default_code_column")]
    pub code_column: String,
    #[serde(default = "default_name_column")]
    pub name_column: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BoundaryConfig {
    pub path: PathBuf,
    #[serde(default = "default_code_property")]
    pub code_property: String,
    #[serde(default = "default_name_property")]
    pub name_property: String,
}

/// What to do when the country reference cannot be loaded.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MissingReference {
    /// Carry on with every country name set to "Unknown".
    #[default]
    Degrade,
    /// Refuse to start.
    Abort,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DashboardConfig {
    #[serde(default = "default_limit")]
    pub default_rank_limit: usize,
    #[serde(default = "default_limit")]
    pub default_venue_limit: usize,
    #[serde(default = "default_countries")]
    pub default_countries: Vec<String>,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            default_rank_limit: default_limit(),
            default_venue_limit: default_limit(),
            default_countries: default_countries(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    #[serde(default = "default_map_dir")]
    pub map_dir: PathBuf,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            map_dir: default_map_dir(),
            width: default_width(),
            height: default_height(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    pub static_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            static_dir: None,
        }
    }
}

fn default_code_column() -> String {
    "Code".to_string()
}

fn default_name_column() -> String {
    "National Olympic Committee".to_string()
}

fn default_code_property() -> String {
    "ISO_A3".to_string()
}

fn default_name_property() -> String {
    "ADMIN".to_string()
}

fn default_limit() -> usize {
    10
}

fn default_countries() -> Vec<String> {
    vec!["Jamaica".to_string(), "United States".to_string()]
}

fn default_map_dir() -> PathBuf {
    PathBuf::from("output/maps")
}

fn default_width() -> u32 {
    1440
}

fn default_height() -> u32 {
    720
}

fn default_port() -> u16 {
    3000
}

impl AppConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let mut config = Self::from_toml(&content)?;
        if let Some(base) = path.parent() {
            config.rebase(base);
        }
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: AppConfig =
            toml::from_str(content).with_context(|| "Failed to parse TOML configuration")?;
        Ok(config)
    }

    pub fn source(&self, gender: Gender) -> &RecordSourceConfig {
        match gender {
            Gender::Men => &self.input.men,
            Gender::Women => &self.input.women,
        }
    }

    /// Resolves relative paths against the directory holding the config file.
    fn rebase(&mut self, base: &Path) {
        let join = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        join(&mut self.input.men.path);
        join(&mut self.input.women.path);
        join(&mut self.input.country_reference.path);
        if let Some(boundaries) = self.input.boundaries.as_mut() {
            join(&mut boundaries.path);
        }
        join(&mut self.output.map_dir);
        if let Some(dir) = self.server.static_dir.as_mut() {
            join(dir);
        }
    }
}

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::columns::canonicalize_column_name;

pub const CONFIG_ENV_VAR: &str = "AQUAVIARIO_CONFIG";
pub const DEFAULT_YEAR_COLUMN: &str = "ano";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("separator {0:?} must be a single printable ASCII character or a tab, other than a quote")]
    Separator(char),
    #[error("year range {start}..={end} is inverted")]
    YearRange { start: u16, end: u16 },
    #[error("at least one topic must be configured")]
    NoTopics,
    #[error("topic {0:?} is blank or configured more than once")]
    DuplicateTopic(String),
    #[error("at least one file extension must be configured")]
    NoExtensions,
    #[error("year column '{0}' must be a non-empty canonical column name")]
    YearColumn(String),
}

/// Inclusive range of export years processed by a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearRange {
    pub start: u16,
    pub end: u16,
}

impl YearRange {
    pub fn new(start: u16, end: u16) -> Self {
        Self { start, end }
    }

    pub fn iter(&self) -> impl Iterator<Item = u16> {
        self.start..=self.end
    }
}

impl Default for YearRange {
    fn default() -> Self {
        Self::new(2020, 2024)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub discovery_root: PathBuf,
    pub store_root: PathBuf,
    pub separator: char,
    pub extensions: Vec<String>,
    pub years: YearRange,
    pub topics: Vec<String>,
    pub year_column: String,
    pub null_sensitive_tables: Vec<String>,
    pub duplicate_prone_tables: Vec<String>,
    pub null_sentinel: String,
    pub skip_duplicate_files: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            discovery_root: PathBuf::from("data"),
            store_root: PathBuf::from("warehouse"),
            separator: ';',
            extensions: vec!["txt".to_string()],
            years: YearRange::default(),
            topics: [
                "Atracacao",
                "Carga_Conteinerizada",
                "Carga_Hidrovia",
                "Carga_Regiao",
                "Carga_Rio",
                "TaxaOcupacao",
                "TaxaOcupacaoComCarga",
                "TaxaOcupacaoTOAtracacao",
                "TemposAtracacao",
                "TemposAtracacaoParalisacao",
                "Carga",
            ]
            .iter()
            .map(|topic| topic.to_string())
            .collect(),
            year_column: DEFAULT_YEAR_COLUMN.to_string(),
            null_sensitive_tables: vec!["atracacao".to_string(), "carga".to_string()],
            duplicate_prone_tables: vec!["carga_conteinerizada".to_string()],
            null_sentinel: "Desconhecido".to_string(),
            skip_duplicate_files: true,
        }
    }
}

impl PipelineConfig {
    /// Reads a TOML config file and validates it.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: PipelineConfig = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Picks the config for a CLI invocation: an explicit path, then the
    /// path in [`CONFIG_ENV_VAR`], then the defaults.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        match std::env::var_os(CONFIG_ENV_VAR) {
            Some(path) if !path.is_empty() => Self::load(Path::new(&path)),
            _ => {
                let config = Self::default();
                config.validate()?;
                Ok(config)
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let sep = self.separator;
        if !sep.is_ascii() || sep == '"' || (sep.is_ascii_control() && sep != '\t') {
            return Err(ConfigError::Separator(sep));
        }
        if self.years.start > self.years.end {
            return Err(ConfigError::YearRange {
                start: self.years.start,
                end: self.years.end,
            });
        }
        if self.topics.is_empty() {
            return Err(ConfigError::NoTopics);
        }
        let mut seen = HashSet::new();
        for topic in &self.topics {
            if topic.trim().is_empty() || !seen.insert(topic.to_lowercase()) {
                return Err(ConfigError::DuplicateTopic(topic.clone()));
            }
        }
        if self.extensions.iter().all(|ext| ext.trim_start_matches('.').is_empty()) {
            return Err(ConfigError::NoExtensions);
        }
        if self.year_column.is_empty()
            || canonicalize_column_name(&self.year_column) != self.year_column
        {
            return Err(ConfigError::YearColumn(self.year_column.clone()));
        }
        Ok(())
    }

    /// Separator as the byte the CSV reader expects. Only valid after
    /// [`PipelineConfig::validate`].
    pub fn separator_byte(&self) -> u8 {
        self.separator as u8
    }
}

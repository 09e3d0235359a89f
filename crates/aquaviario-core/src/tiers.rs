use std::collections::HashMap;
use std::fmt;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use polars::io::parquet::write::{ParquetCompression, ParquetWriter, StatisticsOptions};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::error::{PipelineError, Result};

const TABLE_EXTENSION: &str = "parquet";

/// Storage stage of a table, in promotion order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Raw,
    Cleaned,
    Curated,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::Raw, Tier::Cleaned, Tier::Curated];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Raw => "raw",
            Tier::Cleaned => "cleaned",
            Tier::Curated => "curated",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "raw" | "bronze" => Ok(Tier::Raw),
            "cleaned" | "silver" | "prata" => Ok(Tier::Cleaned),
            "curated" | "gold" | "ouro" => Ok(Tier::Curated),
            other => Err(format!("unknown tier '{other}'")),
        }
    }
}

/// `(tier, table)` address inside a [`TierStore`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TableAddress {
    pub tier: Tier,
    pub name: String,
}

impl TableAddress {
    pub fn new(tier: Tier, name: impl Into<String>) -> Self {
        Self {
            tier,
            name: name.into(),
        }
    }

    fn validate(&self) -> Result<()> {
        let name = self.name.as_str();
        if name.is_empty()
            || name == "."
            || name == ".."
            || name.contains(['/', '\\'])
            || name.chars().any(char::is_control)
        {
            return Err(PipelineError::InvalidTableName(name.to_string()));
        }
        Ok(())
    }
}

impl fmt::Display for TableAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.tier, self.name)
    }
}

/// Column names and row count of a stored table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableDescription {
    pub address: TableAddress,
    pub columns: Vec<(String, String)>,
    pub rows: usize,
}

/// Tabular store addressed by `(tier, table)`.
///
/// Tables are serialized as Parquet. Writes overwrite whatever was stored
/// under the address, whatever its previous schema; there is no locking, so
/// concurrent writers to one address must be serialized by the caller.
#[derive(Debug, Clone, Default)]
pub struct TierStore {
    inner: TierStoreKind,
}

#[derive(Debug, Clone)]
enum TierStoreKind {
    Memory(Arc<Mutex<HashMap<TableAddress, Vec<u8>>>>),
    Filesystem { root: PathBuf },
}

impl Default for TierStoreKind {
    fn default() -> Self {
        TierStoreKind::Memory(Arc::default())
    }
}

impl TierStore {
    pub fn memory() -> Self {
        TierStore {
            inner: TierStoreKind::Memory(Arc::default()),
        }
    }

    /// Store rooted at `root`, one directory per tier and one
    /// `<table>.parquet` file per table.
    pub fn filesystem(root: impl Into<PathBuf>) -> Self {
        TierStore {
            inner: TierStoreKind::Filesystem { root: root.into() },
        }
    }

    pub fn write(&self, address: &TableAddress, df: &DataFrame) -> Result<()> {
        address.validate()?;
        let bytes = create_parquet_bytes(df).map_err(|err| PipelineError::Write {
            address: address.clone(),
            source: Box::new(err),
        })?;
        self.put_bytes(address, bytes)
            .map_err(|err| PipelineError::Write {
                address: address.clone(),
                source: Box::new(err),
            })?;
        debug!(table = %address, rows = df.height(), "table written");
        Ok(())
    }

    pub fn read(&self, address: &TableAddress) -> Result<DataFrame> {
        let bytes = self.get_bytes(address)?;
        Ok(ParquetReader::new(Cursor::new(bytes)).finish()?)
    }

    /// Table names in `tier`, sorted.
    pub fn list(&self, tier: Tier) -> Result<Vec<String>> {
        let mut names = match &self.inner {
            TierStoreKind::Memory(tables) => lock(tables)
                .keys()
                .filter(|address| address.tier == tier)
                .map(|address| address.name.clone())
                .collect::<Vec<_>>(),
            TierStoreKind::Filesystem { root } => {
                let dir = root.join(tier.as_str());
                if !dir.is_dir() {
                    return Ok(Vec::new());
                }
                let mut names = Vec::new();
                for entry in std::fs::read_dir(&dir)? {
                    let path = entry?.path();
                    if path.extension().and_then(|e| e.to_str()) != Some(TABLE_EXTENSION) {
                        continue;
                    }
                    if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                        names.push(stem.to_string());
                    }
                }
                names
            }
        };
        names.sort();
        Ok(names)
    }

    pub fn exists(&self, address: &TableAddress) -> bool {
        match &self.inner {
            TierStoreKind::Memory(tables) => lock(tables).contains_key(address),
            TierStoreKind::Filesystem { root } => address.validate().is_ok() && table_path(root, address).is_file(),
        }
    }

    /// Removes a table; returns whether anything was stored at the address.
    pub fn drop_table(&self, address: &TableAddress) -> Result<bool> {
        address.validate()?;
        match &self.inner {
            TierStoreKind::Memory(tables) => Ok(lock(tables).remove(address).is_some()),
            TierStoreKind::Filesystem { root } => {
                let path = table_path(root, address);
                match std::fs::remove_file(&path) {
                    Ok(()) => Ok(true),
                    Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
                    Err(err) => Err(err.into()),
                }
            }
        }
    }

    pub fn describe(&self, address: &TableAddress) -> Result<TableDescription> {
        let df = self.read(address)?;
        Ok(TableDescription {
            address: address.clone(),
            columns: df
                .get_columns()
                .iter()
                .map(|column| (column.name().to_string(), column.dtype().to_string()))
                .collect(),
            rows: df.height(),
        })
    }

    /// Copies the stored bytes of `name` from one tier to another, so the
    /// destination is byte-identical to the source at promotion time.
    pub fn promote(&self, name: &str, from: Tier, to: Tier) -> Result<()> {
        let source = TableAddress::new(from, name);
        let target = TableAddress::new(to, name);
        let bytes = self.get_bytes(&source)?;
        self.put_bytes(&target, bytes)
            .map_err(|err| PipelineError::Write {
                address: target.clone(),
                source: Box::new(err),
            })?;
        debug!(from = %source, to = %target, "table promoted");
        Ok(())
    }

    /// Raw stored bytes of a table.
    pub fn get_bytes(&self, address: &TableAddress) -> Result<Vec<u8>> {
        address.validate()?;
        match &self.inner {
            TierStoreKind::Memory(tables) => lock(tables)
                .get(address)
                .cloned()
                .ok_or_else(|| PipelineError::TableNotFound(address.clone())),
            TierStoreKind::Filesystem { root } => {
                let path = table_path(root, address);
                match std::fs::read(&path) {
                    Ok(bytes) => Ok(bytes),
                    Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                        Err(PipelineError::TableNotFound(address.clone()))
                    }
                    Err(err) => Err(err.into()),
                }
            }
        }
    }

    fn put_bytes(&self, address: &TableAddress, bytes: Vec<u8>) -> Result<()> {
        address.validate()?;
        match &self.inner {
            TierStoreKind::Memory(tables) => {
                lock(tables).insert(address.clone(), bytes);
                Ok(())
            }
            TierStoreKind::Filesystem { root } => {
                let path = table_path(root, address);
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                let staging = path.with_extension(format!("{TABLE_EXTENSION}.tmp-{}", Uuid::new_v4()));
                std::fs::write(&staging, &bytes)?;
                if let Err(err) = std::fs::rename(&staging, &path) {
                    let _ = std::fs::remove_file(&staging);
                    return Err(err.into());
                }
                Ok(())
            }
        }
    }
}

fn table_path(root: &Path, address: &TableAddress) -> PathBuf {
    root.join(address.tier.as_str())
        .join(format!("{}.{TABLE_EXTENSION}", address.name))
}

fn lock(
    tables: &Mutex<HashMap<TableAddress, Vec<u8>>>,
) -> std::sync::MutexGuard<'_, HashMap<TableAddress, Vec<u8>>> {
    // a panic while holding the lock cannot leave a half-written entry
    tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn create_parquet_bytes(df: &DataFrame) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    {
        let mut cursor = Cursor::new(&mut buffer);
        let mut clone = df.clone();
        ParquetWriter::new(&mut cursor)
            .with_compression(ParquetCompression::Zstd(None))
            .with_statistics(StatisticsOptions::default())
            .finish(&mut clone)?;
    }
    Ok(buffer)
}

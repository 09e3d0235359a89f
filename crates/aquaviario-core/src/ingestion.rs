use std::collections::HashSet;
use std::path::{Path, PathBuf};

use aquaviario_parser::{decode_text, parse_source_name, read_delimited, SourceName, TextEncoding};
use blake3::Hasher;
use polars::prelude::DataFrame;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{PipelineError, Result};

#[derive(Debug)]
pub struct FileInput<'a> {
    pub path: &'a Path,
    pub contents: &'a [u8],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FileStatus {
    Parsed,
    Duplicate,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub path: PathBuf,
    pub logical: Option<String>,
    pub shard: Option<u32>,
    pub hash: Option<String>,
    pub status: FileStatus,
    pub encoding: Option<TextEncoding>,
    pub rows: Option<usize>,
    pub message: Option<String>,
}

impl FileReport {
    fn failed(path: &Path, name: Option<&SourceName>, hash: Option<String>, message: String) -> Self {
        Self {
            path: path.to_path_buf(),
            logical: name.map(|n| n.logical.clone()),
            shard: name.and_then(|n| n.shard),
            hash,
            status: FileStatus::Failed,
            encoding: None,
            rows: None,
            message: Some(message),
        }
    }
}

/// One successfully loaded export file. Shards of the same logical table are
/// kept as separate entries; merging happens later.
#[derive(Debug)]
pub struct LoadedFile {
    pub path: PathBuf,
    pub name: SourceName,
    pub hash: String,
    pub table: DataFrame,
}

#[derive(Debug, Default)]
pub struct IngestionBatch {
    pub loaded: Vec<LoadedFile>,
    pub reports: Vec<FileReport>,
}

impl IngestionBatch {
    pub fn failed(&self) -> impl Iterator<Item = &FileReport> {
        self.reports
            .iter()
            .filter(|report| report.status == FileStatus::Failed)
    }
}

/// Lists export files directly under `root`, ordered by logical name and then
/// shard index so shards are visited in numeric order.
pub fn discover_sources(root: &Path, extensions: &[String]) -> Result<Vec<(PathBuf, SourceName)>> {
    if !root.is_dir() {
        return Err(PipelineError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("discovery root {} is not a directory", root.display()),
        )));
    }

    let root_str = root.to_string_lossy();
    let pattern = format!("{}/*", glob::Pattern::escape(root_str.trim_end_matches('/')));

    let mut sources = Vec::new();
    for entry in glob::glob(&pattern)? {
        let path = match entry {
            Ok(path) => path,
            Err(err) => {
                warn!(error = %err, "could not read discovered path");
                continue;
            }
        };
        if !path.is_file() {
            continue;
        }
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            warn!(path = %path.display(), "skipping file with non UTF-8 name");
            continue;
        };
        match parse_source_name(file_name, extensions) {
            Some(name) => sources.push((path.clone(), name)),
            None => debug!(path = %path.display(), "ignoring non-export file"),
        }
    }

    sources.sort_by(|(path_a, a), (path_b, b)| {
        a.logical
            .cmp(&b.logical)
            .then(a.shard.cmp(&b.shard))
            .then(path_a.cmp(path_b))
    });
    Ok(sources)
}

/// Discovers and loads every export under `root`. Per-file read or parse
/// failures are reported and skipped.
pub fn ingest_directory(
    root: &Path,
    extensions: &[String],
    separator: u8,
    skip_duplicates: bool,
) -> Result<IngestionBatch> {
    let sources = discover_sources(root, extensions)?;
    info!(root = %root.display(), files = sources.len(), "discovered export files");

    let mut contents = Vec::with_capacity(sources.len());
    let mut unreadable = Vec::new();
    for (path, name) in sources {
        match std::fs::read(&path) {
            Ok(bytes) => contents.push((path, bytes)),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "failed to read export file");
                unreadable.push(FileReport::failed(&path, Some(&name), None, err.to_string()));
            }
        }
    }

    let inputs: Vec<FileInput<'_>> = contents
        .iter()
        .map(|(path, bytes)| FileInput {
            path: path.as_path(),
            contents: bytes.as_slice(),
        })
        .collect();

    let mut batch = ingest_files(&inputs, extensions, separator, skip_duplicates);
    batch.reports.extend(unreadable);
    Ok(batch)
}

/// Parses already-read file contents. Inputs are processed in the given
/// order, which becomes the shard concatenation order downstream.
pub fn ingest_files(
    inputs: &[FileInput<'_>],
    extensions: &[String],
    separator: u8,
    skip_duplicates: bool,
) -> IngestionBatch {
    let mut batch = IngestionBatch::default();
    let mut seen_uploads = HashSet::new();

    for input in inputs {
        let file_name = input
            .path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        let Some(name) = parse_source_name(file_name, extensions) else {
            batch.reports.push(FileReport::failed(
                input.path,
                None,
                None,
                format!("'{file_name}' is not a recognized export file name"),
            ));
            continue;
        };

        let hash = compute_hash(input.contents);
        // Identical bytes only count as a re-upload of the same file slot.
        let slot = (name.logical.clone(), name.shard, hash.clone());
        if skip_duplicates && !seen_uploads.insert(slot) {
            warn!(path = %input.path.display(), table = %name.logical, "skipping re-uploaded file");
            batch.reports.push(FileReport {
                path: input.path.to_path_buf(),
                logical: Some(name.logical.clone()),
                shard: name.shard,
                hash: Some(hash),
                status: FileStatus::Duplicate,
                encoding: None,
                rows: None,
                message: None,
            });
            continue;
        }

        let (text, encoding) = decode_text(input.contents);
        if encoding == TextEncoding::Latin1 {
            debug!(path = %input.path.display(), "file is not UTF-8, decoded as Latin-1");
        }

        match read_delimited(&text, separator) {
            Ok(table) => {
                info!(path = %input.path.display(), table = %name.logical, shard = ?name.shard, rows = table.height(), "file imported");
                batch.reports.push(FileReport {
                    path: input.path.to_path_buf(),
                    logical: Some(name.logical.clone()),
                    shard: name.shard,
                    hash: Some(hash.clone()),
                    status: FileStatus::Parsed,
                    encoding: Some(encoding),
                    rows: Some(table.height()),
                    message: None,
                });
                batch.loaded.push(LoadedFile {
                    path: input.path.to_path_buf(),
                    name,
                    hash,
                    table,
                });
            }
            Err(source) => {
                let err = PipelineError::Ingest {
                    path: input.path.to_path_buf(),
                    source,
                };
                warn!(error = %err, "file excluded from ingestion");
                batch.reports.push(FileReport::failed(
                    input.path,
                    Some(&name),
                    Some(hash),
                    err.to_string(),
                ));
            }
        }
    }

    batch
}

fn compute_hash(contents: &[u8]) -> String {
    let mut hasher = Hasher::new();
    hasher.update(contents);
    let hash = hasher.finalize();
    hash.to_hex().to_string()
}

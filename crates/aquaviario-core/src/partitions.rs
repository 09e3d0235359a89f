use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use polars::prelude::DataFrame;
use serde::Serialize;
use tracing::{info, warn};

use crate::columns::canonicalize_column_name;
use crate::error::{PipelineError, Result};
use crate::ingestion::LoadedFile;
use crate::registry::TableRegistry;
use crate::report::TableIssue;

#[derive(Debug, Clone, Serialize)]
pub struct ShardGroupSummary {
    pub table: String,
    pub shards: Vec<u32>,
    pub rows: usize,
}

#[derive(Debug, Default)]
pub struct MergeOutcome {
    pub tables: TableRegistry,
    pub shard_groups: Vec<ShardGroupSummary>,
    /// Unsharded files replaced by a shard group of the same logical name.
    pub superseded: Vec<PathBuf>,
    pub errors: Vec<TableIssue>,
}

/// Collapses shard files into one table per logical name.
///
/// Shards are concatenated in the order they were ingested. A group whose
/// shards disagree on their column set is excluded and reported.
pub fn merge_partitions(files: Vec<LoadedFile>) -> MergeOutcome {
    let mut groups: BTreeMap<String, Vec<LoadedFile>> = BTreeMap::new();
    for file in files {
        groups.entry(file.name.logical.clone()).or_default().push(file);
    }

    let mut outcome = MergeOutcome::default();
    for (logical, members) in groups {
        let (shards, whole): (Vec<LoadedFile>, Vec<LoadedFile>) =
            members.into_iter().partition(|file| file.name.is_shard());

        if shards.is_empty() {
            // several unsharded files with one logical name: the last one
            // discovered wins, matching a plain re-upload
            let mut whole = whole;
            if let Some(last) = whole.pop() {
                outcome.superseded.extend(whole.into_iter().map(|file| file.path));
                outcome.tables.insert(logical, last.table);
            }
            continue;
        }

        for file in &whole {
            warn!(table = %logical, path = %file.path.display(), "unsharded file superseded by shard group");
        }
        outcome
            .superseded
            .extend(whole.into_iter().map(|file| file.path));

        let indices: Vec<u32> = shards.iter().filter_map(|file| file.name.shard).collect();
        let frames: Vec<DataFrame> = shards.into_iter().map(|file| file.table).collect();
        match concat_tables(&logical, frames) {
            Ok(merged) => {
                info!(table = %logical, shards = indices.len(), rows = merged.height(), "merged shard group");
                outcome.shard_groups.push(ShardGroupSummary {
                    table: logical.clone(),
                    shards: indices,
                    rows: merged.height(),
                });
                outcome.tables.insert(logical, merged);
            }
            Err(err) => {
                warn!(table = %logical, error = %err, "shard group excluded");
                outcome.errors.push(TableIssue::new(&logical, &err));
            }
        }
    }

    outcome
}

/// Stacks `frames` vertically after checking they share one column set.
///
/// Columns are compared by their canonical form, so shards whose headers
/// differ only in case, accents or punctuation still line up. Such frames are
/// renamed and reordered to the first frame's headers. Any other difference
/// is a [`PipelineError::SchemaMismatch`].
pub fn concat_tables(table: &str, frames: Vec<DataFrame>) -> Result<DataFrame> {
    let mut iter = frames.into_iter();
    let Some(mut combined) = iter.next() else {
        return Ok(DataFrame::default());
    };

    let expected = column_names(&combined);
    let by_key: HashMap<String, &str> = expected
        .iter()
        .map(|name| (canonicalize_column_name(name), name.as_str()))
        .collect();
    let expected_keys = sorted_keys(&expected);

    for frame in iter {
        let found = column_names(&frame);
        if found == expected {
            combined.vstack_mut(&frame)?;
            continue;
        }

        // keys must be distinct on both sides or the renaming is ambiguous
        if by_key.len() != expected.len() || sorted_keys(&found) != expected_keys {
            return Err(PipelineError::SchemaMismatch {
                table: table.to_string(),
                expected: expected.clone(),
                found,
            });
        }

        let mut aligned = frame;
        let renamed: Vec<&str> = found
            .iter()
            .map(|name| {
                let key = canonicalize_column_name(name);
                by_key.get(&key).copied().unwrap_or(name.as_str())
            })
            .collect();
        aligned.set_column_names(renamed)?;
        let aligned = aligned.select(expected.iter().map(String::as_str))?;
        combined.vstack_mut(&aligned)?;
    }

    Ok(combined)
}

fn sorted_keys(names: &[String]) -> Vec<String> {
    let mut keys: Vec<String> = names.iter().map(|name| canonicalize_column_name(name)).collect();
    keys.sort();
    keys
}

pub(crate) fn column_names(df: &DataFrame) -> Vec<String> {
    df.get_column_names()
        .iter()
        .map(|name| name.to_string())
        .collect()
}

use std::collections::BTreeMap;

use polars::prelude::*;
use serde::Serialize;

use crate::config::PipelineConfig;
use crate::error::Result;

/// Per-column null counts of one table. Purely diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NullAudit {
    pub table: String,
    pub rows: usize,
    pub nulls: BTreeMap<String, usize>,
}

impl NullAudit {
    pub fn total(&self) -> usize {
        self.nulls.values().sum()
    }
}

/// Exact row-wise duplicates of one table.
///
/// `duplicates` is the sum over distinct rows of `multiplicity - 1`;
/// `duplicated_groups` counts distinct rows that appear more than once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateAudit {
    pub table: String,
    pub rows: usize,
    pub distinct_rows: usize,
    pub duplicates: usize,
    pub duplicated_groups: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Remediation {
    FilledNulls { cells: usize, sentinel: String },
    DroppedDuplicates { rows: usize },
}

/// Which tables get which fix, taken from the run configuration.
#[derive(Debug, Clone)]
pub struct QualityPolicy {
    pub null_sensitive: Vec<String>,
    pub duplicate_prone: Vec<String>,
    pub sentinel: String,
}

impl QualityPolicy {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            null_sensitive: config.null_sensitive_tables.clone(),
            duplicate_prone: config.duplicate_prone_tables.clone(),
            sentinel: config.null_sentinel.clone(),
        }
    }

    pub fn applies_to(&self, table: &str) -> bool {
        self.fills_nulls(table) || self.drops_duplicates(table)
    }

    pub fn fills_nulls(&self, table: &str) -> bool {
        self.null_sensitive.iter().any(|t| t == table)
    }

    pub fn drops_duplicates(&self, table: &str) -> bool {
        self.duplicate_prone.iter().any(|t| t == table)
    }

    /// Applies the fixes configured for `table`. Nulls are filled before
    /// deduplication so the result is distinct even when a table is on both
    /// lists.
    pub fn remediate(&self, table: &str, df: &DataFrame) -> Result<(DataFrame, Vec<Remediation>)> {
        let mut current = df.clone();
        let mut actions = Vec::new();

        if self.fills_nulls(table) {
            let cells = null_audit(table, &current).total();
            current = fill_nulls(&current, &self.sentinel)?;
            actions.push(Remediation::FilledNulls {
                cells,
                sentinel: self.sentinel.clone(),
            });
        }

        if self.drops_duplicates(table) {
            let before = current.height();
            current = drop_duplicate_rows(&current)?;
            actions.push(Remediation::DroppedDuplicates {
                rows: before - current.height(),
            });
        }

        Ok((current, actions))
    }
}

pub fn null_audit(table: &str, df: &DataFrame) -> NullAudit {
    let nulls = df
        .get_columns()
        .iter()
        .map(|column| (column.name().to_string(), column.null_count()))
        .collect();
    NullAudit {
        table: table.to_string(),
        rows: df.height(),
        nulls,
    }
}

pub fn duplicate_audit(table: &str, df: &DataFrame) -> Result<DuplicateAudit> {
    let (distinct_rows, duplicated_groups) = if df.width() == 0 || df.height() == 0 {
        (df.height(), 0)
    } else {
        let repeated = df.filter(&df.is_duplicated()?)?;
        (distinct(df)?.height(), distinct(&repeated)?.height())
    };

    Ok(DuplicateAudit {
        table: table.to_string(),
        rows: df.height(),
        distinct_rows,
        duplicates: df.height() - distinct_rows,
        duplicated_groups,
    })
}

/// Replaces every null cell with `sentinel`. Non-string columns are cast to
/// strings first; non-null cells keep their text.
pub fn fill_nulls(df: &DataFrame, sentinel: &str) -> Result<DataFrame> {
    let exprs: Vec<Expr> = df
        .get_columns()
        .iter()
        .map(|column| {
            let name = column.name().as_str();
            let base = if column.dtype() == &DataType::String {
                col(name)
            } else {
                col(name).cast(DataType::String)
            };
            base.fill_null(lit(sentinel)).alias(name)
        })
        .collect();

    if exprs.is_empty() {
        return Ok(df.clone());
    }
    Ok(df.clone().lazy().with_columns(exprs).collect()?)
}

/// Keeps the first occurrence of every distinct row, preserving input order.
pub fn drop_duplicate_rows(df: &DataFrame) -> Result<DataFrame> {
    if df.width() == 0 || df.height() == 0 {
        return Ok(df.clone());
    }
    distinct(df)
}

fn distinct(df: &DataFrame) -> Result<DataFrame> {
    Ok(df.unique_stable(None, UniqueKeepStrategy::First, None)?)
}

use std::collections::HashMap;
use std::fmt;

use polars::prelude::*;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::YearRange;
use crate::error::Result;
use crate::partitions::concat_tables;
use crate::registry::TableRegistry;
use crate::report::TableIssue;

/// Typed `(year, topic)` address of one per-year export table.
///
/// Topics compare case-insensitively so `2020Atracacao` and a configured
/// `atracacao` topic meet on the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TopicKey {
    pub year: u16,
    pub topic: String,
}

impl TopicKey {
    pub fn new(year: u16, topic: &str) -> Self {
        Self {
            year,
            topic: topic.to_lowercase(),
        }
    }

    /// Parses a logical table name of the form `<year><Topic>`.
    pub fn from_table_name(name: &str) -> Option<Self> {
        let digits = name.get(..4)?;
        if !digits.chars().all(|c| c.is_ascii_digit()) || name.len() == 4 {
            return None;
        }
        Some(Self::new(digits.parse().ok()?, &name[4..]))
    }
}

impl fmt::Display for TopicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.year, self.topic)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MissingTopicYear {
    pub topic: String,
    pub year: u16,
}

#[derive(Debug, Clone, Serialize)]
pub struct TopicYearRows {
    pub topic: String,
    pub year: u16,
    pub rows: usize,
}

#[derive(Debug, Default)]
pub struct TopicUnion {
    pub tables: TableRegistry,
    pub rows_per_year: Vec<TopicYearRows>,
    pub missing: Vec<MissingTopicYear>,
    pub errors: Vec<TableIssue>,
}

/// Adds a literal year column, replacing any column already using that name.
pub fn tag_year(df: &DataFrame, column: &str, year: u16) -> Result<DataFrame> {
    let value = year.to_string();
    let mut tagged = df.clone();
    tagged.with_column(Series::new(
        column.into(),
        vec![value.as_str(); df.height()],
    ))?;
    Ok(tagged)
}

/// Unions every configured topic across the year range into one table named
/// after the lowercased topic.
///
/// Missing `(year, topic)` pairs are warnings. A topic whose yearly tables
/// disagree on their columns is excluded; a topic with no years present
/// produces no table.
pub fn union_topics(
    per_year: &TableRegistry,
    topics: &[String],
    years: YearRange,
    year_column: &str,
) -> TopicUnion {
    let index: HashMap<TopicKey, &str> = per_year
        .iter()
        .filter_map(|(name, _)| TopicKey::from_table_name(name).map(|key| (key, name)))
        .collect();

    let mut union = TopicUnion::default();
    for topic in topics {
        let topic_name = topic.to_lowercase();
        let mut frames = Vec::new();
        let mut counts = Vec::new();

        for year in years.iter() {
            let key = TopicKey::new(year, topic);
            let Some(df) = index.get(&key).and_then(|name| per_year.get(name)) else {
                warn!(topic = %topic, year, "table {}{} not found", year, topic);
                union.missing.push(MissingTopicYear {
                    topic: topic_name.clone(),
                    year,
                });
                continue;
            };
            info!(table = %key, rows = df.height(), "loading yearly table");
            match tag_year(df, year_column, year) {
                Ok(tagged) => {
                    counts.push(TopicYearRows {
                        topic: topic_name.clone(),
                        year,
                        rows: tagged.height(),
                    });
                    frames.push(tagged);
                }
                Err(err) => {
                    union.errors.push(TableIssue::new(&key.to_string(), &err));
                    frames.clear();
                    break;
                }
            }
        }

        if frames.is_empty() {
            continue;
        }

        match concat_tables(&topic_name, frames) {
            Ok(table) => {
                info!(table = %topic_name, rows = table.height(), years = counts.len(), "topic consolidated");
                union.rows_per_year.extend(counts);
                union.tables.insert(topic_name, table);
            }
            Err(err) => {
                warn!(table = %topic_name, error = %err, "topic excluded");
                union.errors.push(TableIssue::new(&topic_name, &err));
            }
        }
    }

    union
}

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::Result;
use crate::ingestion::{FileReport, FileStatus};
use crate::partitions::ShardGroupSummary;
use crate::quality::{DuplicateAudit, NullAudit, Remediation};
use crate::tiers::Tier;
use crate::topics::{MissingTopicYear, TopicYearRows};

/// A table-scoped failure: the table was excluded, the run went on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableIssue {
    pub table: String,
    pub message: String,
}

impl TableIssue {
    pub fn new(table: &str, error: &impl std::fmt::Display) -> Self {
        Self {
            table: table.to_string(),
            message: error.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TierWrites {
    pub written: Vec<String>,
    pub failed: Vec<TableIssue>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TierSummary {
    pub tier: Tier,
    pub writes: TierWrites,
}

#[derive(Debug, Clone, Serialize)]
pub struct TableRemediation {
    pub table: String,
    pub actions: Vec<Remediation>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct QualitySnapshot {
    pub nulls: Vec<NullAudit>,
    pub duplicates: Vec<DuplicateAudit>,
}

/// Everything an operator needs to judge one pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub files: Vec<FileReport>,
    pub shard_groups: Vec<ShardGroupSummary>,
    pub superseded_files: Vec<String>,
    pub merge_errors: Vec<TableIssue>,
    pub normalization_errors: Vec<TableIssue>,
    pub missing_topic_years: Vec<MissingTopicYear>,
    pub topic_rows: Vec<TopicYearRows>,
    pub topic_errors: Vec<TableIssue>,
    pub tiers: Vec<TierSummary>,
    pub quality_before: QualitySnapshot,
    pub remediations: Vec<TableRemediation>,
    pub quality_errors: Vec<TableIssue>,
    pub quality_after: QualitySnapshot,
    pub promoted: Vec<String>,
}

impl RunReport {
    pub fn start() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            files: Vec::new(),
            shard_groups: Vec::new(),
            superseded_files: Vec::new(),
            merge_errors: Vec::new(),
            normalization_errors: Vec::new(),
            missing_topic_years: Vec::new(),
            topic_rows: Vec::new(),
            topic_errors: Vec::new(),
            tiers: Vec::new(),
            quality_before: QualitySnapshot::default(),
            remediations: Vec::new(),
            quality_errors: Vec::new(),
            quality_after: QualitySnapshot::default(),
            promoted: Vec::new(),
        }
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn tier(&self, tier: Tier) -> Option<&TierWrites> {
        self.tiers
            .iter()
            .find(|summary| summary.tier == tier)
            .map(|summary| &summary.writes)
    }

    pub fn files_with_status(&self, status: FileStatus) -> usize {
        self.files.iter().filter(|file| file.status == status).count()
    }

    /// All table-scoped failures of the run, in pipeline order.
    pub fn issues(&self) -> Vec<&TableIssue> {
        self.merge_errors
            .iter()
            .chain(&self.normalization_errors)
            .chain(&self.topic_errors)
            .chain(&self.quality_errors)
            .chain(self.tiers.iter().flat_map(|summary| &summary.writes.failed))
            .collect()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

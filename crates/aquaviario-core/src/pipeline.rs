//! End-to-end run: discover exports, load them into the raw tier, union the
//! yearly topics into the cleaned tier, remediate, and promote to curated.

use std::collections::HashSet;

use tracing::{info, info_span, warn};

use crate::columns::normalize_tables;
use crate::config::PipelineConfig;
use crate::error::Result;
use crate::ingestion::{ingest_directory, IngestionBatch};
use crate::partitions::merge_partitions;
use crate::quality::{duplicate_audit, null_audit, QualityPolicy};
use crate::registry::TableRegistry;
use crate::report::{QualitySnapshot, RunReport, TableIssue, TableRemediation, TierSummary, TierWrites};
use crate::tiers::{TableAddress, Tier, TierStore};
use crate::topics::union_topics;

/// Runs the whole pipeline against the files under `config.discovery_root`.
///
/// Only an invalid configuration or an unreadable discovery root fails the
/// run. Everything table-scoped is recorded in the returned report.
pub fn run(config: &PipelineConfig, store: &TierStore) -> Result<RunReport> {
    config.validate()?;
    let batch = ingest_directory(
        &config.discovery_root,
        &config.extensions,
        config.separator_byte(),
        config.skip_duplicate_files,
    )?;
    process_batch(config, store, batch)
}

/// Runs every stage after ingestion on an already loaded batch.
pub fn process_batch(
    config: &PipelineConfig,
    store: &TierStore,
    batch: IngestionBatch,
) -> Result<RunReport> {
    config.validate()?;
    let mut report = RunReport::start();
    let span = info_span!("pipeline_run", run_id = %report.run_id);
    let _guard = span.enter();

    let IngestionBatch { loaded, reports } = batch;
    info!(files = reports.len(), loaded = loaded.len(), "ingestion finished");
    report.files = reports;

    let merged = merge_partitions(loaded);
    report.shard_groups = merged.shard_groups;
    report.superseded_files = merged
        .superseded
        .iter()
        .map(|path| path.display().to_string())
        .collect();
    report.merge_errors = merged.errors;

    let (per_year, normalization_errors) = normalize_tables(merged.tables);
    report.normalization_errors = normalization_errors;
    report.tiers.push(publish(store, Tier::Raw, &per_year));

    let union = union_topics(&per_year, &config.topics, config.years, &config.year_column);
    report.missing_topic_years = union.missing;
    report.topic_rows = union.rows_per_year;
    report.topic_errors = union.errors;
    report.tiers.push(publish(store, Tier::Cleaned, &union.tables));

    let failed = apply_quality(&QualityPolicy::from_config(config), store, &mut report)?;
    let curated = promote_cleaned(store, &failed)?;
    report.promoted = curated.writes.written.clone();
    report.tiers.push(curated);

    report.finish();
    info!(
        issues = report.issues().len(),
        promoted = report.promoted.len(),
        "pipeline run finished"
    );
    Ok(report)
}

/// Writes every table of `tables` into `tier`. A failed write excludes only
/// that table.
fn publish(store: &TierStore, tier: Tier, tables: &TableRegistry) -> TierSummary {
    let mut writes = TierWrites::default();
    for (name, df) in tables.iter() {
        let address = TableAddress::new(tier, name);
        match store.write(&address, df) {
            Ok(()) => writes.written.push(name.to_string()),
            Err(err) => {
                warn!(table = %address, error = %err, "table write failed");
                writes.failed.push(TableIssue::new(name, &err));
            }
        }
    }
    info!(tier = %tier, written = writes.written.len(), failed = writes.failed.len(), "tier published");
    TierSummary { tier, writes }
}

/// Audits every cleaned table, rewrites the ones the policy covers, then
/// audits every table again. Returns the tables whose remediation failed.
fn apply_quality(
    policy: &QualityPolicy,
    store: &TierStore,
    report: &mut RunReport,
) -> Result<HashSet<String>> {
    let mut failed = HashSet::new();
    let mut before = QualitySnapshot::default();
    let mut after = QualitySnapshot::default();

    for name in store.list(Tier::Cleaned)? {
        let address = TableAddress::new(Tier::Cleaned, &name);
        let df = match store.read(&address) {
            Ok(df) => df,
            Err(err) => {
                warn!(table = %address, error = %err, "cleaned table unreadable");
                report.quality_errors.push(TableIssue::new(&name, &err));
                failed.insert(name);
                continue;
            }
        };

        before.nulls.push(null_audit(&name, &df));
        let duplicates = match duplicate_audit(&name, &df) {
            Ok(audit) => audit,
            Err(err) => {
                report.quality_errors.push(TableIssue::new(&name, &err));
                failed.insert(name);
                continue;
            }
        };
        info!(
            table = %name,
            rows = duplicates.rows,
            nulls = before.nulls.last().map(|audit| audit.total()).unwrap_or_default(),
            duplicates = duplicates.duplicates,
            "quality audit"
        );
        before.duplicates.push(duplicates);

        let current = if policy.applies_to(&name) {
            let remediated = policy.remediate(&name, &df).and_then(|(fixed, actions)| {
                store.write(&address, &fixed).map(|()| (fixed, actions))
            });
            match remediated {
                Ok((fixed, actions)) => {
                    info!(table = %name, rows = fixed.height(), "table remediated");
                    report.remediations.push(TableRemediation {
                        table: name.clone(),
                        actions,
                    });
                    fixed
                }
                Err(err) => {
                    warn!(table = %name, error = %err, "remediation failed");
                    report.quality_errors.push(TableIssue::new(&name, &err));
                    failed.insert(name);
                    continue;
                }
            }
        } else {
            df
        };

        after.nulls.push(null_audit(&name, &current));
        match duplicate_audit(&name, &current) {
            Ok(audit) => after.duplicates.push(audit),
            Err(err) => report.quality_errors.push(TableIssue::new(&name, &err)),
        }
    }

    report.quality_before = before;
    report.quality_after = after;
    Ok(failed)
}

/// Copies every cleaned table to the curated tier. Tables whose quality step
/// did not complete are not promoted, and any curated copy left by an earlier
/// run is removed so curated never lags behind cleaned.
fn promote_cleaned(store: &TierStore, skipped: &HashSet<String>) -> Result<TierSummary> {
    let mut writes = TierWrites::default();
    for name in store.list(Tier::Cleaned)? {
        if skipped.contains(&name) {
            let stale = TableAddress::new(Tier::Curated, &name);
            let message = match store.drop_table(&stale) {
                Ok(true) => {
                    warn!(table = %stale, "removed curated copy of a table that failed its quality step");
                    "not promoted: cleaned table failed its quality step; previous curated copy removed"
                        .to_string()
                }
                Ok(false) => "not promoted: cleaned table failed its quality step".to_string(),
                Err(err) => format!(
                    "not promoted: cleaned table failed its quality step; previous curated copy could not be removed: {err}"
                ),
            };
            writes.failed.push(TableIssue::new(&name, &message));
            continue;
        }
        match store.promote(&name, Tier::Cleaned, Tier::Curated) {
            Ok(()) => writes.written.push(name),
            Err(err) => {
                warn!(table = %name, error = %err, "promotion failed");
                let stale = TableAddress::new(Tier::Curated, &name);
                if let Err(drop_err) = store.drop_table(&stale) {
                    warn!(table = %stale, error = %drop_err, "could not remove curated copy");
                }
                writes.failed.push(TableIssue::new(&name, &err));
            }
        }
    }
    info!(promoted = writes.written.len(), "curated tier refreshed");
    Ok(TierSummary {
        tier: Tier::Curated,
        writes,
    })
}

use anyhow::Result;
use aquaviario_core::ingestion::FileStatus;
use aquaviario_core::report::RunReport;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{ContentArrangement, Table};
use polars::prelude::*;

fn new_table(header: Vec<String>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

/// Renders a frame as text cells; nulls print as empty cells.
pub fn frame(df: &DataFrame) -> Result<Table> {
    let header = df
        .get_column_names()
        .iter()
        .map(|name| name.to_string())
        .collect();
    let columns = df
        .get_columns()
        .iter()
        .map(|column| Ok(column.cast(&DataType::String)?.str()?.clone()))
        .collect::<PolarsResult<Vec<StringChunked>>>()?;

    let mut table = new_table(header);
    for idx in 0..df.height() {
        table.add_row(
            columns
                .iter()
                .map(|column| column.get(idx).unwrap_or_default().to_string())
                .collect::<Vec<_>>(),
        );
    }
    Ok(table)
}

pub fn run_summary(report: &RunReport) -> Table {
    let mut table = new_table(vec!["stage".into(), "value".into()]);
    table.add_row(vec!["run".to_string(), report.run_id.to_string()]);
    table.add_row(vec![
        "files parsed / duplicate / failed".to_string(),
        format!(
            "{} / {} / {}",
            report.files_with_status(FileStatus::Parsed),
            report.files_with_status(FileStatus::Duplicate),
            report.files_with_status(FileStatus::Failed)
        ),
    ]);
    table.add_row(vec![
        "shard groups merged".to_string(),
        report.shard_groups.len().to_string(),
    ]);
    table.add_row(vec![
        "missing year/topic pairs".to_string(),
        report.missing_topic_years.len().to_string(),
    ]);
    for summary in &report.tiers {
        table.add_row(vec![
            format!("{} tier written / failed", summary.tier),
            format!("{} / {}", summary.writes.written.len(), summary.writes.failed.len()),
        ]);
    }
    table
}

/// Null and duplicate counts per table, before and after remediation.
pub fn quality(report: &RunReport) -> Table {
    let mut table = new_table(
        ["table", "rows", "nulls before", "nulls after", "duplicates before", "duplicates after"]
            .iter()
            .map(|h| h.to_string())
            .collect(),
    );
    for before in &report.quality_before.nulls {
        let after_nulls = report
            .quality_after
            .nulls
            .iter()
            .find(|audit| audit.table == before.table);
        let duplicates_before = report
            .quality_before
            .duplicates
            .iter()
            .find(|audit| audit.table == before.table);
        let duplicates_after = report
            .quality_after
            .duplicates
            .iter()
            .find(|audit| audit.table == before.table);

        table.add_row(vec![
            before.table.clone(),
            before.rows.to_string(),
            before.total().to_string(),
            after_nulls.map(|a| a.total().to_string()).unwrap_or_default(),
            duplicates_before.map(|d| d.duplicates.to_string()).unwrap_or_default(),
            duplicates_after.map(|d| d.duplicates.to_string()).unwrap_or_default(),
        ]);
    }
    table
}

pub fn issues(report: &RunReport) -> Option<Table> {
    let mut rows: Vec<Vec<String>> = report
        .files
        .iter()
        .filter(|file| file.status == FileStatus::Failed)
        .map(|file| {
            vec![
                file.path.display().to_string(),
                file.message.clone().unwrap_or_default(),
            ]
        })
        .collect();
    rows.extend(
        report
            .issues()
            .into_iter()
            .map(|issue| vec![issue.table.clone(), issue.message.clone()]),
    );
    if rows.is_empty() {
        return None;
    }

    let mut table = new_table(vec!["source".into(), "problem".into()]);
    for row in rows {
        table.add_row(row);
    }
    Some(table)
}

use std::path::{Path, PathBuf};

use aquaviario_core::config::{PipelineConfig, YearRange};
use aquaviario_core::error::PipelineError;
use aquaviario_core::ingestion::{ingest_files, FileInput, FileStatus};
use aquaviario_core::pipeline::{process_batch, run};
use aquaviario_core::quality::Remediation;
use aquaviario_core::queries::AnalyticalQuery;
use aquaviario_core::tiers::{TableAddress, Tier, TierStore};
use polars::prelude::*;

fn exports_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../aquaviario-parser/tests/data/exports")
}

fn fixture_config() -> PipelineConfig {
    PipelineConfig {
        discovery_root: exports_dir(),
        ..PipelineConfig::default()
    }
}

#[test]
fn fixture_exports_flow_through_every_tier() {
    let dir = tempfile::tempdir().unwrap();
    let store = TierStore::filesystem(dir.path());
    let report = run(&fixture_config(), &store).expect("pipeline run");

    assert_eq!(report.files.len(), 6);
    assert_eq!(report.files_with_status(FileStatus::Parsed), 5);
    assert_eq!(report.files_with_status(FileStatus::Failed), 1);
    assert_eq!(report.shard_groups.len(), 1);
    assert!(report.issues().is_empty());
    assert!(report.finished_at.is_some());

    assert_eq!(
        report.tier(Tier::Raw).unwrap().written,
        vec!["2020Atracacao", "2020Carga", "2020TemposAtracacao", "2021Atracacao"]
    );
    let expected = vec!["atracacao", "carga", "temposatracacao"];
    assert_eq!(report.tier(Tier::Cleaned).unwrap().written, expected);
    assert_eq!(report.promoted, expected);
    assert_eq!(store.list(Tier::Curated).unwrap(), expected);

    // 11 topics over 5 years, 4 of the pairs present
    assert_eq!(report.missing_topic_years.len(), 51);

    let atracacao = store
        .read(&TableAddress::new(Tier::Curated, "atracacao"))
        .unwrap();
    assert_eq!(atracacao.height(), 5);
    assert_eq!(atracacao.column("berco_m").unwrap().null_count(), 0);
    let years = atracacao.column("ano").unwrap().str().unwrap();
    assert_eq!(years.get(0), Some("2020"));
    assert_eq!(years.get(4), Some("2021"));

    let carga = store.read(&TableAddress::new(Tier::Raw, "2020Carga")).unwrap();
    assert_eq!(carga.height(), 3);
}

#[test]
fn quality_diagnostics_are_reported_before_and_after() {
    let store = TierStore::memory();
    let report = run(&fixture_config(), &store).unwrap();

    let before = report
        .quality_before
        .nulls
        .iter()
        .find(|audit| audit.table == "atracacao")
        .unwrap();
    assert_eq!(before.nulls["berco_m"], 2);

    let after = report
        .quality_after
        .nulls
        .iter()
        .find(|audit| audit.table == "atracacao")
        .unwrap();
    assert_eq!(after.total(), 0);
    assert_eq!(report.quality_after.nulls.len(), 3);

    let remediation = report
        .remediations
        .iter()
        .find(|r| r.table == "atracacao")
        .unwrap();
    assert_eq!(
        remediation.actions,
        vec![Remediation::FilledNulls {
            cells: 2,
            sentinel: "Desconhecido".to_string()
        }]
    );
    assert!(report.remediations.iter().all(|r| r.table != "temposatracacao"));
}

#[test]
fn curated_tier_is_byte_identical_to_cleaned() {
    let store = TierStore::memory();
    let report = run(&fixture_config(), &store).unwrap();

    for name in &report.promoted {
        let cleaned = store.get_bytes(&TableAddress::new(Tier::Cleaned, name)).unwrap();
        let curated = store.get_bytes(&TableAddress::new(Tier::Curated, name)).unwrap();
        assert_eq!(cleaned, curated, "table {name}");
    }
}

#[test]
fn queries_run_against_pipeline_output() {
    let store = TierStore::memory();
    run(&fixture_config(), &store).unwrap();

    let result = AnalyticalQuery::AverageBerthTimeByPort.run(&store).unwrap();
    let ports = result.column("porto_atracacao").unwrap().str().unwrap();
    let averages = result.column("tempo_medio_atracacao").unwrap().f64().unwrap();
    assert_eq!(ports.get(0), Some("Belém"));
    assert_eq!(averages.get(0), Some(6.0));
    assert_eq!(ports.get(1), Some("Santos"));
    assert_eq!(averages.get(1), Some(4.0));

    let weights = AnalyticalQuery::CargoWeightByYear {
        year_column: "ano".to_string(),
    }
    .run(&store)
    .unwrap();
    assert_eq!(weights.height(), 1);
    let total = weights
        .column("total_carga_movimentada")
        .unwrap()
        .f64()
        .unwrap()
        .get(0)
        .unwrap();
    assert!((total - 1730.75).abs() < 1e-9);
}

#[test]
fn duplicate_prone_topic_is_deduplicated() {
    let first = "IDCarga;Conteiner\n1;ABC\n1;ABC\n2;DEF\n";
    let second = "IDCarga;Conteiner\n3;GHI\n3;GHI\n";
    let inputs = [
        FileInput {
            path: Path::new("2023Carga_Conteinerizada.txt"),
            contents: first.as_bytes(),
        },
        FileInput {
            path: Path::new("2024Carga_Conteinerizada.txt"),
            contents: second.as_bytes(),
        },
    ];
    let config = PipelineConfig {
        years: YearRange::new(2023, 2024),
        ..PipelineConfig::default()
    };
    let batch = ingest_files(&inputs, &config.extensions, config.separator_byte(), true);

    let store = TierStore::memory();
    let report = process_batch(&config, &store, batch).unwrap();

    let curated = store
        .read(&TableAddress::new(Tier::Curated, "carga_conteinerizada"))
        .unwrap();
    assert_eq!(curated.height(), 3);

    let before = report
        .quality_before
        .duplicates
        .iter()
        .find(|audit| audit.table == "carga_conteinerizada")
        .unwrap();
    assert_eq!(before.duplicates, 2);
    let after = report
        .quality_after
        .duplicates
        .iter()
        .find(|audit| audit.table == "carga_conteinerizada")
        .unwrap();
    assert_eq!(after.duplicates, 0);
}

#[test]
fn colliding_columns_exclude_only_their_table() {
    let inputs = [
        FileInput {
            path: Path::new("2020Carga.txt"),
            contents: "Peso Bruto;Peso-Bruto\n1;2\n".as_bytes(),
        },
        FileInput {
            path: Path::new("2020Atracacao.txt"),
            contents: "IDAtracacao\n1\n".as_bytes(),
        },
    ];
    let config = PipelineConfig::default();
    let batch = ingest_files(&inputs, &config.extensions, config.separator_byte(), true);

    let store = TierStore::memory();
    let report = process_batch(&config, &store, batch).unwrap();

    assert_eq!(report.normalization_errors.len(), 1);
    assert_eq!(report.normalization_errors[0].table, "2020Carga");
    assert_eq!(report.promoted, vec!["atracacao"]);
}

#[test]
fn invalid_configuration_aborts_the_run() {
    let config = PipelineConfig {
        discovery_root: exports_dir(),
        years: YearRange::new(2024, 2020),
        ..PipelineConfig::default()
    };
    let store = TierStore::memory();

    assert!(matches!(run(&config, &store), Err(PipelineError::Config(_))));
    assert!(store.list(Tier::Raw).unwrap().is_empty());
}

#[test]
fn missing_discovery_root_aborts_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let config = PipelineConfig {
        discovery_root: dir.path().join("nothing-here"),
        ..PipelineConfig::default()
    };
    assert!(run(&config, &TierStore::memory()).is_err());
}

#[test]
fn report_serializes_to_json() {
    let report = run(&fixture_config(), &TierStore::memory()).unwrap();
    let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();

    assert_eq!(json["promoted"].as_array().unwrap().len(), 3);
    assert_eq!(json["files"].as_array().unwrap().len(), 6);
    assert_eq!(json["tiers"][0]["tier"], "raw");
}

fn yearly_config(root: &Path) -> PipelineConfig {
    PipelineConfig {
        discovery_root: root.to_path_buf(),
        years: YearRange {
            start: 2023,
            end: 2024,
        },
        topics: vec!["TaxaOcupacao".to_string()],
        ..PipelineConfig::default()
    }
}

#[test]
fn identical_exports_for_two_years_are_both_unioned() {
    let dir = tempfile::tempdir().unwrap();
    let body = "IDBerco;AnoTaxaOcupacao\nB1;2023\n";
    std::fs::write(dir.path().join("2023TaxaOcupacao.txt"), body).unwrap();
    std::fs::write(dir.path().join("2024TaxaOcupacao.txt"), body).unwrap();

    let store = TierStore::memory();
    let report = run(&yearly_config(dir.path()), &store).unwrap();

    assert_eq!(report.files_with_status(FileStatus::Duplicate), 0);
    assert_eq!(
        report.tier(Tier::Raw).unwrap().written,
        vec!["2023TaxaOcupacao", "2024TaxaOcupacao"]
    );
    assert!(report.missing_topic_years.is_empty());
    let taxa = store
        .read(&TableAddress::new(Tier::Cleaned, "taxaocupacao"))
        .unwrap();
    assert_eq!(taxa.height(), 2);
}

#[test]
fn configured_year_column_reaches_the_yearly_query() {
    let config = PipelineConfig {
        year_column: "year".to_string(),
        ..fixture_config()
    };
    let store = TierStore::memory();
    run(&config, &store).unwrap();

    let query = "cargo-weight-by-year"
        .parse::<AnalyticalQuery>()
        .unwrap()
        .with_year_column(&config.year_column);
    let weights = query.run(&store).unwrap();
    assert_eq!(weights.height(), 1);
    let years = weights.column("year").unwrap().str().unwrap();
    assert_eq!(years.get(0), Some("2020"));
}

#[test]
fn table_failing_its_quality_step_loses_its_curated_copy() {
    let dir = tempfile::tempdir().unwrap();
    let exports = dir.path().join("exports");
    std::fs::create_dir(&exports).unwrap();
    std::fs::write(exports.join("2023TaxaOcupacao.txt"), "IDBerco\nB1\n").unwrap();

    let store = TierStore::filesystem(dir.path().join("store"));
    let config = yearly_config(&exports);
    run(&config, &store).unwrap();
    assert!(store.exists(&TableAddress::new(Tier::Curated, "taxaocupacao")));

    // a cleaned table this run does not rewrite and cannot read back
    let stale = df!("idberco" => ["B9"]).unwrap();
    store
        .write(&TableAddress::new(Tier::Curated, "carga"), &stale)
        .unwrap();
    std::fs::write(dir.path().join("store/cleaned/carga.parquet"), b"not parquet").unwrap();

    let report = run(&config, &store).unwrap();

    assert!(!store.exists(&TableAddress::new(Tier::Curated, "carga")));
    assert!(store.exists(&TableAddress::new(Tier::Curated, "taxaocupacao")));
    assert_eq!(report.promoted, vec!["taxaocupacao"]);
    assert!(report.quality_errors.iter().any(|issue| issue.table == "carga"));
    let curated = report.tier(Tier::Curated).unwrap();
    assert_eq!(curated.failed.len(), 1);
    assert!(curated.failed[0].message.contains("previous curated copy removed"));
}

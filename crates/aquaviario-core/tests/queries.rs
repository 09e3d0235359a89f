use aquaviario_core::error::PipelineError;
use aquaviario_core::queries::{AnalyticalQuery, ATRACACAO, CARGA, TAXA_OCUPACAO, TEMPOS_ATRACACAO};
use aquaviario_core::tiers::{TableAddress, Tier, TierStore};
use polars::prelude::*;

fn curated(store: &TierStore, name: &str, df: DataFrame) {
    store.write(&TableAddress::new(Tier::Curated, name), &df).unwrap();
}

fn harbor() -> TierStore {
    let store = TierStore::memory();
    curated(
        &store,
        ATRACACAO,
        df!(
            "idatracacao" => ["1", "2", "3", "4"],
            "porto_atracacao" => ["A", "A", "B", "C"],
            "terminal" => ["T2", "T1", "T1", "T3"],
            "tipo_de_navegacao_da_atracacao" => ["Longo Curso", "Cabotagem", "Longo Curso", "Interior"],
            "ano" => ["2021", "2021", "2020", "2020"],
        )
        .unwrap(),
    );
    curated(
        &store,
        TEMPOS_ATRACACAO,
        df!(
            "idatracacao" => ["1", "2", "3"],
            "tatracado" => ["10", "20", "5"],
            "testadia" => ["12,5", "7,5", "2,5"],
        )
        .unwrap(),
    );
    curated(
        &store,
        CARGA,
        df!(
            "idcarga" => ["10", "11", "12", "13"],
            "idatracacao" => ["1", "1", "3", "2"],
            "cdmercadoria" => ["2601", "1201", "2601", "8703"],
            "natureza_da_carga" => ["Granel Sólido", "Granel Sólido", "Carga Geral", "Carga Geral"],
            "vlpesocargabruta" => ["1000,5", "200", "50", "10,25"],
        )
        .unwrap(),
    );
    curated(
        &store,
        TAXA_OCUPACAO,
        df!(
            "idberco" => ["B1", "B2", "B1", "B3"],
            "anotaxaocupacao" => ["2023", "2023", "2023", "2022"],
            "tempoemminutosdias" => ["100", "250", "200", "9999"],
        )
        .unwrap(),
    );
    store
}

fn strings(df: &DataFrame, name: &str) -> Vec<String> {
    df.column(name)
        .unwrap()
        .str()
        .unwrap()
        .into_iter()
        .map(|v| v.unwrap_or_default().to_string())
        .collect()
}

fn floats(df: &DataFrame, name: &str) -> Vec<f64> {
    df.column(name)
        .unwrap()
        .f64()
        .unwrap()
        .into_iter()
        .map(|v| v.unwrap_or(f64::NAN))
        .collect()
}

fn counts(df: &DataFrame, name: &str) -> Vec<u64> {
    let column = df.column(name).unwrap().cast(&DataType::UInt64).unwrap();
    column.u64().unwrap().into_iter().flatten().collect()
}

#[test]
fn average_berth_time_by_port() {
    let result = AnalyticalQuery::AverageBerthTimeByPort.run(&harbor()).unwrap();

    assert_eq!(strings(&result, "porto_atracacao"), vec!["A", "B"]);
    assert_eq!(floats(&result, "tempo_medio_atracacao"), vec![15.0, 5.0]);
}

#[test]
fn cargo_weight_by_year_joins_attracations() {
    let result = AnalyticalQuery::CargoWeightByYear {
        year_column: "ano".to_string(),
    }
    .run(&harbor())
    .unwrap();

    assert_eq!(strings(&result, "ano"), vec!["2021", "2020"]);
    let totals = floats(&result, "total_carga_movimentada");
    assert!((totals[0] - 1210.75).abs() < 1e-9);
    assert!((totals[1] - 50.0).abs() < 1e-9);
}

#[test]
fn cargo_weight_by_nature() {
    let result = AnalyticalQuery::CargoWeightByNature.run(&harbor()).unwrap();

    assert_eq!(
        strings(&result, "natureza_da_carga"),
        vec!["Granel Sólido", "Carga Geral"]
    );
    let totals = floats(&result, "total_movimentado");
    assert!((totals[0] - 1200.5).abs() < 1e-9);
    assert!((totals[1] - 60.25).abs() < 1e-9);
}

#[test]
fn attracation_counts_break_ties_by_name() {
    let store = harbor();

    let by_terminal = AnalyticalQuery::AttracationsByTerminal.run(&store).unwrap();
    assert_eq!(strings(&by_terminal, "terminal"), vec!["T1", "T2", "T3"]);
    assert_eq!(counts(&by_terminal, "numero_atracacoes"), vec![2, 1, 1]);

    let by_port = AnalyticalQuery::AttracationsByPort.run(&store).unwrap();
    assert_eq!(strings(&by_port, "porto_atracacao"), vec!["A", "B", "C"]);
    assert_eq!(counts(&by_port, "numero_atracacoes"), vec![2, 1, 1]);
}

#[test]
fn merchandise_weight_filters_navigation() {
    let store = harbor();
    let result = AnalyticalQuery::MerchandiseWeightByNavigation {
        navigation: "Longo Curso".to_string(),
    }
    .run(&store)
    .unwrap();

    assert_eq!(strings(&result, "tipo_mercadoria"), vec!["2601", "1201"]);
    let totals = floats(&result, "total_movimentado");
    assert!((totals[0] - 1050.5).abs() < 1e-9);
    assert!((totals[1] - 200.0).abs() < 1e-9);

    let cabotage = AnalyticalQuery::MerchandiseWeightByNavigation {
        navigation: "Cabotagem".to_string(),
    }
    .run(&store)
    .unwrap();
    assert_eq!(strings(&cabotage, "tipo_mercadoria"), vec!["8703"]);
}

#[test]
fn berth_occupancy_returns_the_busiest_berth() {
    let store = harbor();
    let result = AnalyticalQuery::BerthOccupancyForYear { year: 2023 }
        .run(&store)
        .unwrap();

    assert_eq!(result.height(), 1);
    assert_eq!(strings(&result, "idberco"), vec!["B1"]);
    assert_eq!(floats(&result, "total_tempo_ocupacao"), vec![300.0]);

    let other_year = AnalyticalQuery::BerthOccupancyForYear { year: 2022 }
        .run(&store)
        .unwrap();
    assert_eq!(strings(&other_year, "idberco"), vec!["B3"]);
}

#[test]
fn average_stay_by_navigation() {
    let result = AnalyticalQuery::AverageStayByNavigation.run(&harbor()).unwrap();

    // equal averages fall back to name order
    assert_eq!(strings(&result, "tipo_navio"), vec!["Cabotagem", "Longo Curso"]);
    assert_eq!(floats(&result, "tempo_medio_viagem"), vec![7.5, 7.5]);
}

#[test]
fn queries_only_read_the_curated_tier() {
    let store = TierStore::memory();
    store
        .write(
            &TableAddress::new(Tier::Cleaned, ATRACACAO),
            &df!("terminal" => ["T1"]).unwrap(),
        )
        .unwrap();

    let err = AnalyticalQuery::AttracationsByTerminal.run(&store).unwrap_err();
    assert!(matches!(err, PipelineError::TableNotFound(_)));
}

#[test]
fn query_names_round_trip() {
    let all = AnalyticalQuery::all();
    assert_eq!(all.len(), 8);
    for query in &all {
        assert_eq!(&query.name().parse::<AnalyticalQuery>().unwrap(), query);
    }
    assert!("weekly-report".parse::<AnalyticalQuery>().is_err());
}

//! Read-only analytical queries over the curated tier.

use std::fmt;
use std::str::FromStr;

use polars::prelude::*;
use serde::Serialize;

use crate::config::DEFAULT_YEAR_COLUMN;
use crate::error::Result;
use crate::tiers::{TableAddress, Tier, TierStore};

pub const ATRACACAO: &str = "atracacao";
pub const CARGA: &str = "carga";
pub const TEMPOS_ATRACACAO: &str = "temposatracacao";
pub const TAXA_OCUPACAO: &str = "taxaocupacao";

const ID_ATRACACAO: &str = "idatracacao";
const PORTO: &str = "porto_atracacao";
const TERMINAL: &str = "terminal";
const NAVEGACAO: &str = "tipo_de_navegacao_da_atracacao";
const PESO_BRUTO: &str = "vlpesocargabruta";
const NATUREZA: &str = "natureza_da_carga";
const MERCADORIA: &str = "cdmercadoria";
const T_ATRACADO: &str = "tatracado";
const T_ESTADIA: &str = "testadia";
const BERCO: &str = "idberco";
const ANO_OCUPACAO: &str = "anotaxaocupacao";
const TEMPO_OCUPACAO: &str = "tempoemminutosdias";

pub const DEFAULT_NAVIGATION: &str = "Longo Curso";
pub const DEFAULT_OCCUPANCY_YEAR: u16 = 2023;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "query", rename_all = "kebab-case")]
pub enum AnalyticalQuery {
    AverageBerthTimeByPort,
    /// `year_column` is the tag the topic union added to `atracacao`.
    CargoWeightByYear { year_column: String },
    CargoWeightByNature,
    AttracationsByTerminal,
    AttracationsByPort,
    MerchandiseWeightByNavigation { navigation: String },
    BerthOccupancyForYear { year: u16 },
    AverageStayByNavigation,
}

impl AnalyticalQuery {
    pub const NAMES: [&'static str; 8] = [
        "average-berth-time-by-port",
        "cargo-weight-by-year",
        "cargo-weight-by-nature",
        "attracations-by-terminal",
        "attracations-by-port",
        "merchandise-weight-by-navigation",
        "berth-occupancy-for-year",
        "average-stay-by-navigation",
    ];

    /// Every query with its default parameters.
    pub fn all() -> Vec<AnalyticalQuery> {
        Self::NAMES
            .iter()
            .filter_map(|name| name.parse().ok())
            .collect()
    }

    pub fn name(&self) -> &'static str {
        match self {
            AnalyticalQuery::AverageBerthTimeByPort => Self::NAMES[0],
            AnalyticalQuery::CargoWeightByYear { .. } => Self::NAMES[1],
            AnalyticalQuery::CargoWeightByNature => Self::NAMES[2],
            AnalyticalQuery::AttracationsByTerminal => Self::NAMES[3],
            AnalyticalQuery::AttracationsByPort => Self::NAMES[4],
            AnalyticalQuery::MerchandiseWeightByNavigation { .. } => Self::NAMES[5],
            AnalyticalQuery::BerthOccupancyForYear { .. } => Self::NAMES[6],
            AnalyticalQuery::AverageStayByNavigation => Self::NAMES[7],
        }
    }

    pub fn description(&self) -> String {
        match self {
            AnalyticalQuery::AverageBerthTimeByPort => "Average berthed time per port".into(),
            AnalyticalQuery::CargoWeightByYear { .. } => "Gross cargo weight moved per year".into(),
            AnalyticalQuery::CargoWeightByNature => "Gross cargo weight per cargo nature".into(),
            AnalyticalQuery::AttracationsByTerminal => "Attracations per terminal".into(),
            AnalyticalQuery::AttracationsByPort => "Attracations per port".into(),
            AnalyticalQuery::MerchandiseWeightByNavigation { navigation } => {
                format!("Gross weight per merchandise code for '{navigation}' navigation")
            }
            AnalyticalQuery::BerthOccupancyForYear { year } => {
                format!("Berth with the highest occupancy time in {year}")
            }
            AnalyticalQuery::AverageStayByNavigation => {
                "Average stay duration per navigation type".into()
            }
        }
    }

    /// Builds the lazy plan against curated tables in `store`.
    pub fn plan(&self, store: &TierStore) -> Result<LazyFrame> {
        let plan = match self {
            AnalyticalQuery::AverageBerthTimeByPort => {
                let atracacao = curated(store, ATRACACAO)?.select([col(ID_ATRACACAO), col(PORTO)]);
                let tempos = curated(store, TEMPOS_ATRACACAO)?
                    .select([col(ID_ATRACACAO), numeric(T_ATRACADO)])
                    .filter(col(T_ATRACADO).is_not_null());
                let averages = atracacao
                    .join(
                        tempos,
                        [col(ID_ATRACACAO)],
                        [col(ID_ATRACACAO)],
                        JoinArgs::new(JoinType::Inner),
                    )
                    .group_by([col(PORTO)])
                    .agg([col(T_ATRACADO).mean().alias("tempo_medio_atracacao")])
                    .filter(col("tempo_medio_atracacao").is_not_null());
                ranked(averages, "tempo_medio_atracacao", PORTO)
            }
            AnalyticalQuery::CargoWeightByYear { year_column } => {
                let year = year_column.as_str();
                let carga = curated(store, CARGA)?.select([col(ID_ATRACACAO), numeric(PESO_BRUTO)]);
                let atracacao = curated(store, ATRACACAO)?.select([col(ID_ATRACACAO), col(year)]);
                carga
                    .join(
                        atracacao,
                        [col(ID_ATRACACAO)],
                        [col(ID_ATRACACAO)],
                        JoinArgs::new(JoinType::Inner),
                    )
                    .group_by([col(year)])
                    .agg([col(PESO_BRUTO).sum().alias("total_carga_movimentada")])
                    .sort([year], SortMultipleOptions::default().with_order_descending(true))
            }
            AnalyticalQuery::CargoWeightByNature => {
                let totals = curated(store, CARGA)?
                    .select([col(NATUREZA), numeric(PESO_BRUTO)])
                    .group_by([col(NATUREZA)])
                    .agg([col(PESO_BRUTO).sum().alias("total_movimentado")]);
                ranked(totals, "total_movimentado", NATUREZA)
            }
            AnalyticalQuery::AttracationsByTerminal => {
                let counts = curated(store, ATRACACAO)?
                    .group_by([col(TERMINAL)])
                    .agg([len().alias("numero_atracacoes")]);
                ranked(counts, "numero_atracacoes", TERMINAL)
            }
            AnalyticalQuery::AttracationsByPort => {
                let counts = curated(store, ATRACACAO)?
                    .group_by([col(PORTO)])
                    .agg([len().alias("numero_atracacoes")]);
                ranked(counts, "numero_atracacoes", PORTO)
            }
            AnalyticalQuery::MerchandiseWeightByNavigation { navigation } => {
                let carga = curated(store, CARGA)?
                    .select([col(ID_ATRACACAO), col(MERCADORIA), numeric(PESO_BRUTO)]);
                let atracacao = curated(store, ATRACACAO)?
                    .select([col(ID_ATRACACAO), col(NAVEGACAO)])
                    .filter(col(NAVEGACAO).eq(lit(navigation.as_str())));
                let totals = carga
                    .join(
                        atracacao,
                        [col(ID_ATRACACAO)],
                        [col(ID_ATRACACAO)],
                        JoinArgs::new(JoinType::Inner),
                    )
                    .group_by([col(MERCADORIA).alias("tipo_mercadoria")])
                    .agg([col(PESO_BRUTO).sum().alias("total_movimentado")]);
                ranked(totals, "total_movimentado", "tipo_mercadoria")
            }
            AnalyticalQuery::BerthOccupancyForYear { year } => {
                let totals = curated(store, TAXA_OCUPACAO)?
                    .filter(col(ANO_OCUPACAO).eq(lit(year.to_string())))
                    .select([col(BERCO), numeric(TEMPO_OCUPACAO)])
                    .group_by([col(BERCO)])
                    .agg([col(TEMPO_OCUPACAO).sum().alias("total_tempo_ocupacao")]);
                ranked(totals, "total_tempo_ocupacao", BERCO).limit(1)
            }
            AnalyticalQuery::AverageStayByNavigation => {
                let tempos = curated(store, TEMPOS_ATRACACAO)?
                    .select([col(ID_ATRACACAO), numeric(T_ESTADIA)]);
                let atracacao = curated(store, ATRACACAO)?
                    .select([col(ID_ATRACACAO), col(NAVEGACAO)])
                    .filter(col(NAVEGACAO).is_not_null());
                let averages = tempos
                    .join(
                        atracacao,
                        [col(ID_ATRACACAO)],
                        [col(ID_ATRACACAO)],
                        JoinArgs::new(JoinType::Inner),
                    )
                    .group_by([col(NAVEGACAO).alias("tipo_navio")])
                    .agg([col(T_ESTADIA).mean().alias("tempo_medio_viagem")]);
                ranked(averages, "tempo_medio_viagem", "tipo_navio")
            }
        };
        Ok(plan)
    }

    /// Points year-keyed queries at the year tag column a pipeline run used.
    pub fn with_year_column(self, year_column: &str) -> Self {
        match self {
            AnalyticalQuery::CargoWeightByYear { .. } => AnalyticalQuery::CargoWeightByYear {
                year_column: year_column.to_string(),
            },
            other => other,
        }
    }

    pub fn run(&self, store: &TierStore) -> Result<DataFrame> {
        Ok(self.plan(store)?.collect()?)
    }
}

impl fmt::Display for AnalyticalQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AnalyticalQuery {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        let query = match value.trim() {
            "average-berth-time-by-port" => AnalyticalQuery::AverageBerthTimeByPort,
            "cargo-weight-by-year" => AnalyticalQuery::CargoWeightByYear {
                year_column: DEFAULT_YEAR_COLUMN.to_string(),
            },
            "cargo-weight-by-nature" => AnalyticalQuery::CargoWeightByNature,
            "attracations-by-terminal" => AnalyticalQuery::AttracationsByTerminal,
            "attracations-by-port" => AnalyticalQuery::AttracationsByPort,
            "merchandise-weight-by-navigation" => AnalyticalQuery::MerchandiseWeightByNavigation {
                navigation: DEFAULT_NAVIGATION.to_string(),
            },
            "berth-occupancy-for-year" => AnalyticalQuery::BerthOccupancyForYear {
                year: DEFAULT_OCCUPANCY_YEAR,
            },
            "average-stay-by-navigation" => AnalyticalQuery::AverageStayByNavigation,
            other => {
                return Err(format!(
                    "unknown query '{other}', expected one of: {}",
                    Self::NAMES.join(", ")
                ))
            }
        };
        Ok(query)
    }
}

fn curated(store: &TierStore, table: &str) -> Result<LazyFrame> {
    Ok(store.read(&TableAddress::new(Tier::Curated, table))?.lazy())
}

/// Parses a text column holding decimal-comma numbers (`1234,5`) as `f64`.
/// Cells that still fail to parse become null.
fn numeric(name: &str) -> Expr {
    col(name)
        .cast(DataType::String)
        .str()
        .replace_all(lit(","), lit("."), true)
        .cast(DataType::Float64)
        .alias(name)
}

/// Metric descending, ties broken by key ascending.
fn ranked(lf: LazyFrame, metric: &str, key: &str) -> LazyFrame {
    lf.sort(
        [metric, key],
        SortMultipleOptions::default()
            .with_order_descending_multi([true, false])
            .with_nulls_last(true),
    )
}

use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;
use polars::prelude::DataFrame;
use tracing::warn;

use crate::error::{PipelineError, Result};
use crate::registry::TableRegistry;
use crate::report::TableIssue;

/// Lowercase diacritics and ordinal marks mapped to their ASCII letter.
static TRANSLITERATIONS: Lazy<HashMap<char, char>> = Lazy::new(|| {
    [
        ("áàâãäå", 'a'),
        ("éèêë", 'e'),
        ("íìîï", 'i'),
        ("óòôõö", 'o'),
        ("úùûü", 'u'),
        ("ýÿ", 'y'),
        ("ç", 'c'),
        ("ñ", 'n'),
        ("º°", 'o'),
        ("ª", 'a'),
    ]
    .iter()
    .flat_map(|(from, to)| from.chars().map(move |c| (c, *to)))
    .collect()
});

/// Characters removed outright instead of becoming a separator.
const DROPPED: &[char] = &[';', '{', '}', '(', ')', '='];

enum Mapped {
    Keep(char),
    Separator,
    Drop,
}

fn map_char(ch: char) -> Mapped {
    if DROPPED.contains(&ch) || (ch.is_control() && !ch.is_whitespace()) {
        return Mapped::Drop;
    }
    if ch == '\n' || ch == '\t' || ch == '\r' {
        return Mapped::Drop;
    }
    if ch.is_whitespace() || ch == '_' {
        return Mapped::Keep('_');
    }
    let ch = TRANSLITERATIONS.get(&ch).copied().unwrap_or(ch);
    if ch.is_ascii_alphanumeric() {
        Mapped::Keep(ch)
    } else {
        Mapped::Separator
    }
}

/// Rewrites a column identifier into `[a-z0-9_]`, never starting with a digit.
///
/// Whitespace becomes `_`, diacritics are transliterated, `; { } ( ) =` and
/// line breaks are removed, and every other run of symbols collapses into a
/// single `_`. Applying it to its own output returns the input unchanged.
pub fn canonicalize_column_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut in_separator_run = false;

    for ch in name.chars().flat_map(char::to_lowercase) {
        match map_char(ch) {
            Mapped::Drop => {}
            Mapped::Keep(c) => {
                out.push(c);
                in_separator_run = false;
            }
            Mapped::Separator => {
                if !in_separator_run {
                    out.push('_');
                    in_separator_run = true;
                }
            }
        }
    }

    if out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}

/// Renames every column of `df` to its canonical form.
///
/// Fails with [`PipelineError::DuplicateColumn`] when two source columns
/// collapse onto the same canonical name.
pub fn canonicalize_columns(table: &str, df: &DataFrame) -> Result<DataFrame> {
    let renamed: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|name| canonicalize_column_name(name.as_str()))
        .collect();

    let mut seen = HashSet::with_capacity(renamed.len());
    for name in &renamed {
        if !seen.insert(name.as_str()) {
            return Err(PipelineError::DuplicateColumn {
                table: table.to_string(),
                column: name.clone(),
            });
        }
    }

    let mut output = df.clone();
    output.set_column_names(renamed.iter().map(String::as_str))?;
    Ok(output)
}

/// Canonicalizes the columns of every table. Tables that fail are left out
/// and reported.
pub fn normalize_tables(tables: TableRegistry) -> (TableRegistry, Vec<TableIssue>) {
    let mut normalized = TableRegistry::new();
    let mut issues = Vec::new();
    for (name, df) in tables {
        match canonicalize_columns(&name, &df) {
            Ok(renamed) => {
                normalized.insert(name, renamed);
            }
            Err(err) => {
                warn!(table = %name, error = %err, "table excluded from normalization");
                issues.push(TableIssue::new(&name, &err));
            }
        }
    }
    (normalized, issues)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn berth_header_is_canonicalized() {
        assert_eq!(canonicalize_column_name("Berço (m)"), "berco_m");
    }

    #[test]
    fn portuguese_headers() {
        assert_eq!(
            canonicalize_column_name("Tipo de Navegação da Atracação"),
            "tipo_de_navegacao_da_atracacao"
        );
        assert_eq!(canonicalize_column_name("Porto Atracação"), "porto_atracacao");
        assert_eq!(canonicalize_column_name("VLPesoCargaBruta"), "vlpesocargabruta");
        assert_eq!(canonicalize_column_name("Nº do Berço"), "no_do_berco");
        assert_eq!(canonicalize_column_name("AÇÃO"), "acao");
    }

    #[test]
    fn leading_digit_gets_prefix() {
        assert_eq!(canonicalize_column_name("2020Total"), "_2020total");
    }

    #[test]
    fn symbol_runs_collapse() {
        assert_eq!(canonicalize_column_name("peso/carga-bruta"), "peso_carga_bruta");
        assert_eq!(canonicalize_column_name("a--b"), "a_b");
        assert_eq!(canonicalize_column_name("x = {y}"), "x__y");
        assert_eq!(canonicalize_column_name("coluna\tnova\n"), "colunanova");
    }

    #[test]
    fn non_ascii_letters_become_separators() {
        assert_eq!(canonicalize_column_name("straße"), "stra_e");
    }

    #[test]
    fn canonicalization_is_idempotent() {
        let samples = [
            "Berço (m)",
            "2020Total",
            "__já__",
            "peso/carga-bruta",
            "x = {y}",
            "straße",
            "",
            "   ",
            "9",
            "Ÿ-ÿ",
            "ação;;(teste)",
            "–—…€",
        ];
        for sample in samples {
            let once = canonicalize_column_name(sample);
            let twice = canonicalize_column_name(&once);
            assert_eq!(once, twice, "input {sample:?}");
            assert!(
                once.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_'),
                "input {sample:?} produced {once:?}"
            );
        }
    }
}

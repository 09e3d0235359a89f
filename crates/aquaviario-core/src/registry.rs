use std::collections::BTreeMap;

use polars::prelude::DataFrame;

/// Tables of one pipeline stage keyed by name.
///
/// Each stage takes a registry by value and hands a new one to the next stage,
/// so a table is owned by exactly one stage at a time.
#[derive(Debug, Default, Clone)]
pub struct TableRegistry {
    tables: BTreeMap<String, DataFrame>,
}

impl TableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `table`, returning the table previously held under `name`.
    pub fn insert(&mut self, name: impl Into<String>, table: DataFrame) -> Option<DataFrame> {
        self.tables.insert(name.into(), table)
    }

    pub fn get(&self, name: &str) -> Option<&DataFrame> {
        self.tables.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.tables.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &DataFrame)> {
        self.tables.iter().map(|(name, df)| (name.as_str(), df))
    }
}

impl IntoIterator for TableRegistry {
    type Item = (String, DataFrame);
    type IntoIter = std::collections::btree_map::IntoIter<String, DataFrame>;

    fn into_iter(self) -> Self::IntoIter {
        self.tables.into_iter()
    }
}

impl FromIterator<(String, DataFrame)> for TableRegistry {
    fn from_iter<T: IntoIterator<Item = (String, DataFrame)>>(iter: T) -> Self {
        Self {
            tables: iter.into_iter().collect(),
        }
    }
}

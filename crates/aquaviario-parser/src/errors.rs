use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParserError {
    #[error("file did not contain a header row")]
    MissingHeader,

    #[error("header column {index} is empty")]
    EmptyHeaderColumn { index: usize },

    #[error("header column '{column}' appears more than once")]
    DuplicateHeader { column: String },

    #[error("CSV error: {source}")]
    Csv {
        #[source]
        source: csv::Error,
    },

    #[error("data row at line {line} has {found} fields, header has {expected}")]
    RowWidth {
        line: u64,
        expected: usize,
        found: usize,
    },

    #[error("failed to build table: {0}")]
    Frame(#[from] polars::error::PolarsError),
}

impl From<csv::Error> for ParserError {
    fn from(source: csv::Error) -> Self {
        ParserError::Csv { source }
    }
}

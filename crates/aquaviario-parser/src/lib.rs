pub mod delimited;
pub mod errors;
pub mod naming;

pub use delimited::{decode_text, read_delimited, TextEncoding};
pub use errors::ParserError;
pub use naming::{parse_source_name, SourceName};

//! Type-tree parsing and `RowBinaryWithNamesAndTypes` header utilities,
//! shared between the wire codec and anything that wants to reason about
//! ClickHouse column types without pulling in the HTTP client.

pub mod data_types;
pub mod decoders;
pub mod error;
pub mod header;
pub mod leb128;

pub use data_types::{Column, DataTypeNode, DecimalSize};
pub use decoders::{decode_string, encode_string};
pub use error::TypesError;
pub use header::{parse_rbwnat_columns_header, put_rbwnat_columns_header};

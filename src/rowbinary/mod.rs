//! Encodes and decodes [`Value`](crate::value::Value)s against a
//! [`DataTypeNode`] in the `RowBinary` wire format. The same functions back
//! both plain `RowBinary` and `RowBinaryWithNamesAndTypes`, since the two
//! formats only differ in the header that precedes the rows.

pub(crate) use de::{decode_row, decode_value};
pub(crate) use ser::{encode_row, encode_value};

mod de;
mod ser;

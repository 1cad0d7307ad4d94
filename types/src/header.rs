//! Reading and writing the column-name/column-type preamble that precedes
//! the row data in the `RowBinaryWithNamesAndTypes` wire format.

use crate::data_types::{Column, DataTypeNode};
use crate::decoders::{decode_string, encode_string};
use crate::error::TypesError;
use crate::leb128::{decode_leb128, encode_leb128};
use bytes::BufMut;

/// Parses the two-block header (names, then types) from the front of a
/// `RowBinaryWithNamesAndTypes` stream.
///
/// `buffer` is advanced past the header on success; on error it is left in
/// an unspecified position, since callers should not attempt to resume
/// parsing after a malformed header.
pub fn parse_rbwnat_columns_header(buffer: &mut &[u8]) -> Result<Vec<Column>, TypesError> {
    let count = decode_leb128(buffer)? as usize;
    if count == 0 {
        return Err(TypesError::EmptyColumns);
    }
    let mut names = Vec::with_capacity(count);
    for _ in 0..count {
        names.push(decode_string(buffer)?);
    }
    let mut columns = Vec::with_capacity(count);
    for name in names {
        let type_str = decode_string(buffer)?;
        let data_type = DataTypeNode::parse(&type_str)
            .map_err(|e| TypesError::HeaderParsing(format!("column {name:?}: {e}")))?;
        columns.push(Column { name, data_type });
    }
    Ok(columns)
}

/// Writes the header in the same shape `parse_rbwnat_columns_header` reads.
pub fn put_rbwnat_columns_header(
    columns: &[Column],
    buffer: &mut impl BufMut,
) -> Result<(), TypesError> {
    if columns.is_empty() {
        return Err(TypesError::EmptyColumns);
    }
    encode_leb128(columns.len() as u64, buffer);
    for column in columns {
        encode_string(&column.name, buffer);
    }
    for column in columns {
        encode_string(&column.data_type.to_string(), buffer);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_types::DataTypeNode;

    fn sample_columns() -> Vec<Column> {
        vec![
            Column {
                name: "id".to_string(),
                data_type: DataTypeNode::UInt64,
            },
            Column {
                name: "name".to_string(),
                data_type: DataTypeNode::Nullable(Box::new(DataTypeNode::String)),
            },
        ]
    }

    #[test]
    fn round_trips_header() {
        let columns = sample_columns();
        let mut buffer = Vec::new();
        put_rbwnat_columns_header(&columns, &mut buffer).unwrap();
        let parsed = parse_rbwnat_columns_header(&mut buffer.as_slice()).unwrap();
        assert_eq!(parsed, columns);
    }

    #[test]
    fn rejects_empty_columns_on_write() {
        let err = put_rbwnat_columns_header(&[], &mut Vec::new()).unwrap_err();
        assert!(matches!(err, TypesError::EmptyColumns));
    }

    #[test]
    fn rejects_zero_column_count_on_read() {
        let mut buffer: &[u8] = &[0u8];
        let err = parse_rbwnat_columns_header(&mut buffer).unwrap_err();
        assert!(matches!(err, TypesError::EmptyColumns));
    }

    #[test]
    fn surfaces_malformed_type_strings() {
        let mut buffer = Vec::new();
        encode_leb128(1, &mut buffer);
        encode_string("col", &mut buffer);
        encode_string("NotARealType", &mut buffer);
        let err = parse_rbwnat_columns_header(&mut buffer.as_slice()).unwrap_err();
        assert!(matches!(err, TypesError::HeaderParsing(_)));
    }
}

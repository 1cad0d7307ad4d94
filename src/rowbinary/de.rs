use crate::error::{Error, Result};
use crate::value::{DecimalWidth, Value};
use bytes::Buf;
use clickhouse_types::{decode_string, leb128::decode_leb128, Column, DataTypeNode, DecimalSize};

/// Decodes one full row given its column list, advancing `buf` past it.
///
/// Returns `Err(Error::NotEnoughData)` if `buf` does not yet contain a
/// complete row; callers should buffer more bytes and retry from the
/// original (unconsumed) position.
pub(crate) fn decode_row(buf: &mut &[u8], columns: &[Column]) -> Result<Vec<Value>> {
    let mut row = Vec::with_capacity(columns.len());
    for column in columns {
        row.push(decode_value(buf, &column.data_type)?);
    }
    Ok(row)
}

pub(crate) fn decode_value(buf: &mut &[u8], ty: &DataTypeNode) -> Result<Value> {
    Ok(match ty {
        DataTypeNode::Nullable(inner) => {
            ensure(buf, 1)?;
            let is_null = buf.get_u8();
            if is_null != 0 {
                Value::Null
            } else {
                decode_value(buf, inner)?
            }
        }
        DataTypeNode::LowCardinality(inner) => decode_value(buf, inner)?,

        DataTypeNode::Bool => {
            ensure(buf, 1)?;
            Value::Bool(buf.get_u8() != 0)
        }
        DataTypeNode::Int8 => {
            ensure(buf, 1)?;
            Value::Int8(buf.get_i8())
        }
        DataTypeNode::Int16 => {
            ensure(buf, 2)?;
            Value::Int16(buf.get_i16_le())
        }
        DataTypeNode::Int32 => {
            ensure(buf, 4)?;
            Value::Int32(buf.get_i32_le())
        }
        DataTypeNode::Int64 => {
            ensure(buf, 8)?;
            Value::Int64(buf.get_i64_le())
        }
        DataTypeNode::Int128 => {
            ensure(buf, 16)?;
            Value::Int128(buf.get_i128_le())
        }
        DataTypeNode::Int256 => Value::Int256(read_bytes::<32>(buf)?),
        DataTypeNode::UInt8 => {
            ensure(buf, 1)?;
            Value::UInt8(buf.get_u8())
        }
        DataTypeNode::UInt16 => {
            ensure(buf, 2)?;
            Value::UInt16(buf.get_u16_le())
        }
        DataTypeNode::UInt32 => {
            ensure(buf, 4)?;
            Value::UInt32(buf.get_u32_le())
        }
        DataTypeNode::UInt64 => {
            ensure(buf, 8)?;
            Value::UInt64(buf.get_u64_le())
        }
        DataTypeNode::UInt128 => {
            ensure(buf, 16)?;
            Value::UInt128(buf.get_u128_le())
        }
        DataTypeNode::UInt256 => Value::UInt256(read_bytes::<32>(buf)?),

        DataTypeNode::Float32 => {
            ensure(buf, 4)?;
            Value::Float32(buf.get_f32_le())
        }
        DataTypeNode::Float64 => {
            ensure(buf, 8)?;
            Value::Float64(buf.get_f64_le())
        }

        DataTypeNode::Decimal(_, scale, size) => {
            let unscaled = match size {
                DecimalSize::Int32 => {
                    ensure(buf, 4)?;
                    buf.get_i32_le() as i128
                }
                DecimalSize::Int64 => {
                    ensure(buf, 8)?;
                    buf.get_i64_le() as i128
                }
                DecimalSize::Int128 => {
                    ensure(buf, 16)?;
                    buf.get_i128_le()
                }
                DecimalSize::Int256 => {
                    return Err(Error::Protocol(
                        "Decimal256 has no lossless i128 representation".to_string(),
                    ));
                }
            };
            Value::Decimal {
                unscaled,
                scale: *scale,
                size: decimal_width(*size),
            }
        }

        DataTypeNode::String => Value::Str(decode_string(buf).map_err(not_enough_data_or)?),
        DataTypeNode::FixedString(n) => {
            ensure(buf, *n)?;
            let mut bytes = vec![0u8; *n];
            buf.copy_to_slice(&mut bytes);
            Value::FixedBytes(bytes)
        }

        DataTypeNode::Date => {
            ensure(buf, 2)?;
            Value::Date(buf.get_u16_le())
        }
        DataTypeNode::Date32 => {
            ensure(buf, 4)?;
            Value::Date32(buf.get_i32_le())
        }
        DataTypeNode::DateTime(_) => {
            ensure(buf, 4)?;
            Value::DateTime(buf.get_u32_le())
        }
        DataTypeNode::DateTime64(..) => {
            ensure(buf, 8)?;
            Value::DateTime64(buf.get_i64_le())
        }

        DataTypeNode::Uuid => {
            ensure(buf, 16)?;
            Value::Uuid(buf.get_u128_le())
        }
        DataTypeNode::IPv4 => {
            ensure(buf, 4)?;
            Value::Ipv4(buf.get_u32_le())
        }
        DataTypeNode::IPv6 => {
            ensure(buf, 16)?;
            Value::Ipv6(buf.get_u128())
        }

        DataTypeNode::Enum8(_) => {
            ensure(buf, 1)?;
            Value::Enum8(buf.get_i8())
        }
        DataTypeNode::Enum16(_) => {
            ensure(buf, 2)?;
            Value::Enum16(buf.get_i16_le())
        }

        DataTypeNode::Array(inner) => {
            let len = decode_leb128(buf).map_err(not_enough_data_or)? as usize;
            let mut items = Vec::with_capacity(len.min(1 << 20));
            for _ in 0..len {
                items.push(decode_value(buf, inner)?);
            }
            Value::Array(items)
        }
        DataTypeNode::Tuple(elems) => {
            let mut items = Vec::with_capacity(elems.len());
            for (_, ty) in elems {
                items.push(decode_value(buf, ty)?);
            }
            Value::Tuple(items)
        }
        DataTypeNode::Map(key_ty, val_ty) => {
            let len = decode_leb128(buf).map_err(not_enough_data_or)? as usize;
            let mut pairs = Vec::with_capacity(len.min(1 << 20));
            for _ in 0..len {
                let key = decode_value(buf, key_ty)?;
                let value = decode_value(buf, val_ty)?;
                pairs.push((key, value));
            }
            Value::Map(pairs)
        }
        DataTypeNode::Nested(fields) => {
            let mut items = Vec::with_capacity(fields.len());
            for (_, ty) in fields {
                items.push(decode_value(buf, ty)?);
            }
            Value::Tuple(items)
        }

        DataTypeNode::Json | DataTypeNode::Dynamic => {
            let text = decode_string(buf).map_err(not_enough_data_or)?;
            let json =
                serde_json::from_str(&text).unwrap_or(serde_json::Value::String(text));
            Value::Json(json)
        }
    })
}

fn decimal_width(size: DecimalSize) -> DecimalWidth {
    match size {
        DecimalSize::Int32 => DecimalWidth::Bits32,
        DecimalSize::Int64 => DecimalWidth::Bits64,
        DecimalSize::Int128 => DecimalWidth::Bits128,
        DecimalSize::Int256 => DecimalWidth::Bits256,
    }
}

fn read_bytes<const N: usize>(buf: &mut &[u8]) -> Result<[u8; N]> {
    ensure(buf, N)?;
    let mut bytes = [0u8; N];
    buf.copy_to_slice(&mut bytes);
    Ok(bytes)
}

fn ensure(buf: &[u8], n: usize) -> Result<()> {
    if buf.len() < n {
        Err(Error::NotEnoughData)
    } else {
        Ok(())
    }
}

/// `decode_string`/`decode_leb128` distinguish truncated input from other
/// failures only by message text; fold all of their errors into the single
/// `NotEnoughData` signal the row cursor retries on.
fn not_enough_data_or(_err: clickhouse_types::TypesError) -> Error {
    Error::NotEnoughData
}

#[cfg(test)]
mod tests {
    use super::*;
    use clickhouse_types::leb128::encode_leb128;

    #[test]
    fn decodes_fixed_width_scalars() {
        let bytes = 42i32.to_le_bytes();
        let mut slice = &bytes[..];
        assert_eq!(
            decode_value(&mut slice, &DataTypeNode::Int32).unwrap(),
            Value::Int32(42)
        );
    }

    #[test]
    fn decodes_nullable_null() {
        let bytes = [1u8];
        let mut slice = &bytes[..];
        let ty = DataTypeNode::Nullable(Box::new(DataTypeNode::Int32));
        assert_eq!(decode_value(&mut slice, &ty).unwrap(), Value::Null);
    }

    #[test]
    fn decodes_nullable_present() {
        let mut bytes = vec![0u8];
        bytes.extend_from_slice(&7i32.to_le_bytes());
        let mut slice = bytes.as_slice();
        let ty = DataTypeNode::Nullable(Box::new(DataTypeNode::Int32));
        assert_eq!(decode_value(&mut slice, &ty).unwrap(), Value::Int32(7));
    }

    #[test]
    fn reports_not_enough_data_on_truncated_row() {
        let bytes = [1u8, 2u8];
        let mut slice = &bytes[..];
        let err = decode_value(&mut slice, &DataTypeNode::Int32).unwrap_err();
        assert!(matches!(err, Error::NotEnoughData));
    }

    #[test]
    fn decodes_array_of_strings() {
        let mut bytes = Vec::new();
        encode_leb128(2, &mut bytes);
        clickhouse_types::encode_string("a", &mut bytes);
        clickhouse_types::encode_string("bb", &mut bytes);
        let mut slice = bytes.as_slice();
        let ty = DataTypeNode::Array(Box::new(DataTypeNode::String));
        let value = decode_value(&mut slice, &ty).unwrap();
        assert_eq!(
            value,
            Value::Array(vec![Value::Str("a".into()), Value::Str("bb".into())])
        );
    }

    #[test]
    fn decodes_low_cardinality_transparently() {
        let bytes = 9u32.to_le_bytes();
        let mut slice = &bytes[..];
        let ty = DataTypeNode::LowCardinality(Box::new(DataTypeNode::UInt32));
        assert_eq!(decode_value(&mut slice, &ty).unwrap(), Value::UInt32(9));
    }
}

use crate::error::{Error, Result};
use crate::value::{DecimalWidth, Value};
use bytes::BufMut;
use clickhouse_types::{encode_string, leb128::encode_leb128, Column, DataTypeNode, DecimalSize};

/// Encodes one full row against its column list, appending to `buf`.
pub(crate) fn encode_row(row: &[Value], columns: &[Column], buf: &mut impl BufMut) -> Result<()> {
    if row.len() != columns.len() {
        return Err(Error::Protocol(format!(
            "row has {} values but {} columns were declared",
            row.len(),
            columns.len()
        )));
    }
    for (value, column) in row.iter().zip(columns) {
        encode_value(value, &column.data_type, buf).map_err(|e| annotate(e, &column.name))?;
    }
    Ok(())
}

pub(crate) fn encode_value(value: &Value, ty: &DataTypeNode, buf: &mut impl BufMut) -> Result<()> {
    match ty {
        DataTypeNode::Nullable(inner) => match value {
            Value::Null => buf.put_u8(1),
            other => {
                buf.put_u8(0);
                encode_value(other, inner, buf)?;
            }
        },
        DataTypeNode::LowCardinality(inner) => encode_value(value, inner, buf)?,

        DataTypeNode::Bool => buf.put_u8(expect_bool(value, ty)? as u8),
        DataTypeNode::Int8 => buf.put_i8(expect_i64(value, ty)? as i8),
        DataTypeNode::Int16 => buf.put_i16_le(expect_i64(value, ty)? as i16),
        DataTypeNode::Int32 => buf.put_i32_le(expect_i64(value, ty)? as i32),
        DataTypeNode::Int64 => buf.put_i64_le(expect_i64(value, ty)?),
        DataTypeNode::Int128 => buf.put_i128_le(expect_i128(value, ty)?),
        DataTypeNode::Int256 => buf.put_slice(&expect_bytes32(value, ty)?),
        DataTypeNode::UInt8 => buf.put_u8(expect_u64(value, ty)? as u8),
        DataTypeNode::UInt16 => buf.put_u16_le(expect_u64(value, ty)? as u16),
        DataTypeNode::UInt32 => buf.put_u32_le(expect_u64(value, ty)? as u32),
        DataTypeNode::UInt64 => buf.put_u64_le(expect_u64(value, ty)?),
        DataTypeNode::UInt128 => buf.put_u128_le(expect_u128(value, ty)?),
        DataTypeNode::UInt256 => buf.put_slice(&expect_bytes32(value, ty)?),

        DataTypeNode::Float32 => buf.put_f32_le(match value {
            Value::Float32(v) => *v,
            other => return mismatch(other, ty),
        }),
        DataTypeNode::Float64 => buf.put_f64_le(match value {
            Value::Float64(v) => *v,
            Value::Float32(v) => *v as f64,
            other => return mismatch(other, ty),
        }),

        DataTypeNode::Decimal(_, _, size) => match value {
            Value::Decimal { unscaled, .. } => match size {
                DecimalSize::Int32 => buf.put_i32_le(*unscaled as i32),
                DecimalSize::Int64 => buf.put_i64_le(*unscaled as i64),
                DecimalSize::Int128 => buf.put_i128_le(*unscaled),
                DecimalSize::Int256 => {
                    return Err(Error::Protocol(
                        "Decimal256 has no lossless i128 representation".to_string(),
                    ))
                }
            },
            other => return mismatch(other, ty),
        },

        DataTypeNode::String => match value {
            Value::Str(s) => encode_string(s, buf),
            other => return mismatch(other, ty),
        },
        DataTypeNode::FixedString(n) => match value {
            Value::FixedBytes(bytes) => {
                if bytes.len() > *n {
                    return out_of_range(bytes.len(), *n);
                }
                buf.put_slice(bytes);
                buf.put_bytes(0, n - bytes.len());
            }
            Value::Str(s) => {
                if s.len() > *n {
                    return out_of_range(s.len(), *n);
                }
                buf.put_slice(s.as_bytes());
                buf.put_bytes(0, n - s.len());
            }
            other => return mismatch(other, ty),
        },

        DataTypeNode::Date => match value {
            Value::Date(v) => buf.put_u16_le(*v),
            other => return mismatch(other, ty),
        },
        DataTypeNode::Date32 => match value {
            Value::Date32(v) => buf.put_i32_le(*v),
            other => return mismatch(other, ty),
        },
        DataTypeNode::DateTime(_) => match value {
            Value::DateTime(v) => buf.put_u32_le(*v),
            other => return mismatch(other, ty),
        },
        DataTypeNode::DateTime64(..) => match value {
            Value::DateTime64(v) => buf.put_i64_le(*v),
            other => return mismatch(other, ty),
        },

        DataTypeNode::Uuid => match value {
            Value::Uuid(v) => buf.put_u128_le(*v),
            other => return mismatch(other, ty),
        },
        DataTypeNode::IPv4 => match value {
            Value::Ipv4(v) => buf.put_u32_le(*v),
            other => return mismatch(other, ty),
        },
        DataTypeNode::IPv6 => match value {
            Value::Ipv6(v) => buf.put_u128(*v),
            other => return mismatch(other, ty),
        },

        DataTypeNode::Enum8(_) => match value {
            Value::Enum8(v) => buf.put_i8(*v),
            other => return mismatch(other, ty),
        },
        DataTypeNode::Enum16(_) => match value {
            Value::Enum16(v) => buf.put_i16_le(*v),
            other => return mismatch(other, ty),
        },

        DataTypeNode::Array(inner) => match value {
            Value::Array(items) => {
                encode_leb128(items.len() as u64, buf);
                for item in items {
                    encode_value(item, inner, buf)?;
                }
            }
            other => return mismatch(other, ty),
        },
        DataTypeNode::Tuple(elems) => match value {
            Value::Tuple(items) if items.len() == elems.len() => {
                for (item, (_, ty)) in items.iter().zip(elems) {
                    encode_value(item, ty, buf)?;
                }
            }
            other => return mismatch(other, ty),
        },
        DataTypeNode::Map(key_ty, val_ty) => match value {
            Value::Map(pairs) => {
                encode_leb128(pairs.len() as u64, buf);
                for (key, value) in pairs {
                    encode_value(key, key_ty, buf)?;
                    encode_value(value, val_ty, buf)?;
                }
            }
            other => return mismatch(other, ty),
        },
        DataTypeNode::Nested(fields) => match value {
            Value::Tuple(items) if items.len() == fields.len() => {
                for (item, (_, ty)) in items.iter().zip(fields) {
                    encode_value(item, ty, buf)?;
                }
            }
            other => return mismatch(other, ty),
        },

        DataTypeNode::Json | DataTypeNode::Dynamic => match value {
            Value::Json(v) => encode_string(&v.to_string(), buf),
            Value::Str(s) => encode_string(s, buf),
            other => return mismatch(other, ty),
        },
    }
    Ok(())
}

fn expect_bool(value: &Value, ty: &DataTypeNode) -> Result<bool> {
    match value {
        Value::Bool(v) => Ok(*v),
        other => mismatch(other, ty),
    }
}

fn expect_i64(value: &Value, ty: &DataTypeNode) -> Result<i64> {
    value.as_i64().ok_or(()).or_else(|_| mismatch(value, ty))
}

fn expect_u64(value: &Value, ty: &DataTypeNode) -> Result<u64> {
    match *value {
        Value::UInt8(v) => Ok(v as u64),
        Value::UInt16(v) => Ok(v as u64),
        Value::UInt32(v) => Ok(v as u64),
        Value::UInt64(v) => Ok(v),
        _ => mismatch(value, ty),
    }
}

fn expect_i128(value: &Value, ty: &DataTypeNode) -> Result<i128> {
    match value {
        Value::Int128(v) => Ok(*v),
        other => mismatch(other, ty),
    }
}

fn expect_u128(value: &Value, ty: &DataTypeNode) -> Result<u128> {
    match value {
        Value::UInt128(v) => Ok(*v),
        other => mismatch(other, ty),
    }
}

fn expect_bytes32(value: &Value, ty: &DataTypeNode) -> Result<[u8; 32]> {
    match value {
        Value::Int256(b) | Value::UInt256(b) => Ok(*b),
        other => mismatch(other, ty),
    }
}

fn mismatch<T>(value: &Value, ty: &DataTypeNode) -> Result<T> {
    Err(Error::TypeMismatch {
        column: String::new(),
        expected: value.kind_name(),
        actual: ty.to_string(),
    })
}

fn out_of_range<T>(len: usize, n: usize) -> Result<T> {
    Err(Error::OutOfRange {
        column: String::new(),
        message: format!("value of {len} bytes does not fit in FixedString({n})"),
    })
}

fn annotate(err: Error, column: &str) -> Error {
    match err {
        Error::TypeMismatch {
            expected, actual, ..
        } => Error::TypeMismatch {
            column: column.to_string(),
            expected,
            actual,
        },
        Error::OutOfRange { message, .. } => Error::OutOfRange {
            column: column.to_string(),
            message,
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_fixed_width_scalars() {
        let mut buf = Vec::new();
        encode_value(&Value::Int32(42), &DataTypeNode::Int32, &mut buf).unwrap();
        assert_eq!(buf, 42i32.to_le_bytes());
    }

    #[test]
    fn encodes_nullable_null() {
        let mut buf = Vec::new();
        let ty = DataTypeNode::Nullable(Box::new(DataTypeNode::Int32));
        encode_value(&Value::Null, &ty, &mut buf).unwrap();
        assert_eq!(buf, vec![1]);
    }

    #[test]
    fn round_trips_through_decode() {
        use crate::rowbinary::decode_value;

        let ty = DataTypeNode::Array(Box::new(DataTypeNode::Nullable(Box::new(
            DataTypeNode::String,
        ))));
        let value = Value::Array(vec![Value::Str("a".into()), Value::Null]);
        let mut buf = Vec::new();
        encode_value(&value, &ty, &mut buf).unwrap();
        let mut slice = buf.as_slice();
        assert_eq!(decode_value(&mut slice, &ty).unwrap(), value);
        assert!(slice.is_empty());
    }

    #[test]
    fn rejects_type_mismatch_with_column_name() {
        let columns = vec![Column {
            name: "n".to_string(),
            data_type: DataTypeNode::Int32,
        }];
        let err = encode_row(&[Value::Str("oops".into())], &columns, &mut Vec::new()).unwrap_err();
        match err {
            Error::TypeMismatch { column, .. } => assert_eq!(column, "n"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn zero_pads_a_short_fixed_string() {
        let mut buf = Vec::new();
        let value = Value::FixedBytes(vec![b'a', b'b']);
        encode_value(&value, &DataTypeNode::FixedString(4), &mut buf).unwrap();
        assert_eq!(buf, vec![b'a', b'b', 0, 0]);
    }

    #[test]
    fn rejects_an_over_length_fixed_string_as_out_of_range() {
        let columns = vec![Column {
            name: "n".to_string(),
            data_type: DataTypeNode::FixedString(2),
        }];
        let value = Value::FixedBytes(vec![b'a', b'b', b'c']);
        let err = encode_row(&[value], &columns, &mut Vec::new()).unwrap_err();
        match err {
            Error::OutOfRange { column, .. } => assert_eq!(column, "n"),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}

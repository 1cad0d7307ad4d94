//! Renders a bound [`Value`](crate::value::Value) as the SQL literal text
//! ClickHouse expects for a given declared parameter type.

use crate::error::{Error, Result};
use crate::sql::escape;
use crate::value::Value;
use clickhouse_types::DataTypeNode;
use std::fmt::Write;
use std::net::{Ipv4Addr, Ipv6Addr};

/// Renders `value` as a literal suitable for the declared `ty`, appending it to `out`.
pub(crate) fn render_literal(value: &Value, ty: &DataTypeNode, out: &mut String) -> Result<()> {
    if matches!(value, Value::Null) {
        if matches!(ty, DataTypeNode::Nullable(_)) {
            out.push_str("NULL");
            return Ok(());
        }
        return Err(Error::TypeMismatch {
            column: String::new(),
            expected: "non-null value",
            actual: ty.to_string(),
        });
    }

    match ty {
        DataTypeNode::Nullable(inner) => render_literal(value, inner, out),
        DataTypeNode::LowCardinality(inner) => render_literal(value, inner, out),
        DataTypeNode::Bool => match value {
            Value::Bool(b) => {
                out.push_str(if *b { "true" } else { "false" });
                Ok(())
            }
            other => type_mismatch(other, ty),
        },
        DataTypeNode::Int8
        | DataTypeNode::Int16
        | DataTypeNode::Int32
        | DataTypeNode::Int64
        | DataTypeNode::Int128
        | DataTypeNode::UInt8
        | DataTypeNode::UInt16
        | DataTypeNode::UInt32
        | DataTypeNode::UInt64
        | DataTypeNode::UInt128 => match value.as_i64() {
            Some(v) => {
                write!(out, "{v}").unwrap();
                Ok(())
            }
            None => render_big_int(value, ty, out),
        },
        DataTypeNode::Int256 | DataTypeNode::UInt256 => render_big_int(value, ty, out),
        DataTypeNode::Float32 => match value {
            Value::Float32(v) => {
                write!(out, "{v}").unwrap();
                Ok(())
            }
            other => type_mismatch(other, ty),
        },
        DataTypeNode::Float64 => match value {
            Value::Float64(v) => {
                write!(out, "{v}").unwrap();
                Ok(())
            }
            Value::Float32(v) => {
                write!(out, "{v}").unwrap();
                Ok(())
            }
            other => type_mismatch(other, ty),
        },
        DataTypeNode::Decimal(_, scale, _) => match value {
            Value::Decimal { unscaled, .. } => {
                write_decimal(*unscaled, *scale, out);
                Ok(())
            }
            other => type_mismatch(other, ty),
        },
        DataTypeNode::String | DataTypeNode::FixedString(_) => match value {
            Value::Str(s) => escape::string(s, out).map_err(|_| fmt_err()),
            Value::FixedBytes(b) => {
                escape::string(&String::from_utf8_lossy(b), out).map_err(|_| fmt_err())
            }
            other => type_mismatch(other, ty),
        },
        DataTypeNode::Date | DataTypeNode::Date32 => match value {
            Value::Date(_) | Value::Date32(_) | Value::Str(_) => {
                render_as_quoted_display(value, out)
            }
            other => type_mismatch(other, ty),
        },
        DataTypeNode::DateTime(_) | DataTypeNode::DateTime64(..) => match value {
            Value::DateTime(_) | Value::DateTime64(_) | Value::Str(_) => {
                render_as_quoted_display(value, out)
            }
            other => type_mismatch(other, ty),
        },
        DataTypeNode::Uuid => match value {
            Value::Uuid(_) | Value::Str(_) => render_as_quoted_display(value, out),
            other => type_mismatch(other, ty),
        },
        DataTypeNode::IPv4 | DataTypeNode::IPv6 => match value {
            Value::Ipv4(_) | Value::Ipv6(_) | Value::Str(_) => render_as_quoted_display(value, out),
            other => type_mismatch(other, ty),
        },
        DataTypeNode::Enum8(_) | DataTypeNode::Enum16(_) => match value {
            Value::Str(s) => escape::string(s, out).map_err(|_| fmt_err()),
            Value::Enum8(v) => {
                write!(out, "{v}").unwrap();
                Ok(())
            }
            Value::Enum16(v) => {
                write!(out, "{v}").unwrap();
                Ok(())
            }
            other => type_mismatch(other, ty),
        },
        DataTypeNode::Array(inner) => match value {
            Value::Array(items) => {
                out.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    render_literal(item, inner, out)?;
                }
                out.push(']');
                Ok(())
            }
            other => type_mismatch(other, ty),
        },
        DataTypeNode::Tuple(elems) => match value {
            Value::Tuple(items) if items.len() == elems.len() => {
                out.push('(');
                for (i, (item, (_, ty))) in items.iter().zip(elems).enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    render_literal(item, ty, out)?;
                }
                out.push(')');
                Ok(())
            }
            other => type_mismatch(other, ty),
        },
        DataTypeNode::Map(key_ty, val_ty) => match value {
            Value::Map(pairs) => {
                out.push('{');
                for (i, (k, v)) in pairs.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    render_literal(k, key_ty, out)?;
                    out.push(':');
                    render_literal(v, val_ty, out)?;
                }
                out.push('}');
                Ok(())
            }
            other => type_mismatch(other, ty),
        },
        DataTypeNode::Json | DataTypeNode::Dynamic => match value {
            Value::Json(v) => escape::string(&v.to_string(), out).map_err(|_| fmt_err()),
            Value::Str(s) => escape::string(s, out).map_err(|_| fmt_err()),
            other => type_mismatch(other, ty),
        },
        DataTypeNode::Nested(_) => Err(Error::Protocol(
            "Nested columns cannot be bound as query parameters".to_string(),
        )),
    }
}

fn render_as_quoted_display(value: &Value, out: &mut String) -> Result<()> {
    out.push('\'');
    match value {
        Value::Str(s) => escape_into(s, out),
        Value::Date(days) => write!(out, "{days}").unwrap(),
        Value::Date32(days) => write!(out, "{days}").unwrap(),
        Value::DateTime(secs) => write!(out, "{secs}").unwrap(),
        Value::DateTime64(ticks) => write!(out, "{ticks}").unwrap(),
        Value::Uuid(v) => write!(out, "{}", uuid::Uuid::from_u128(*v)).unwrap(),
        Value::Ipv4(v) => write!(out, "{}", Ipv4Addr::from(*v)).unwrap(),
        Value::Ipv6(v) => write!(out, "{}", Ipv6Addr::from(*v)).unwrap(),
        _ => unreachable!("checked by caller"),
    }
    out.push('\'');
    Ok(())
}

fn escape_into(s: &str, out: &mut String) {
    for ch in s.chars() {
        match ch {
            '\\' | '\'' => {
                out.push('\\');
                out.push(ch);
            }
            ch => out.push(ch),
        }
    }
}

fn render_big_int(value: &Value, ty: &DataTypeNode, out: &mut String) -> Result<()> {
    match value {
        Value::Int128(v) => {
            write!(out, "{v}").unwrap();
            Ok(())
        }
        Value::UInt128(v) => {
            write!(out, "{v}").unwrap();
            Ok(())
        }
        Value::Int256(bytes) => {
            write_le_bytes_as_decimal(bytes, true, out);
            Ok(())
        }
        Value::UInt256(bytes) => {
            write_le_bytes_as_decimal(bytes, false, out);
            Ok(())
        }
        other => type_mismatch(other, ty),
    }
}

/// Renders an opaque little-endian 32-byte integer as a decimal string,
/// since there is no native 256-bit arithmetic type to format with.
fn write_le_bytes_as_decimal(bytes: &[u8; 32], signed: bool, out: &mut String) {
    let negative = signed && bytes[31] & 0x80 != 0;
    let digits = if negative {
        let mut twos = *bytes;
        let mut carry = 1u16;
        for byte in twos.iter_mut() {
            let inverted = !*byte as u16 + carry;
            *byte = inverted as u8;
            carry = inverted >> 8;
        }
        twos
    } else {
        *bytes
    };

    let mut decimal = vec![0u8];
    for &byte in digits.iter().rev() {
        let mut carry = byte as u32;
        for d in decimal.iter_mut() {
            let v = *d as u32 * 256 + carry;
            *d = (v % 10) as u8;
            carry = v / 10;
        }
        while carry > 0 {
            decimal.push((carry % 10) as u8);
            carry /= 10;
        }
    }

    if negative {
        out.push('-');
    }
    for d in decimal.iter().rev() {
        out.push((b'0' + d) as char);
    }
}

fn write_decimal(unscaled: i128, scale: usize, out: &mut String) {
    let negative = unscaled < 0;
    let magnitude = unscaled.unsigned_abs();
    let s = magnitude.to_string();
    if negative {
        out.push('-');
    }
    if scale == 0 {
        out.push_str(&s);
        return;
    }
    if s.len() <= scale {
        out.push_str("0.");
        for _ in 0..(scale - s.len()) {
            out.push('0');
        }
        out.push_str(&s);
    } else {
        let split = s.len() - scale;
        out.push_str(&s[..split]);
        out.push('.');
        out.push_str(&s[split..]);
    }
}

fn type_mismatch<T>(value: &Value, ty: &DataTypeNode) -> Result<T> {
    Err(Error::TypeMismatch {
        column: String::new(),
        expected: value.kind_name(),
        actual: ty.to_string(),
    })
}

fn fmt_err() -> Error {
    Error::Other("formatting a SQL literal failed".into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(value: Value, ty: &str) -> String {
        let mut out = String::new();
        render_literal(&value, &DataTypeNode::parse(ty).unwrap(), &mut out).unwrap();
        out
    }

    #[test]
    fn renders_integers() {
        assert_eq!(render(Value::Int32(-5), "Int32"), "-5");
        assert_eq!(render(Value::UInt64(42), "UInt64"), "42");
    }

    #[test]
    fn renders_strings_escaped() {
        assert_eq!(render(Value::Str("a'b".into()), "String"), r"'a\'b'");
    }

    #[test]
    fn renders_null_for_nullable() {
        assert_eq!(render(Value::Null, "Nullable(Int32)"), "NULL");
    }

    #[test]
    fn rejects_null_for_non_nullable() {
        let mut out = String::new();
        let err = render_literal(&Value::Null, &DataTypeNode::parse("Int32").unwrap(), &mut out);
        assert!(err.is_err());
    }

    #[test]
    fn renders_decimal_with_leading_zero_padding() {
        assert_eq!(
            render(
                Value::Decimal {
                    unscaled: 5,
                    scale: 4,
                    size: crate::value::DecimalWidth::Bits32
                },
                "Decimal(9, 4)"
            ),
            "0.0005"
        );
    }

    #[test]
    fn renders_array_elements() {
        assert_eq!(
            render(
                Value::Array(vec![Value::Int32(1), Value::Int32(2)]),
                "Array(Int32)"
            ),
            "[1,2]"
        );
    }

    #[test]
    fn renders_negative_int256_as_decimal_text() {
        let minus_one = [0xFFu8; 32];
        assert_eq!(render(Value::Int256(minus_one), "Int256"), "-1");
    }

    #[test]
    fn renders_uuid_in_canonical_dashed_form() {
        let v = 0x00112233445566778899aabbccddeeffu128;
        assert_eq!(
            render(Value::Uuid(v), "UUID"),
            "'00112233-4455-6677-8899-aabbccddeeff'"
        );
    }

    #[test]
    fn renders_ipv4_as_dotted_quad() {
        assert_eq!(render(Value::Ipv4(0x01020304), "IPv4"), "'1.2.3.4'");
    }

    #[test]
    fn renders_ipv6_in_canonical_form() {
        assert_eq!(render(Value::Ipv6(1u128), "IPv6"), "'::1'");
    }
}

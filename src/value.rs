//! The dynamic value representation used to move rows between the
//! application and the wire codec without a derive macro or a `serde`
//! round trip.
//!
//! Each variant corresponds to one or more ClickHouse wire types; the
//! mapping from [`DataTypeNode`](clickhouse_types::DataTypeNode) to the
//! variant that can hold it lives in `rowbinary::ser`/`rowbinary::de`.

use std::collections::BTreeMap;

/// A single decoded or to-be-encoded column value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),

    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Int128(i128),
    /// Little-endian two's-complement bytes, exactly 32 long.
    Int256([u8; 32]),

    UInt8(u8),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
    UInt128(u128),
    /// Little-endian bytes, exactly 32 long.
    UInt256([u8; 32]),

    Float32(f32),
    Float64(f64),

    /// An unscaled integer plus its declared scale and storage width.
    /// The width must agree with the column's `Decimal(P, S)` storage class.
    Decimal {
        unscaled: i128,
        scale: usize,
        size: DecimalWidth,
    },

    Str(String),
    /// A `FixedString(N)` value; always exactly N bytes.
    FixedBytes(Vec<u8>),

    /// Days since the Unix epoch.
    Date(u16),
    /// Days since the Unix epoch, signed (`Date32`).
    Date32(i32),
    /// Seconds since the Unix epoch.
    DateTime(u32),
    /// Ticks since the Unix epoch at the column's declared precision.
    DateTime64(i64),

    Uuid(u128),
    Ipv4(u32),
    Ipv6(u128),

    /// The enum's integer discriminant, not its label.
    Enum8(i8),
    Enum16(i16),

    Array(Vec<Value>),
    Tuple(Vec<Value>),
    Map(Vec<(Value, Value)>),

    /// Opaque JSON payload for the `JSON` or `Dynamic` types.
    Json(serde_json::Value),
}

/// The storage width of a `Decimal` value, independent of [`clickhouse_types::DecimalSize`]
/// so that `value.rs` does not need to depend on the types crate for a simple enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecimalWidth {
    Bits32,
    Bits64,
    Bits128,
    Bits256,
}

impl Value {
    /// A human-readable name for the value's kind, used in mismatch error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "Null",
            Value::Bool(_) => "Bool",
            Value::Int8(_) => "Int8",
            Value::Int16(_) => "Int16",
            Value::Int32(_) => "Int32",
            Value::Int64(_) => "Int64",
            Value::Int128(_) => "Int128",
            Value::Int256(_) => "Int256",
            Value::UInt8(_) => "UInt8",
            Value::UInt16(_) => "UInt16",
            Value::UInt32(_) => "UInt32",
            Value::UInt64(_) => "UInt64",
            Value::UInt128(_) => "UInt128",
            Value::UInt256(_) => "UInt256",
            Value::Float32(_) => "Float32",
            Value::Float64(_) => "Float64",
            Value::Decimal { .. } => "Decimal",
            Value::Str(_) => "String",
            Value::FixedBytes(_) => "FixedString",
            Value::Date(_) => "Date",
            Value::Date32(_) => "Date32",
            Value::DateTime(_) => "DateTime",
            Value::DateTime64(_) => "DateTime64",
            Value::Uuid(_) => "UUID",
            Value::Ipv4(_) => "IPv4",
            Value::Ipv6(_) => "IPv6",
            Value::Enum8(_) => "Enum8",
            Value::Enum16(_) => "Enum16",
            Value::Array(_) => "Array",
            Value::Tuple(_) => "Tuple",
            Value::Map(_) => "Map",
            Value::Json(_) => "JSON",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Value::Int8(v) => Some(v as i64),
            Value::Int16(v) => Some(v as i64),
            Value::Int32(v) => Some(v as i64),
            Value::Int64(v) => Some(v),
            Value::UInt8(v) => Some(v as i64),
            Value::UInt16(v) => Some(v as i64),
            Value::UInt32(v) => Some(v as i64),
            Value::Enum8(v) => Some(v as i64),
            Value::Enum16(v) => Some(v as i64),
            _ => None,
        }
    }
}

/// A fully materialized row: one [`Value`] per selected column, in column order.
pub type Row = Vec<Value>;

/// A named bag of query parameters bound for `{name:Type}` placeholders.
///
/// Preserves insertion order for deterministic error messages, but is
/// addressed by name, so a `BTreeMap` (rather than a positional `Vec`) backs it.
#[derive(Debug, Clone, Default)]
pub struct Params(pub(crate) BTreeMap<String, Value>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }
}

macro_rules! impl_from_for_value {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v)
                }
            }
        )*
    };
}

impl_from_for_value! {
    bool => Bool,
    i8 => Int8,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    i128 => Int128,
    u8 => UInt8,
    u16 => UInt16,
    u32 => UInt32,
    u64 => UInt64,
    u128 => UInt128,
    f32 => Float32,
    f64 => Float64,
    String => Str,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_owned())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_bind_overwrites_duplicate_names() {
        let params = Params::new().bind("a", 1i32).bind("a", 2i32);
        assert_eq!(params.get("a"), Some(&Value::Int32(2)));
    }

    #[test]
    fn option_none_becomes_null() {
        let v: Value = Option::<i32>::None.into();
        assert_eq!(v, Value::Null);
    }

    #[test]
    fn kind_name_is_stable_for_error_messages() {
        assert_eq!(Value::UInt64(1).kind_name(), "UInt64");
        assert_eq!(Value::Null.kind_name(), "Null");
    }
}

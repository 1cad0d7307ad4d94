//! The type tree: parsing ClickHouse type expressions and printing them back
//! into the exact textual form the server expects in a
//! `RowBinaryWithNamesAndTypes` header.

use crate::error::TypesError;
use std::fmt;

/// The storage width backing a `Decimal(P, S)` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecimalSize {
    Int32,
    Int64,
    Int128,
    Int256,
}

impl DecimalSize {
    pub fn new(precision: usize) -> Result<Self, TypesError> {
        match precision {
            0 => Err(TypesError::InvalidDecimalPrecision(precision)),
            1..=9 => Ok(Self::Int32),
            10..=18 => Ok(Self::Int64),
            19..=38 => Ok(Self::Int128),
            39..=76 => Ok(Self::Int256),
            _ => Err(TypesError::InvalidDecimalPrecision(precision)),
        }
    }

    pub fn width_bytes(self) -> usize {
        match self {
            Self::Int32 => 4,
            Self::Int64 => 8,
            Self::Int128 => 16,
            Self::Int256 => 32,
        }
    }

    /// The maximum precision representable without overflowing the "natural"
    /// width class, used to back-fill `DecimalNN(scale)` single-argument forms.
    fn max_precision_for_width(self) -> usize {
        match self {
            Self::Int32 => 9,
            Self::Int64 => 18,
            Self::Int128 => 38,
            Self::Int256 => 76,
        }
    }
}

/// A single parsed ClickHouse type expression.
#[derive(Debug, Clone, PartialEq)]
pub enum DataTypeNode {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    Int128,
    Int256,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    UInt128,
    UInt256,
    Float32,
    Float64,
    String,
    FixedString(usize),
    Date,
    Date32,
    DateTime(Option<String>),
    DateTime64(u8, Option<String>),
    Uuid,
    IPv4,
    IPv6,
    Enum8(Vec<(String, i8)>),
    Enum16(Vec<(String, i16)>),
    Decimal(usize, usize, DecimalSize),
    Nullable(Box<DataTypeNode>),
    LowCardinality(Box<DataTypeNode>),
    Array(Box<DataTypeNode>),
    Tuple(Vec<(Option<String>, DataTypeNode)>),
    Map(Box<DataTypeNode>, Box<DataTypeNode>),
    Nested(Vec<(String, DataTypeNode)>),
    Json,
    Dynamic,
}

impl DataTypeNode {
    /// Parses a single type expression, requiring the whole input to be consumed.
    pub fn parse(input: &str) -> Result<Self, TypesError> {
        let mut parser = Parser { input, pos: 0 };
        parser.skip_ws();
        let node = parser.parse_type()?;
        parser.skip_ws();
        if parser.pos != input.len() {
            return Err(TypesError::parse(input, parser.pos, "end of input"));
        }
        Ok(node)
    }
}

impl fmt::Display for DataTypeNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool => write!(f, "Bool"),
            Self::Int8 => write!(f, "Int8"),
            Self::Int16 => write!(f, "Int16"),
            Self::Int32 => write!(f, "Int32"),
            Self::Int64 => write!(f, "Int64"),
            Self::Int128 => write!(f, "Int128"),
            Self::Int256 => write!(f, "Int256"),
            Self::UInt8 => write!(f, "UInt8"),
            Self::UInt16 => write!(f, "UInt16"),
            Self::UInt32 => write!(f, "UInt32"),
            Self::UInt64 => write!(f, "UInt64"),
            Self::UInt128 => write!(f, "UInt128"),
            Self::UInt256 => write!(f, "UInt256"),
            Self::Float32 => write!(f, "Float32"),
            Self::Float64 => write!(f, "Float64"),
            Self::String => write!(f, "String"),
            Self::FixedString(n) => write!(f, "FixedString({n})"),
            Self::Date => write!(f, "Date"),
            Self::Date32 => write!(f, "Date32"),
            Self::DateTime(None) => write!(f, "DateTime"),
            Self::DateTime(Some(tz)) => write!(f, "DateTime('{tz}')"),
            Self::DateTime64(p, None) => write!(f, "DateTime64({p})"),
            Self::DateTime64(p, Some(tz)) => write!(f, "DateTime64({p}, '{tz}')"),
            Self::Uuid => write!(f, "UUID"),
            Self::IPv4 => write!(f, "IPv4"),
            Self::IPv6 => write!(f, "IPv6"),
            Self::Enum8(values) => {
                write!(f, "Enum8(")?;
                write_enum_values(f, values)?;
                write!(f, ")")
            }
            Self::Enum16(values) => {
                write!(f, "Enum16(")?;
                write_enum_values(f, values)?;
                write!(f, ")")
            }
            Self::Decimal(p, s, _) => write!(f, "Decimal({p}, {s})"),
            Self::Nullable(inner) => write!(f, "Nullable({inner})"),
            Self::LowCardinality(inner) => write!(f, "LowCardinality({inner})"),
            Self::Array(inner) => write!(f, "Array({inner})"),
            Self::Tuple(elems) => {
                write!(f, "Tuple(")?;
                for (i, (name, ty)) in elems.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    match name {
                        Some(name) => write!(f, "{name} {ty}")?,
                        None => write!(f, "{ty}")?,
                    }
                }
                write!(f, ")")
            }
            Self::Map(k, v) => write!(f, "Map({k}, {v})"),
            Self::Nested(fields) => {
                write!(f, "Nested(")?;
                for (i, (name, ty)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{name} {ty}")?;
                }
                write!(f, ")")
            }
            Self::Json => write!(f, "JSON"),
            Self::Dynamic => write!(f, "Dynamic"),
        }
    }
}

fn write_enum_values<T: fmt::Display>(
    f: &mut fmt::Formatter<'_>,
    values: &[(String, T)],
) -> fmt::Result {
    for (i, (name, value)) in values.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "'")?;
        escape_enum_name(f, name)?;
        write!(f, "' = {value}")?;
    }
    Ok(())
}

fn escape_enum_name(f: &mut fmt::Formatter<'_>, name: &str) -> fmt::Result {
    for ch in name.chars() {
        if ch == '\'' {
            write!(f, "''")?;
        } else {
            write!(f, "{ch}")?;
        }
    }
    Ok(())
}

/// A named, typed column, as learned from a `RowBinaryWithNamesAndTypes` header.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub data_type: DataTypeNode,
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn advance(&mut self, ch: char) {
        self.pos += ch.len_utf8();
    }

    fn skip_ws(&mut self) {
        while let Some(ch) = self.peek() {
            if ch.is_whitespace() {
                self.advance(ch);
            } else {
                break;
            }
        }
    }

    fn expect_char(&mut self, expected: char, what: &'static str) -> Result<(), TypesError> {
        self.skip_ws();
        match self.peek() {
            Some(ch) if ch == expected => {
                self.advance(ch);
                Ok(())
            }
            _ => Err(TypesError::parse(self.input, self.pos, what)),
        }
    }

    fn try_char(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.advance(expected);
            true
        } else {
            false
        }
    }

    fn parse_ident(&mut self) -> Result<&'a str, TypesError> {
        self.skip_ws();
        let start = self.pos;
        while let Some(ch) = self.peek() {
            if ch.is_ascii_alphanumeric() || ch == '_' {
                self.advance(ch);
            } else {
                break;
            }
        }
        if self.pos == start {
            return Err(TypesError::parse(self.input, start, "a type or field name"));
        }
        Ok(&self.input[start..self.pos])
    }

    fn parse_uint(&mut self) -> Result<usize, TypesError> {
        self.skip_ws();
        let start = self.pos;
        while matches!(self.peek(), Some(ch) if ch.is_ascii_digit()) {
            self.advance(self.peek().unwrap());
        }
        if self.pos == start {
            return Err(TypesError::parse(self.input, start, "an integer literal"));
        }
        self.input[start..self.pos]
            .parse()
            .map_err(|_| TypesError::parse(self.input, start, "a valid integer literal"))
    }

    fn parse_int(&mut self) -> Result<i64, TypesError> {
        self.skip_ws();
        let start = self.pos;
        if self.peek() == Some('-') {
            self.advance('-');
        }
        while matches!(self.peek(), Some(ch) if ch.is_ascii_digit()) {
            self.advance(self.peek().unwrap());
        }
        if self.pos == start || (self.pos == start + 1 && &self.input[start..self.pos] == "-") {
            return Err(TypesError::parse(self.input, start, "an integer literal"));
        }
        self.input[start..self.pos]
            .parse()
            .map_err(|_| TypesError::parse(self.input, start, "a valid integer literal"))
    }

    fn parse_string_literal(&mut self) -> Result<String, TypesError> {
        self.expect_char('\'', "a quoted string")?;
        let mut out = String::new();
        loop {
            match self.peek() {
                None => return Err(TypesError::parse(self.input, self.pos, "closing quote")),
                Some('\'') => {
                    self.advance('\'');
                    if self.peek() == Some('\'') {
                        out.push('\'');
                        self.advance('\'');
                    } else {
                        break;
                    }
                }
                Some(ch) => {
                    out.push(ch);
                    self.advance(ch);
                }
            }
        }
        Ok(out)
    }

    fn parse_enum_body<T, F>(&mut self, convert: F) -> Result<Vec<(String, T)>, TypesError>
    where
        F: Fn(i64) -> Option<T>,
    {
        self.expect_char('(', "'('")?;
        let mut values = Vec::new();
        loop {
            self.skip_ws();
            let name = self.parse_string_literal()?;
            self.expect_char('=', "'='")?;
            let raw = self.parse_int()?;
            let value = convert(raw)
                .ok_or_else(|| TypesError::parse(self.input, self.pos, "value in range"))?;
            values.push((name, value));
            self.skip_ws();
            if self.try_char(',') {
                continue;
            }
            break;
        }
        self.expect_char(')', "')'")?;
        Ok(values)
    }

    fn parse_optional_timezone(&mut self) -> Result<Option<String>, TypesError> {
        self.skip_ws();
        if self.try_char(',') {
            self.skip_ws();
            Ok(Some(self.parse_string_literal()?))
        } else {
            Ok(None)
        }
    }

    fn parse_type(&mut self) -> Result<DataTypeNode, TypesError> {
        self.skip_ws();
        let start = self.pos;
        let name = self.parse_ident()?;
        let node = match name {
            "Bool" => DataTypeNode::Bool,
            "Int8" => DataTypeNode::Int8,
            "Int16" => DataTypeNode::Int16,
            "Int32" => DataTypeNode::Int32,
            "Int64" => DataTypeNode::Int64,
            "Int128" => DataTypeNode::Int128,
            "Int256" => DataTypeNode::Int256,
            "UInt8" => DataTypeNode::UInt8,
            "UInt16" => DataTypeNode::UInt16,
            "UInt32" => DataTypeNode::UInt32,
            "UInt64" => DataTypeNode::UInt64,
            "UInt128" => DataTypeNode::UInt128,
            "UInt256" => DataTypeNode::UInt256,
            "Float32" => DataTypeNode::Float32,
            "Float64" => DataTypeNode::Float64,
            "String" => DataTypeNode::String,
            "UUID" => DataTypeNode::Uuid,
            "IPv4" => DataTypeNode::IPv4,
            "IPv6" => DataTypeNode::IPv6,
            "JSON" => DataTypeNode::Json,
            "Dynamic" => {
                self.skip_ws();
                if self.try_char('(') {
                    // e.g. `Dynamic(max_types=32)`; the argument is opaque to us.
                    let mut depth = 1usize;
                    while depth > 0 {
                        match self.peek() {
                            Some('(') => depth += 1,
                            Some(')') => depth -= 1,
                            None => {
                                return Err(TypesError::parse(self.input, self.pos, "')'"));
                            }
                            _ => {}
                        }
                        if let Some(ch) = self.peek() {
                            self.advance(ch);
                        }
                    }
                }
                DataTypeNode::Dynamic
            }
            "Date" => DataTypeNode::Date,
            "Date32" => DataTypeNode::Date32,
            "FixedString" => {
                self.expect_char('(', "'('")?;
                let n = self.parse_uint()?;
                self.expect_char(')', "')'")?;
                DataTypeNode::FixedString(n)
            }
            "DateTime" => {
                self.skip_ws();
                if self.try_char('(') {
                    self.skip_ws();
                    if self.peek() == Some(')') {
                        self.advance(')');
                        DataTypeNode::DateTime(None)
                    } else {
                        let tz = self.parse_string_literal()?;
                        self.expect_char(')', "')'")?;
                        DataTypeNode::DateTime(Some(tz))
                    }
                } else {
                    DataTypeNode::DateTime(None)
                }
            }
            "DateTime64" => {
                self.expect_char('(', "'('")?;
                let precision = self.parse_uint()?;
                let tz = self.parse_optional_timezone()?;
                self.expect_char(')', "')'")?;
                DataTypeNode::DateTime64(precision as u8, tz)
            }
            "Enum8" => DataTypeNode::Enum8(self.parse_enum_body(|v| i8::try_from(v).ok())?),
            "Enum16" => DataTypeNode::Enum16(self.parse_enum_body(|v| i16::try_from(v).ok())?),
            "Decimal" => {
                self.expect_char('(', "'('")?;
                let precision = self.parse_uint()?;
                self.expect_char(',', "','")?;
                let scale = self.parse_uint()?;
                self.expect_char(')', "')'")?;
                make_decimal(self.input, start, precision, scale)?
            }
            "Decimal32" | "Decimal64" | "Decimal128" | "Decimal256" => {
                let size = match name {
                    "Decimal32" => DecimalSize::Int32,
                    "Decimal64" => DecimalSize::Int64,
                    "Decimal128" => DecimalSize::Int128,
                    _ => DecimalSize::Int256,
                };
                self.expect_char('(', "'('")?;
                let scale = self.parse_uint()?;
                self.expect_char(')', "')'")?;
                DataTypeNode::Decimal(size.max_precision_for_width(), scale, size)
            }
            "Nullable" => {
                self.expect_char('(', "'('")?;
                let inner = self.parse_type()?;
                self.expect_char(')', "')'")?;
                DataTypeNode::Nullable(Box::new(inner))
            }
            "LowCardinality" => {
                self.expect_char('(', "'('")?;
                let inner = self.parse_type()?;
                self.expect_char(')', "')'")?;
                DataTypeNode::LowCardinality(Box::new(inner))
            }
            "Array" => {
                self.expect_char('(', "'('")?;
                let inner = self.parse_type()?;
                self.expect_char(')', "')'")?;
                DataTypeNode::Array(Box::new(inner))
            }
            "Map" => {
                self.expect_char('(', "'('")?;
                let key = self.parse_type()?;
                self.expect_char(',', "','")?;
                let value = self.parse_type()?;
                self.expect_char(')', "')'")?;
                DataTypeNode::Map(Box::new(key), Box::new(value))
            }
            "Tuple" => {
                self.expect_char('(', "'('")?;
                let mut elems = Vec::new();
                loop {
                    self.skip_ws();
                    let checkpoint = self.pos;
                    // Tuple elements are either `Type` or `name Type`; both start with
                    // an identifier, so speculatively parse one as a field name and
                    // see if a type expression follows it.
                    let candidate_name = self.parse_ident().ok().map(str::to_owned);
                    let (field_name, ty) = match candidate_name {
                        Some(candidate_name) if self.peek().is_some_and(char::is_whitespace) => {
                            match self.parse_type() {
                                Ok(ty) => (Some(candidate_name), ty),
                                Err(_) => {
                                    self.pos = checkpoint;
                                    (None, self.parse_type()?)
                                }
                            }
                        }
                        _ => {
                            self.pos = checkpoint;
                            (None, self.parse_type()?)
                        }
                    };
                    elems.push((field_name, ty));
                    self.skip_ws();
                    if self.try_char(',') {
                        continue;
                    }
                    break;
                }
                self.expect_char(')', "')'")?;
                DataTypeNode::Tuple(elems)
            }
            "Nested" => {
                self.expect_char('(', "'('")?;
                let mut fields = Vec::new();
                loop {
                    self.skip_ws();
                    let name = self.parse_ident()?.to_owned();
                    let ty = self.parse_type()?;
                    fields.push((name, ty));
                    self.skip_ws();
                    if self.try_char(',') {
                        continue;
                    }
                    break;
                }
                self.expect_char(')', "')'")?;
                DataTypeNode::Nested(fields)
            }
            _ => return Err(TypesError::parse(self.input, start, "a known type name")),
        };
        Ok(node)
    }
}

fn make_decimal(
    input: &str,
    pos: usize,
    precision: usize,
    scale: usize,
) -> Result<DataTypeNode, TypesError> {
    if scale > precision {
        return Err(TypesError::InvalidDecimalScale { precision, scale });
    }
    let size = DecimalSize::new(precision).map_err(|_| TypesError::parse(input, pos, "1 <= precision <= 76"))?;
    Ok(DataTypeNode::Decimal(precision, scale, size))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(s: &str) {
        let node = DataTypeNode::parse(s).unwrap_or_else(|e| panic!("failed to parse {s:?}: {e}"));
        assert_eq!(node.to_string(), s, "round trip mismatch for {s:?}");
    }

    #[test]
    fn parses_primitives() {
        for s in [
            "Bool", "Int8", "Int256", "UInt64", "Float32", "Float64", "String", "Date", "Date32",
            "UUID", "IPv4", "IPv6", "JSON", "Dynamic",
        ] {
            roundtrip(s);
        }
    }

    #[test]
    fn parses_fixed_string() {
        roundtrip("FixedString(16)");
    }

    #[test]
    fn parses_datetime_variants() {
        roundtrip("DateTime");
        roundtrip("DateTime('UTC')");
        roundtrip("DateTime64(3)");
        roundtrip("DateTime64(9, 'Europe/Amsterdam')");
    }

    #[test]
    fn parses_decimal() {
        roundtrip("Decimal(18, 4)");
        let node = DataTypeNode::parse("Decimal32(2)").unwrap();
        assert_eq!(node, DataTypeNode::Decimal(9, 2, DecimalSize::Int32));
    }

    #[test]
    fn rejects_bad_decimal() {
        let err = DataTypeNode::parse("Decimal(0, 0)").unwrap_err();
        assert!(matches!(err, TypesError::TypeParse { .. }));
        let err = DataTypeNode::parse("Decimal(5, 9)").unwrap_err();
        assert!(matches!(err, TypesError::InvalidDecimalScale { .. }));
    }

    #[test]
    fn parses_nested_composites() {
        roundtrip("Nullable(String)");
        roundtrip("LowCardinality(String)");
        roundtrip("Array(Array(Int32))");
        roundtrip("Map(String, Int64)");
        roundtrip("Nullable(LowCardinality(String))");
        roundtrip("LowCardinality(Nullable(String))");
    }

    #[test]
    fn distinguishes_nullable_low_cardinality_order() {
        let a = DataTypeNode::parse("Nullable(LowCardinality(String))").unwrap();
        let b = DataTypeNode::parse("LowCardinality(Nullable(String))").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn parses_tuple_with_and_without_names() {
        roundtrip("Tuple(Int32, String)");
        let node = DataTypeNode::parse("Tuple(a Int32, b String)").unwrap();
        match node {
            DataTypeNode::Tuple(elems) => {
                assert_eq!(elems[0].0.as_deref(), Some("a"));
                assert_eq!(elems[1].0.as_deref(), Some("b"));
            }
            _ => panic!("expected tuple"),
        }
    }

    #[test]
    fn parses_enum_preserving_order() {
        let node = DataTypeNode::parse("Enum8('b' = 2, 'a' = 1)").unwrap();
        match &node {
            DataTypeNode::Enum8(values) => {
                assert_eq!(values, &[("b".to_string(), 2), ("a".to_string(), 1)]);
            }
            _ => panic!("expected Enum8"),
        }
        // Printing must not re-sort by discriminant.
        assert_eq!(node.to_string(), "Enum8('b' = 2, 'a' = 1)");
    }

    #[test]
    fn parses_enum_with_escaped_quote() {
        let node = DataTypeNode::parse("Enum8('it''s' = 1)").unwrap();
        match &node {
            DataTypeNode::Enum8(values) => assert_eq!(values[0].0, "it's"),
            _ => panic!("expected Enum8"),
        }
    }

    #[test]
    fn reports_position_on_malformed_input() {
        let err = DataTypeNode::parse("Array(Int32").unwrap_err();
        match err {
            TypesError::TypeParse { position, .. } => assert_eq!(position, 11),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn trailing_garbage_is_rejected() {
        assert!(DataTypeNode::parse("Int32 garbage").is_err());
    }
}

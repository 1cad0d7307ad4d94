use serde::de::Error as _;
use serde::{Deserialize, Deserializer};

use crate::error::{Error, Result};

/// Parsed `X-ClickHouse-Summary` header: read/written rows and bytes for the
/// query or insert that produced the response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Summary {
    #[serde(default, deserialize_with = "int_or_string")]
    pub read_rows: u64,
    #[serde(default, deserialize_with = "int_or_string")]
    pub read_bytes: u64,
    #[serde(default, deserialize_with = "int_or_string")]
    pub written_rows: u64,
    #[serde(default, deserialize_with = "int_or_string")]
    pub written_bytes: u64,
    #[serde(default, deserialize_with = "int_or_string")]
    pub total_rows_to_read: u64,
    #[serde(default, deserialize_with = "int_or_string")]
    pub result_rows: u64,
    #[serde(default, deserialize_with = "int_or_string")]
    pub result_bytes: u64,
    #[serde(default, deserialize_with = "int_or_string")]
    pub elapsed_ns: u64,
}

impl Summary {
    pub(crate) fn parse(header_value: &str) -> Result<Self> {
        serde_json::from_str(header_value)
            .map_err(|err| Error::BadResponse(format!("malformed X-ClickHouse-Summary: {err}")))
    }
}

// The server emits these counters as JSON strings, not numbers.
fn int_or_string<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StrOrNum {
        Str(String),
        Num(u64),
    }

    match StrOrNum::deserialize(deserializer)? {
        StrOrNum::Num(n) => Ok(n),
        StrOrNum::Str(s) => s.parse().map_err(D::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_string_encoded_counters() {
        let summary = Summary::parse(
            r#"{"read_rows":"100","read_bytes":"4096","written_rows":"0","written_bytes":"0","total_rows_to_read":"100","result_rows":"100","result_bytes":"4096","elapsed_ns":"123456"}"#,
        )
        .unwrap();
        assert_eq!(summary.read_rows, 100);
        assert_eq!(summary.elapsed_ns, 123_456);
    }

    #[test]
    fn missing_fields_default_to_zero() {
        let summary = Summary::parse("{}").unwrap();
        assert_eq!(summary, Summary::default());
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(Summary::parse("not json").is_err());
    }
}

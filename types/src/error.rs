/// Errors raised while parsing type expressions or RowBinaryWithNamesAndTypes headers.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum TypesError {
    #[error("type parse error at byte {position}: expected {expected}, in {input:?}")]
    TypeParse {
        position: usize,
        expected: &'static str,
        input: String,
    },
    #[error("not enough data to decode a RowBinaryWithNamesAndTypes header: {0}")]
    NotEnoughData(String),
    #[error("malformed RowBinaryWithNamesAndTypes header: {0}")]
    HeaderParsing(String),
    #[error("a RowBinaryWithNamesAndTypes header must declare at least one column")]
    EmptyColumns,
    #[error("invalid Decimal precision {0}, must be between 1 and 76")]
    InvalidDecimalPrecision(usize),
    #[error("invalid Decimal scale {scale} for precision {precision}")]
    InvalidDecimalScale { precision: usize, scale: usize },
}

impl TypesError {
    pub(crate) fn parse(input: &str, position: usize, expected: &'static str) -> Self {
        Self::TypeParse {
            position,
            expected,
            input: input.to_owned(),
        }
    }
}

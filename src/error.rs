//! Contains [`Error`] and the corresponding [`Result`].

use clickhouse_types::TypesError;
use std::{error::Error as StdError, io, result};

/// A result with a specified [`Error`] type.
pub type Result<T, E = Error> = result::Result<T, E>;

type BoxedError = Box<dyn StdError + Send + Sync>;

/// Represents all possible errors.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
#[allow(missing_docs)]
pub enum Error {
    #[error("invalid client configuration: {0}")]
    Config(String),

    #[error("network error: {0}")]
    Network(#[source] BoxedError),

    #[error("compression error: {0}")]
    Compression(#[source] BoxedError),

    #[error("decompression error: {0}")]
    Decompression(#[source] BoxedError),

    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("not enough data, probably a row type mismatches a database schema")]
    NotEnoughData,

    #[error(transparent)]
    TypeParse(#[from] TypesError),

    #[error("column `{column}` has type {actual}, which cannot hold a value of kind {expected}")]
    TypeMismatch {
        column: String,
        expected: &'static str,
        actual: String,
    },

    #[error("value for column `{column}` is out of range: {message}")]
    OutOfRange { column: String, message: String },

    #[error("{value} is not a valid discriminant for enum column `{column}`")]
    InvalidEnum { column: String, value: i64 },

    #[error("query references parameter `{0}`, which was never bound")]
    ParameterMissing(String),

    #[error("parameter `{0}` was bound without a type and one could not be inferred")]
    ParameterUntyped(String),

    #[error("parameter `{0}` was bound more than once with conflicting values")]
    ParameterConflicting(String),

    #[error("server returned exception {code}: {message}")]
    Server { code: i32, message: String },

    #[error("the operation was cancelled")]
    Cancelled,

    #[error("timeout expired")]
    TimedOut,

    #[error("bad response: {0}")]
    BadResponse(String),

    #[error("no rows returned by a query that expected to return at least one row")]
    RowNotFound,

    #[error("a sink was already finalized")]
    AlreadyFinalized,

    #[error("column `{column}` does not exist in table `{table}`")]
    UnknownColumn { table: String, column: String },

    #[error("column `{column}` is ambiguous in table `{table}`")]
    AmbiguousColumn { table: String, column: String },

    #[error("{0}")]
    Other(BoxedError),
}

impl From<hyper::Error> for Error {
    fn from(error: hyper::Error) -> Self {
        Self::Network(Box::new(error))
    }
}

impl From<hyper_util::client::legacy::Error> for Error {
    fn from(error: hyper_util::client::legacy::Error) -> Self {
        Self::Network(Box::new(error))
    }
}

impl From<Error> for io::Error {
    fn from(error: Error) -> Self {
        io::Error::other(error)
    }
}

impl From<io::Error> for Error {
    fn from(error: io::Error) -> Self {
        if error.get_ref().is_some_and(|r| r.is::<Error>()) {
            *error.into_inner().unwrap().downcast::<Error>().unwrap()
        } else {
            Self::Other(error.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_io_error() {
        let orig = Error::NotEnoughData;

        let orig_str = orig.to_string();
        let io = io::Error::from(orig);
        assert_eq!(io.kind(), io::ErrorKind::Other);
        assert_eq!(io.to_string(), orig_str);

        let orig = Error::from(io);
        assert!(matches!(orig, Error::NotEnoughData));
    }

    #[test]
    fn carries_server_exception_details() {
        let err = Error::Server {
            code: 60,
            message: "Table default.missing doesn't exist".to_string(),
        };
        assert!(err.to_string().contains("60"));
    }
}

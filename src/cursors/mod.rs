pub(crate) use self::raw::RawCursor;
pub use self::row::RowCursor;

mod raw;
mod row;

use crate::{
    bytes_ext::BytesExt,
    cursors::RawCursor,
    error::{Error, Result},
    response::Response,
    rowbinary,
    value::{Row, Value},
};
use clickhouse_types::{parse_rbwnat_columns_header, Column};
use std::sync::Arc;

/// A cursor that lazily decodes `RowBinaryWithNamesAndTypes` rows as they
/// arrive, one HTTP chunk at a time.
#[must_use]
pub struct RowCursor {
    raw: RawCursor,
    bytes: BytesExt,
    columns: Option<Arc<[Column]>>,
}

impl RowCursor {
    pub(crate) fn new(response: Response) -> Self {
        Self {
            raw: RawCursor::new(response),
            bytes: BytesExt::default(),
            columns: None,
        }
    }

    /// The column list read from the header, once it has arrived.
    ///
    /// Returns `None` until at least the header has been received; after
    /// the first call to [`next`](Self::next) returns `Ok(Some(_))`, it is
    /// always `Some`.
    pub fn columns(&self) -> Option<&[Column]> {
        self.columns.as_deref()
    }

    /// Emits the next row as a plain vector of dynamically-typed values.
    ///
    /// Returns `Ok(None)` once the stream is exhausted.
    ///
    /// # Cancel safety
    ///
    /// This method is cancellation safe.
    pub async fn next(&mut self) -> Result<Option<Row>> {
        loop {
            if self.columns.is_none() {
                let mut slice = self.bytes.slice();
                if !slice.is_empty() {
                    match parse_rbwnat_columns_header(&mut slice) {
                        Ok(columns) => {
                            self.bytes.set_remaining(slice.len());
                            self.columns = Some(columns.into());
                        }
                        Err(_) => {
                            // Not enough bytes yet for a complete header.
                        }
                    }
                }
            }

            if let Some(columns) = self.columns.clone() {
                let mut slice = self.bytes.slice();
                match rowbinary::decode_row(&mut slice, &columns) {
                    Ok(row) => {
                        self.bytes.set_remaining(slice.len());
                        return Ok(Some(row));
                    }
                    Err(Error::NotEnoughData) => {}
                    Err(err) => return Err(err),
                }
            }

            match self.raw.next().await? {
                Some(chunk) => self.bytes.extend(chunk),
                None if self.bytes.remaining() > 0 => {
                    return Err(Error::Protocol(format!(
                        "{} trailing byte(s) after the last complete row",
                        self.bytes.remaining()
                    )));
                }
                None => return Ok(None),
            }
        }
    }

    /// Emits the next row, decoding each value through [`TryFrom<&Value>`].
    ///
    /// Intended for call sites that want a typed struct without a derive
    /// macro: implement `TryFrom<&Value>` for each field type, and
    /// `TryFrom<&[Value]>` for the row type.
    pub async fn next_typed<T>(&mut self) -> Result<Option<T>>
    where
        T: for<'a> TryFrom<&'a [Value], Error = Error>,
    {
        match self.next().await? {
            Some(row) => Ok(Some(T::try_from(&row)?)),
            None => Ok(None),
        }
    }

    /// Total bytes received from the server since the cursor was created.
    #[inline]
    pub fn received_bytes(&self) -> u64 {
        self.raw.received_bytes()
    }

    /// Total bytes decoded (post-decompression) since the cursor was created.
    #[inline]
    pub fn decoded_bytes(&self) -> u64 {
        self.raw.decoded_bytes()
    }
}

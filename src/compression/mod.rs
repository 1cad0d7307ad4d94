#[cfg(feature = "lz4")]
pub mod lz4;
#[cfg(feature = "zstd")]
pub mod zstd;

/// How response bodies and insert payloads are compressed on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[non_exhaustive]
pub enum Compression {
    #[default]
    None,
    #[cfg(feature = "lz4")]
    Lz4,
    #[cfg(feature = "zstd")]
    Zstd,
}

impl Compression {
    /// The `Content-Encoding`/`Accept-Encoding` value to advertise, if any.
    ///
    /// ClickHouse's LZ4 framing is a custom, CityHash-checksummed block
    /// format rather than the standard `lz4` content-encoding, so it isn't
    /// signaled through this header at all — the query string's
    /// `compress=1` parameter and a body rewritten into that framing do the
    /// work instead.
    pub fn encoding(&self) -> Option<&'static str> {
        match self {
            Compression::None => None,
            #[cfg(feature = "lz4")]
            Compression::Lz4 => None,
            #[cfg(feature = "zstd")]
            Compression::Zstd => Some("zstd"),
        }
    }
}

use crate::error::TypesError;
use crate::leb128::{decode_leb128, encode_leb128};
use bytes::{Buf, BufMut};

#[inline]
pub fn decode_string(buffer: &mut &[u8]) -> Result<String, TypesError> {
    let length = decode_leb128(buffer)? as usize;
    if length == 0 {
        return Ok(String::new());
    }
    if buffer.remaining() < length {
        return Err(TypesError::NotEnoughData(format!(
            "decoding string, {} bytes remaining, {} bytes required",
            buffer.remaining(),
            length,
        )));
    }
    let result = String::from_utf8_lossy(&buffer.copy_to_bytes(length)).into_owned();
    Ok(result)
}

#[inline]
pub fn encode_string(value: &str, buffer: &mut impl BufMut) {
    encode_leb128(value.len() as u64, buffer);
    buffer.put_slice(value.as_bytes());
}

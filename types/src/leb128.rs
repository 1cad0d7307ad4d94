use crate::error::TypesError;
use bytes::{Buf, BufMut};

/// Reads an unsigned LEB128 varint (7 payload bits per byte, high bit = continuation).
pub fn decode_leb128(buffer: &mut &[u8]) -> Result<u64, TypesError> {
    let mut value = 0u64;
    let mut shift = 0;
    loop {
        if buffer.remaining() < 1 {
            return Err(TypesError::NotEnoughData(
                "decoding LEB128, 0 bytes remaining".to_string(),
            ));
        }
        let byte = buffer.get_u8();
        value |= (byte as u64 & 0x7f) << shift;
        if byte & 0x80 == 0 {
            break;
        }
        shift += 7;
        if shift > 57 {
            return Err(TypesError::NotEnoughData(
                "decoding LEB128, invalid shift".to_string(),
            ));
        }
    }
    Ok(value)
}

/// Writes an unsigned LEB128 varint.
pub fn encode_leb128(mut value: u64, buffer: &mut impl BufMut) {
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        buffer.put_u8(byte);
        if value == 0 {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_leb128() {
        let test_cases = vec![
            (vec![0], 0),
            (vec![1], 1),
            (vec![127], 127),
            (vec![128, 1], 128),
            (vec![255, 1], 255),
            (vec![0x85, 0x91, 0x26], 624773),
            (vec![0xE5, 0x8E, 0x26], 624485),
        ];

        for (input, expected) in test_cases {
            let result = decode_leb128(&mut input.as_slice()).unwrap();
            assert_eq!(result, expected, "failed decoding {:?}", input);
        }
    }

    #[test]
    fn test_encode_decode_leb128() {
        let test_values = vec![
            0u64,
            1,
            127,
            128,
            255,
            624773,
            624485,
            300_000,
            10_000_000,
            u32::MAX as u64,
            (u32::MAX as u64) + 1,
        ];

        for value in test_values {
            let mut encoded = Vec::new();
            encode_leb128(value, &mut encoded);
            let decoded = decode_leb128(&mut encoded.as_slice()).unwrap();
            assert_eq!(decoded, value, "failed round trip for {value}");
        }
    }

    #[test]
    fn rejects_truncated_input() {
        let err = decode_leb128(&mut [0x80u8].as_slice()).unwrap_err();
        assert!(matches!(err, TypesError::NotEnoughData(_)));
    }
}

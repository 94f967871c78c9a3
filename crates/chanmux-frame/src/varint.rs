//! Base-128 variable-length integers.
//!
//! Each byte carries 7 bits of the value, least-significant group first.
//! The high bit is set on every byte except the last.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Longest encoding of any `u64`.
pub const MAX_VARINT_LEN: usize = 10;

const CONTINUATION: u8 = 0x80;
const DATA_MASK: u8 = 0x7f;

/// Number of bytes `n` occupies once encoded.
pub const fn encoded_len(n: u64) -> usize {
    let bits = 64 - n.leading_zeros() as usize;
    if bits == 0 {
        1
    } else {
        (bits + 6) / 7
    }
}

/// Width of the widest encoding of any integer in `0..=upper_bound`.
pub const fn max_encoded_width(upper_bound: u64) -> usize {
    encoded_len(upper_bound)
}

/// Append the encoding of `n` to `dst`.
pub fn encode<B: BufMut>(mut n: u64, dst: &mut B) {
    while n >= u64::from(CONTINUATION) {
        dst.put_u8((n as u8 & DATA_MASK) | CONTINUATION);
        n >>= 7;
    }
    dst.put_u8(n as u8);
}

/// Encode `n` into a standalone buffer.
pub fn encode_to_bytes(n: u64) -> Bytes {
    let mut buf = BytesMut::with_capacity(encoded_len(n));
    encode(n, &mut buf);
    buf.freeze()
}

/// Decode a varint from the start of `src`.
///
/// Returns the value and the number of bytes consumed. Fails with
/// [`FrameError::MalformedVarint`] if `src` ends before the varint does.
pub fn decode(src: &[u8]) -> Result<(u64, usize)> {
    decode_partial(src)?.ok_or(FrameError::MalformedVarint)
}

/// Decode a varint that must terminate within the first `window` bytes.
pub fn decode_bounded(src: &[u8], window: usize) -> Result<(u64, usize)> {
    decode(&src[..src.len().min(window)])
}

/// Streaming decode.
///
/// `Ok(None)` means `src` holds the beginning of a varint that may still
/// terminate once more bytes arrive.
pub fn decode_partial(src: &[u8]) -> Result<Option<(u64, usize)>> {
    let mut value = 0u64;
    for (i, &byte) in src.iter().take(MAX_VARINT_LEN).enumerate() {
        let group = u64::from(byte & DATA_MASK);
        // The tenth byte may only contribute the top bit of a u64.
        if i == MAX_VARINT_LEN - 1 && group > 1 {
            return Err(FrameError::MalformedVarint);
        }
        value |= group << (7 * i);
        if byte & CONTINUATION == 0 {
            return Ok(Some((value, i + 1)));
        }
    }

    if src.len() >= MAX_VARINT_LEN {
        Err(FrameError::MalformedVarint)
    } else {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(n: u64) {
        let encoded = encode_to_bytes(n);
        assert_eq!(encoded.len(), encoded_len(n), "length mismatch for {n}");
        let (decoded, used) = decode(&encoded).unwrap();
        assert_eq!(decoded, n);
        assert_eq!(used, encoded.len());
    }

    #[test]
    fn known_encodings() {
        assert_eq!(encode_to_bytes(0).as_ref(), &[0x00]);
        assert_eq!(encode_to_bytes(1).as_ref(), &[0x01]);
        assert_eq!(encode_to_bytes(127).as_ref(), &[0x7f]);
        assert_eq!(encode_to_bytes(128).as_ref(), &[0x80, 0x01]);
        assert_eq!(encode_to_bytes(300).as_ref(), &[0xac, 0x02]);
        assert_eq!(encode_to_bytes(16_384).as_ref(), &[0x80, 0x80, 0x01]);
    }

    #[test]
    fn roundtrips_group_boundaries() {
        for shift in 0..64 {
            let n = 1u64 << shift;
            roundtrip(n - 1);
            roundtrip(n);
        }
        roundtrip(u64::MAX);
        roundtrip((1 << 53) - 1);
    }

    #[test]
    fn encoded_len_matches_width() {
        assert_eq!(encoded_len(0), 1);
        assert_eq!(encoded_len(127), 1);
        assert_eq!(encoded_len(128), 2);
        assert_eq!(encoded_len((1 << 53) - 1), 8);
        assert_eq!(encoded_len(u64::MAX), MAX_VARINT_LEN);
        assert_eq!(max_encoded_width((1 << 53) - 1), 8);
    }

    #[test]
    fn decode_ignores_trailing_bytes() {
        let (value, used) = decode(&[0xac, 0x02, 0xff, 0xff]).unwrap();
        assert_eq!(value, 300);
        assert_eq!(used, 2);
    }

    #[test]
    fn unterminated_varint_is_malformed() {
        assert!(matches!(decode(&[]), Err(FrameError::MalformedVarint)));
        assert!(matches!(decode(&[0x80, 0x80]), Err(FrameError::MalformedVarint)));
    }

    #[test]
    fn bounded_window_rejects_long_varints() {
        let encoded = encode_to_bytes(1 << 56);
        assert_eq!(encoded.len(), 9);
        assert!(matches!(
            decode_bounded(&encoded, 8),
            Err(FrameError::MalformedVarint)
        ));
        assert_eq!(decode_bounded(&encoded, 9).unwrap().0, 1 << 56);
    }

    #[test]
    fn partial_waits_for_more_bytes() {
        assert!(decode_partial(&[]).unwrap().is_none());
        assert!(decode_partial(&[0x80]).unwrap().is_none());
        assert_eq!(decode_partial(&[0x80, 0x01]).unwrap(), Some((128, 2)));
    }

    #[test]
    fn overlong_varint_is_malformed() {
        let bytes = [0xffu8; MAX_VARINT_LEN + 1];
        assert!(matches!(
            decode_partial(&bytes),
            Err(FrameError::MalformedVarint)
        ));
    }

    #[test]
    fn overflowing_tenth_byte_is_malformed() {
        let mut bytes = [0xffu8; MAX_VARINT_LEN];
        bytes[MAX_VARINT_LEN - 1] = 0x02;
        assert!(matches!(decode(&bytes), Err(FrameError::MalformedVarint)));
    }
}

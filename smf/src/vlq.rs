//! Variable-length quantities, the big-endian continuation-bit integer
//! encoding used for SMF delta times.
//!
//! Each byte carries 7 payload bits, most significant group first; bit 7 is
//! set on every byte except the last.

/// Appends the minimal encoding of `value` to `out`.
pub fn encode(value: u32, out: &mut Vec<u8>) {
    if value == 0 {
        out.push(0);
        return;
    }

    // Number of 7-bit groups, by integer arithmetic: a float log here is
    // off by one at exact powers of 128.
    let bits = 32 - value.leading_zeros();
    let groups = (bits + 6) / 7;

    for i in (0..groups).rev() {
        let mut byte = ((value >> (i * 7)) & 0x7f) as u8;
        if i != 0 {
            byte |= 0x80;
        }
        out.push(byte);
    }
}

pub fn encode_to_vec(value: u32) -> Vec<u8> {
    let mut out = Vec::new();
    encode(value, &mut out);
    out
}

/// Decodes one quantity from the front of `data`, returning the value and
/// the number of bytes consumed, or `None` if the data ends mid-quantity.
pub fn decode(data: &[u8]) -> Option<(u32, usize)> {
    let mut value: u32 = 0;
    for (i, &byte) in data.iter().enumerate() {
        value = (value << 7) | u32::from(byte & 0x7f);
        if byte & 0x80 == 0 {
            return Some((value, i + 1));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_encodings() {
        assert_eq!(encode_to_vec(0), [0x00]);
        assert_eq!(encode_to_vec(127), [0x7f]);
        assert_eq!(encode_to_vec(128), [0x81, 0x00]);
        assert_eq!(encode_to_vec(16383), [0xff, 0x7f]);
        assert_eq!(encode_to_vec(16384), [0x81, 0x80, 0x00]);
    }

    #[test]
    fn round_trip_is_idempotent() {
        for &value in &[0u32, 1, 5, 127, 128, 200, 16383, 16384, 0x0fff_ffff, u32::MAX] {
            let encoded = encode_to_vec(value);
            let (decoded, used) = decode(&encoded).unwrap();
            assert_eq!(used, encoded.len());
            assert_eq!(decoded, value);
            assert_eq!(encode_to_vec(decoded), encoded);
        }
    }

    #[test]
    fn decode_rejects_truncated_input() {
        assert_eq!(decode(&[0x81]), None);
        assert_eq!(decode(&[]), None);
    }

    #[test]
    fn decode_stops_at_first_terminator() {
        assert_eq!(decode(&[0x81, 0x00, 0x7f]), Some((128, 2)));
    }
}

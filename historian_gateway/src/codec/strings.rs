//! Length-prefixed controller string layouts.
//!
//! STRING:  `[0]` max length, `[1]` current length, payload in Windows-1254.
//! WSTRING: `[0..2]` max chars, `[2..4]` current chars (both big-endian),
//!          payload in UTF-16BE.
//!
//! Decoders never fail: truncated or empty buffers yield an empty string.

use super::code_page;

pub const STRING_HEADER: usize = 2;
pub const WSTRING_HEADER: usize = 4;

/// Total byte span of a STRING with the given capacity.
pub fn string_len(max_len: u8) -> usize {
    max_len as usize + STRING_HEADER
}

/// Total byte span of a WSTRING with the given capacity.
pub fn wstring_len(max_chars: u16) -> usize {
    2 * max_chars as usize + WSTRING_HEADER
}

pub fn decode_string(buffer: &[u8], max_len: u8) -> String {
    if buffer.len() < STRING_HEADER {
        return String::new();
    }
    let available = buffer.len() - STRING_HEADER;
    let cur = (buffer[1] as usize).min(max_len as usize).min(available);
    if cur == 0 {
        return String::new();
    }
    code_page::decode(&buffer[STRING_HEADER..STRING_HEADER + cur])
}

pub fn encode_string(s: &str, max_len: u8) -> Vec<u8> {
    let payload = code_page::encode(s);
    let cur = payload.len().min(max_len as usize);
    let mut buf = vec![0u8; string_len(max_len)];
    buf[0] = max_len;
    buf[1] = cur as u8;
    buf[STRING_HEADER..STRING_HEADER + cur].copy_from_slice(&payload[..cur]);
    buf
}

pub fn decode_wstring(buffer: &[u8], max_chars: u16) -> String {
    if buffer.len() < WSTRING_HEADER {
        return String::new();
    }
    let cur = u16::from_be_bytes([buffer[2], buffer[3]]) as usize;
    let available = (buffer.len() - WSTRING_HEADER) / 2;
    let count = cur.min(max_chars as usize).min(available);
    if count == 0 {
        return String::new();
    }
    let units: Vec<u16> = buffer[WSTRING_HEADER..WSTRING_HEADER + count * 2]
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect();
    String::from_utf16_lossy(&units)
}

pub fn encode_wstring(s: &str, max_chars: u16) -> Vec<u8> {
    let units: Vec<u16> = s.encode_utf16().collect();
    let mut cur = units.len().min(max_chars as usize);
    // Never split a surrogate pair at the capacity boundary
    if cur > 0 && cur < units.len() && (0xD800..0xDC00).contains(&units[cur - 1]) {
        cur -= 1;
    }
    let mut buf = vec![0u8; wstring_len(max_chars)];
    buf[0..2].copy_from_slice(&max_chars.to_be_bytes());
    buf[2..4].copy_from_slice(&(cur as u16).to_be_bytes());
    for (i, unit) in units[..cur].iter().enumerate() {
        let at = WSTRING_HEADER + i * 2;
        buf[at..at + 2].copy_from_slice(&unit.to_be_bytes());
    }
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLES: [&str; 5] = ["", "A", "Hello", "Şişli İstanbul", "pump-07 ÇALIŞIYOR"];

    #[test]
    fn string_round_trip_across_capacities() {
        for max in [0u8, 1, 8, 254] {
            for s in SAMPLES {
                let expected: String = s.chars().take(max as usize).collect();
                let encoded = encode_string(s, max);
                assert_eq!(encoded.len(), max as usize + 2);
                assert_eq!(decode_string(&encoded, max), expected, "max={} s={:?}", max, s);
            }
        }
    }

    #[test]
    fn wstring_round_trip_across_capacities() {
        for max in [0u16, 1, 8, 512] {
            for s in SAMPLES.iter().chain(["日本語テキスト"].iter()) {
                let expected: String = s.chars().take(max as usize).collect();
                let encoded = encode_wstring(s, max);
                assert_eq!(encoded.len(), 2 * max as usize + 4);
                assert_eq!(decode_wstring(&encoded, max), expected, "max={} s={:?}", max, s);
            }
        }
    }

    #[test]
    fn wstring_truncation_keeps_surrogate_pairs_whole() {
        for (s, max, expected) in [("a😀", 2, "a"), ("a😀", 3, "a😀"), ("😀😀", 3, "😀"), ("😀", 1, "")] {
            let encoded = encode_wstring(s, max);
            assert_eq!(decode_wstring(&encoded, max), expected, "max={} s={:?}", max, s);
        }
        assert_eq!(encode_wstring("a😀", 2)[2..4], [0, 1]);
    }

    #[test]
    fn string_layout_is_exact() {
        let buf = encode_string("AB", 4);
        assert_eq!(buf, vec![4, 2, b'A', b'B', 0, 0]);
    }

    #[test]
    fn wstring_layout_is_exact() {
        let buf = encode_wstring("Aé", 3);
        assert_eq!(buf, vec![0, 3, 0, 2, 0x00, 0x41, 0x00, 0xE9, 0, 0]);
    }

    #[test]
    fn overlong_input_is_truncated_to_capacity() {
        let buf = encode_string("overflowing", 4);
        assert_eq!(buf[1], 4);
        assert_eq!(decode_string(&buf, 4), "over");

        let wbuf = encode_wstring("overflowing", 5);
        assert_eq!(decode_wstring(&wbuf, 5), "overf");
    }

    #[test]
    fn short_buffers_decode_empty() {
        assert_eq!(decode_string(&[], 10), "");
        assert_eq!(decode_string(&[10], 10), "");
        assert_eq!(decode_wstring(&[], 10), "");
        assert_eq!(decode_wstring(&[0, 10, 0], 10), "");
    }

    #[test]
    fn current_length_is_clamped() {
        // Header claims 9 chars, only 3 bytes of payload present
        assert_eq!(decode_string(&[10, 9, b'a', b'b', b'c'], 10), "abc");
        // Header claims more than the declared maximum
        assert_eq!(decode_string(&[10, 9, b'a', b'b', b'c', b'd'], 2), "ab");
        // Odd trailing byte in a WSTRING payload is ignored
        assert_eq!(decode_wstring(&[0, 4, 0, 4, 0, b'x', 0, b'y', 0], 4), "xy");
    }
}

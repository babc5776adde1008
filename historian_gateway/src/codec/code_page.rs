//! Windows-1254 (Turkish) single-byte code page used by controller STRING fields.

/// Code points for bytes 0x80..=0x9F. Unassigned slots map to the C1 control
/// of the same value so that every byte decodes and re-encodes unchanged.
const HIGH_CONTROL: [char; 32] = [
    '\u{20AC}', '\u{0081}', '\u{201A}', '\u{0192}', '\u{201E}', '\u{2026}', '\u{2020}', '\u{2021}',
    '\u{02C6}', '\u{2030}', '\u{0160}', '\u{2039}', '\u{0152}', '\u{008D}', '\u{008E}', '\u{008F}',
    '\u{0090}', '\u{2018}', '\u{2019}', '\u{201C}', '\u{201D}', '\u{2022}', '\u{2013}', '\u{2014}',
    '\u{02DC}', '\u{2122}', '\u{0161}', '\u{203A}', '\u{0153}', '\u{009D}', '\u{009E}', '\u{0178}',
];

/// Latin-1 positions replaced by Turkish letters.
const TURKISH: [(u8, char); 6] = [
    (0xD0, '\u{011E}'), // Ğ
    (0xDD, '\u{0130}'), // İ
    (0xDE, '\u{015E}'), // Ş
    (0xF0, '\u{011F}'), // ğ
    (0xFD, '\u{0131}'), // ı
    (0xFE, '\u{015F}'), // ş
];

pub const REPLACEMENT: u8 = b'?';

pub fn decode_byte(b: u8) -> char {
    match b {
        0x00..=0x7F => b as char,
        0x80..=0x9F => HIGH_CONTROL[(b - 0x80) as usize],
        _ => TURKISH
            .iter()
            .find(|(byte, _)| *byte == b)
            .map(|(_, c)| *c)
            .unwrap_or(b as char),
    }
}

pub fn encode_char(c: char) -> u8 {
    let cp = c as u32;
    if cp < 0x80 {
        return cp as u8;
    }
    if let Some(pos) = HIGH_CONTROL.iter().position(|h| *h == c) {
        return 0x80 + pos as u8;
    }
    if let Some((b, _)) = TURKISH.iter().find(|(_, t)| *t == c) {
        return *b;
    }
    if (0xA0..=0xFF).contains(&cp) && !TURKISH.iter().any(|(b, _)| *b as u32 == cp) {
        return cp as u8;
    }
    REPLACEMENT
}

pub fn decode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| decode_byte(*b)).collect()
}

pub fn encode(s: &str) -> Vec<u8> {
    s.chars().map(encode_char).collect()
}

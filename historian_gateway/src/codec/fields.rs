//! Fixed-width field encoding in controller (big-endian) byte order.

use super::strings;
use crate::error::{GatewayError, GatewayResult};
use crate::tags::structures::{FieldType, ValueVariant};
use chrono::{DateTime, Duration, NaiveDate, Utc};

/// Controller DATE values count days from this epoch.
fn date_epoch() -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(1990, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .unwrap_or_default()
}

/// Number of bytes a read or write of this field spans.
pub fn byte_len(field: FieldType, count: usize) -> usize {
    match field {
        FieldType::String => strings::string_len(string_capacity(count)),
        FieldType::Wstring => strings::wstring_len(wstring_capacity(count)),
        FieldType::Bit => 1,
        other => other.element_width() * count.max(1),
    }
}

pub fn string_capacity(count: usize) -> u8 {
    count.min(254) as u8
}

pub fn wstring_capacity(count: usize) -> u16 {
    count.min(16_382) as u16
}

/// Fails with `Encoding` when `buf` cannot hold `needed` bytes.
pub fn check_len(buf: &[u8], needed: usize) -> GatewayResult<()> {
    if buf.len() < needed {
        return Err(GatewayError::Encoding {
            needed,
            available: buf.len(),
        });
    }
    Ok(())
}

/// Decode a value from raw bytes. Missing bytes read as zero; this never fails.
pub fn decode_value(field: FieldType, count: usize, bit: Option<u8>, buf: &[u8]) -> ValueVariant {
    match field {
        FieldType::String => {
            ValueVariant::String(strings::decode_string(buf, string_capacity(count)))
        }
        FieldType::Wstring => {
            ValueVariant::String(strings::decode_wstring(buf, wstring_capacity(count)))
        }
        FieldType::Bit => {
            let byte = buf.first().copied().unwrap_or(0);
            ValueVariant::Bool(byte & (1 << bit.unwrap_or(0).min(7)) != 0)
        }
        _ if count > 1 => {
            let width = field.element_width();
            ValueVariant::Array(
                (0..count)
                    .map(|i| decode_scalar(field, buf.get(i * width..).unwrap_or(&[])))
                    .collect(),
            )
        }
        _ => decode_scalar(field, buf),
    }
}

fn fixed<const N: usize>(buf: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    let n = buf.len().min(N);
    out[..n].copy_from_slice(&buf[..n]);
    out
}

fn decode_scalar(field: FieldType, buf: &[u8]) -> ValueVariant {
    match field {
        FieldType::Bit => ValueVariant::Bool(fixed::<1>(buf)[0] & 1 != 0),
        FieldType::Byte => ValueVariant::Int(fixed::<1>(buf)[0] as i64),
        FieldType::Word => ValueVariant::Int(u16::from_be_bytes(fixed(buf)) as i64),
        FieldType::Int => ValueVariant::Int(i16::from_be_bytes(fixed(buf)) as i64),
        FieldType::Dword => ValueVariant::Int(u32::from_be_bytes(fixed(buf)) as i64),
        FieldType::Dint => ValueVariant::Int(i32::from_be_bytes(fixed(buf)) as i64),
        FieldType::Real => ValueVariant::Float(f32::from_be_bytes(fixed(buf)) as f64),
        FieldType::Lreal => ValueVariant::Float(f64::from_be_bytes(fixed(buf))),
        FieldType::Date => {
            let days = u16::from_be_bytes(fixed(buf)) as i64;
            ValueVariant::Date(date_epoch() + Duration::days(days))
        }
        FieldType::String => ValueVariant::String(strings::decode_string(buf, u8::MAX)),
        FieldType::Wstring => ValueVariant::String(strings::decode_wstring(buf, u16::MAX)),
    }
}

/// Encode an already coerced value. Bit fields encode as a single 0/1 byte;
/// the channel places the bit itself.
pub fn encode_value(field: FieldType, count: usize, value: &ValueVariant) -> GatewayResult<Vec<u8>> {
    match (field, value) {
        (FieldType::String, ValueVariant::String(s)) => {
            Ok(strings::encode_string(s, string_capacity(count)))
        }
        (FieldType::Wstring, ValueVariant::String(s)) => {
            Ok(strings::encode_wstring(s, wstring_capacity(count)))
        }
        (_, ValueVariant::Array(items)) => {
            let width = field.element_width();
            let mut out = Vec::with_capacity(width * count.max(1));
            for item in items.iter().take(count.max(1)) {
                out.extend(encode_scalar(field, item)?);
            }
            out.resize(width * count.max(1), 0);
            Ok(out)
        }
        _ => encode_scalar(field, value),
    }
}

fn encode_scalar(field: FieldType, value: &ValueVariant) -> GatewayResult<Vec<u8>> {
    let mismatch = || GatewayError::Conversion {
        tag: String::new(),
        reason: format!("{:?} cannot hold {:?}", field, value),
    };
    let bytes = match (field, value) {
        (FieldType::Bit, ValueVariant::Bool(b)) => vec![*b as u8],
        (FieldType::Byte, ValueVariant::Int(i)) => vec![*i as u8],
        (FieldType::Word, ValueVariant::Int(i)) => (*i as u16).to_be_bytes().to_vec(),
        (FieldType::Int, ValueVariant::Int(i)) => (*i as i16).to_be_bytes().to_vec(),
        (FieldType::Dword, ValueVariant::Int(i)) => (*i as u32).to_be_bytes().to_vec(),
        (FieldType::Dint, ValueVariant::Int(i)) => (*i as i32).to_be_bytes().to_vec(),
        (FieldType::Real, ValueVariant::Float(f)) => (*f as f32).to_be_bytes().to_vec(),
        (FieldType::Lreal, ValueVariant::Float(f)) => f.to_be_bytes().to_vec(),
        (FieldType::Date, ValueVariant::Date(d)) => {
            let days = (*d - date_epoch()).num_days();
            let days = u16::try_from(days).map_err(|_| mismatch())?;
            days.to_be_bytes().to_vec()
        }
        _ => return Err(mismatch()),
    };
    Ok(bytes)
}

/// Coerce a caller-supplied value into the native representation of `field`.
pub fn coerce(field: FieldType, count: usize, value: &ValueVariant) -> Result<ValueVariant, String> {
    if let ValueVariant::Array(items) = value {
        if field.is_string() || field == FieldType::Bit {
            return Err(format!("{:?} does not accept arrays", field));
        }
        let coerced: Result<Vec<_>, _> = items.iter().map(|v| coerce_scalar(field, v)).collect();
        return coerced.map(ValueVariant::Array);
    }
    if count > 1 && !field.is_string() && field != FieldType::Bit {
        return Err(format!("{:?}[{}] expects an array value", field, count));
    }
    coerce_scalar(field, value)
}

fn coerce_scalar(field: FieldType, value: &ValueVariant) -> Result<ValueVariant, String> {
    match field {
        FieldType::Bit => to_bool(value).map(ValueVariant::Bool),
        FieldType::Byte => to_int(value, 0, u8::MAX as i64),
        FieldType::Word => to_int(value, 0, u16::MAX as i64),
        FieldType::Int => to_int(value, i16::MIN as i64, i16::MAX as i64),
        FieldType::Dword => to_int(value, 0, u32::MAX as i64),
        FieldType::Dint => to_int(value, i32::MIN as i64, i32::MAX as i64),
        FieldType::Real | FieldType::Lreal => to_float(value).map(ValueVariant::Float),
        FieldType::String | FieldType::Wstring => match value {
            ValueVariant::Null => Err("null cannot be written".to_string()),
            other => Ok(ValueVariant::String(other.to_text())),
        },
        FieldType::Date => match value {
            ValueVariant::Date(d) => Ok(ValueVariant::Date(*d)),
            ValueVariant::String(s) => DateTime::parse_from_rfc3339(s.trim())
                .map(|d| ValueVariant::Date(d.with_timezone(&Utc)))
                .or_else(|_| {
                    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
                        .map(|d| ValueVariant::Date(d.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc()))
                })
                .map_err(|e| format!("invalid date '{}': {}", s, e)),
            other => Err(format!("cannot convert {:?} to a date", other)),
        },
    }
}

fn to_bool(value: &ValueVariant) -> Result<bool, String> {
    match value {
        ValueVariant::Bool(b) => Ok(*b),
        ValueVariant::Int(i) => Ok(*i != 0),
        ValueVariant::Float(f) => Ok(*f != 0.0),
        ValueVariant::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "on" => Ok(true),
            "false" | "0" | "off" => Ok(false),
            other => Err(format!("'{}' is not a boolean", other)),
        },
        other => Err(format!("cannot convert {:?} to bool", other)),
    }
}

fn to_int(value: &ValueVariant, min: i64, max: i64) -> Result<ValueVariant, String> {
    let i = match value {
        ValueVariant::Int(i) => *i,
        ValueVariant::Bool(b) => *b as i64,
        ValueVariant::Float(f) if f.fract() == 0.0 && f.is_finite() => *f as i64,
        ValueVariant::Float(f) => return Err(format!("{} is not an integer", f)),
        ValueVariant::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|e| format!("'{}' is not an integer: {}", s, e))?,
        other => return Err(format!("cannot convert {:?} to an integer", other)),
    };
    if i < min || i > max {
        return Err(format!("{} is outside {}..={}", i, min, max));
    }
    Ok(ValueVariant::Int(i))
}

fn to_float(value: &ValueVariant) -> Result<f64, String> {
    match value {
        ValueVariant::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|e| format!("'{}' is not a number: {}", s, e)),
        other => other
            .as_f64()
            .ok_or_else(|| format!("cannot convert {:?} to a number", other)),
    }
}

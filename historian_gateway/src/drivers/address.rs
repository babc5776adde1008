//! Controller address parsing.
//!
//! Accepted forms:
//! - `DB1.DBX0.3`, `DB1.DBB2`, `DB1.DBW4`, `DB1.DBD8` (data block, typed offset)
//! - `DB5.10` (data block, bare byte offset; used for string spans)
//! - `M10.2`, `MW20`, `I0.0`, `Q1.7` (flag, input and output areas)

use crate::error::{GatewayError, GatewayResult};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryArea {
    DataBlock,
    Memory,
    Input,
    Output,
}

/// Parsed location of a tag in controller memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Location {
    pub area: MemoryArea,
    /// Data block number; 0 outside data blocks.
    pub block: u16,
    /// Byte offset inside the area.
    pub offset: u32,
    pub bit: Option<u8>,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.area {
            MemoryArea::DataBlock => write!(f, "DB{}.{}", self.block, self.offset)?,
            MemoryArea::Memory => write!(f, "M{}", self.offset)?,
            MemoryArea::Input => write!(f, "I{}", self.offset)?,
            MemoryArea::Output => write!(f, "Q{}", self.offset)?,
        }
        if let Some(bit) = self.bit {
            write!(f, ".{}", bit)?;
        }
        Ok(())
    }
}

/// Pull the single run of digits out of `segment`, ignoring non-digit
/// characters around it. Two separate digit runs are rejected.
fn digits(address: &str, segment: &str, what: &str) -> GatewayResult<u32> {
    let start = segment
        .find(|c: char| c.is_ascii_digit())
        .ok_or_else(|| GatewayError::address(address, format!("missing {}", what)))?;
    let rest = &segment[start..];
    let end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    if rest[end..].chars().any(|c| c.is_ascii_digit()) {
        return Err(GatewayError::address(
            address,
            format!("ambiguous {} in '{}'", what, segment),
        ));
    }
    rest[..end]
        .parse::<u32>()
        .map_err(|e| GatewayError::address(address, format!("{} out of range: {}", what, e)))
}

fn bit(address: &str, segment: Option<&str>) -> GatewayResult<Option<u8>> {
    match segment {
        None => Ok(None),
        Some(s) => {
            let b = digits(address, s, "bit offset")?;
            if b > 7 {
                return Err(GatewayError::address(address, format!("bit offset {} > 7", b)));
            }
            Ok(Some(b as u8))
        }
    }
}

pub fn parse_address(address: &str) -> GatewayResult<Location> {
    let trimmed = address.trim();
    if trimmed.is_empty() {
        return Err(GatewayError::address(address, "empty address"));
    }
    let upper = trimmed.to_ascii_uppercase();
    let mut parts = upper.split('.');
    let head = parts.next().unwrap_or_default();

    if head.starts_with("DB") {
        let block = digits(address, &head[2..], "block number")?;
        let block = u16::try_from(block)
            .map_err(|_| GatewayError::address(address, format!("block {} too large", block)))?;
        let field = parts
            .next()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| GatewayError::address(address, "missing field offset after '.'"))?;
        let offset = digits(address, field, "field offset")?;
        let bit = bit(address, parts.next())?;
        if parts.next().is_some() {
            return Err(GatewayError::address(address, "too many '.' separators"));
        }
        return Ok(Location {
            area: MemoryArea::DataBlock,
            block,
            offset,
            bit,
        });
    }

    let area = match head.chars().next() {
        Some('M') => MemoryArea::Memory,
        Some('I') | Some('E') => MemoryArea::Input,
        Some('Q') | Some('A') => MemoryArea::Output,
        _ => {
            return Err(GatewayError::address(
                address,
                "expected DB<n>.<offset>, M, I or Q area",
            ))
        }
    };
    let offset = digits(address, &head[1..], "byte offset")?;
    let bit = bit(address, parts.next())?;
    if parts.next().is_some() {
        return Err(GatewayError::address(address, "too many '.' separators"));
    }
    Ok(Location {
        area,
        block: 0,
        offset,
        bit,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_block_forms() {
        let loc = parse_address("DB1.DBW4").unwrap();
        assert_eq!((loc.area, loc.block, loc.offset, loc.bit), (MemoryArea::DataBlock, 1, 4, None));

        let loc = parse_address("db12.dbx7.5").unwrap();
        assert_eq!((loc.block, loc.offset, loc.bit), (12, 7, Some(5)));

        let loc = parse_address(" DB3.20 ").unwrap();
        assert_eq!((loc.block, loc.offset), (3, 20));
    }

    #[test]
    fn other_areas() {
        assert_eq!(parse_address("M10.2").unwrap().bit, Some(2));
        assert_eq!(parse_address("MW20").unwrap().offset, 20);
        assert_eq!(parse_address("Q1.7").unwrap().area, MemoryArea::Output);
    }

    #[test]
    fn malformed_addresses_fail_fast() {
        for bad in ["", "DB.DBW4", "DB1", "DB1.", "DB1.DBW", "DB1.DBX0.9", "X5", "DB1.DBW4.1.2", "DB1.4X5"] {
            match parse_address(bad) {
                Err(GatewayError::AddressParse { .. }) => {}
                other => panic!("{:?} parsed as {:?}", bad, other),
            }
        }
    }
}

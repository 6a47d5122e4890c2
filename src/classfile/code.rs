//! Method body scanning.
//!
//! Walks a `Code` attribute's instruction stream and keeps only the
//! method-invocation opcodes. Every other instruction is stepped over using
//! its encoded length; `tableswitch`, `lookupswitch` and the `wide` prefix
//! have data-dependent lengths and are measured explicitly.

use super::constant_pool::ConstantPool;
use super::descriptor::{canonical_class_name, decode_method_descriptor};
use super::error::{Error, Result};

const INVOKEVIRTUAL: u8 = 0xb6;
const INVOKESPECIAL: u8 = 0xb7;
const INVOKESTATIC: u8 = 0xb8;
const INVOKEINTERFACE: u8 = 0xb9;
const INVOKEDYNAMIC: u8 = 0xba;

/// Which invocation opcode produced a call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvokeKind {
    Virtual,
    Special,
    Static,
    Interface,
}

/// One method-invocation instruction, resolved against the constant pool.
#[derive(Debug, Clone)]
pub struct CallSite {
    /// Canonical owner type name.
    pub owner: String,
    /// Target method simple name (`<init>` preserved).
    pub name: String,
    /// Canonical parameter type names from the target descriptor.
    pub params: Vec<String>,
    pub kind: InvokeKind,
    /// 1-based source line of the call site, when the method has a line table.
    pub line: Option<u32>,
}

impl CallSite {
    /// A constructor invocation via `invokespecial`.
    pub fn is_constructor_call(&self) -> bool {
        self.kind == InvokeKind::Special && self.name == "<init>"
    }
}

/// Scan a `Code` attribute's instruction bytes for invocation sites.
///
/// `line_table` is the decoded `LineNumberTable` as `(start_pc, line)`
/// pairs; a call site takes the line of the latest entry at or before its
/// offset.
pub fn scan_invocations(
    code: &[u8],
    cp: &ConstantPool,
    line_table: &[(u16, u16)],
) -> Result<Vec<CallSite>> {
    let mut calls = Vec::new();
    let mut offset = 0usize;
    while offset < code.len() {
        let opcode = code[offset];
        let length = instruction_length(code, offset)?;
        if length == 0 || offset + length > code.len() {
            return Err(Error::InvalidBytecode(offset));
        }

        match opcode {
            INVOKEVIRTUAL | INVOKESPECIAL | INVOKESTATIC | INVOKEINTERFACE => {
                let index = read_u16(code, offset + 1)?;
                let method_ref = cp.get_method_ref(index)?;
                let sig = decode_method_descriptor(&method_ref.descriptor)?;
                let kind = match opcode {
                    INVOKESPECIAL => InvokeKind::Special,
                    INVOKESTATIC => InvokeKind::Static,
                    INVOKEINTERFACE => InvokeKind::Interface,
                    _ => InvokeKind::Virtual,
                };
                calls.push(CallSite {
                    owner: canonical_class_name(&method_ref.owner),
                    name: method_ref.name,
                    params: sig.params,
                    kind,
                    line: line_at(line_table, offset),
                });
            }
            // invokedynamic targets a bootstrap method, not a named
            // owner/method pair, so it contributes no call edge.
            INVOKEDYNAMIC => {}
            _ => {}
        }

        offset += length;
    }
    Ok(calls)
}

fn line_at(line_table: &[(u16, u16)], offset: usize) -> Option<u32> {
    let mut best: Option<u32> = None;
    for &(start_pc, line) in line_table {
        if start_pc as usize <= offset {
            best = Some(line as u32);
        } else {
            break;
        }
    }
    best
}

fn instruction_length(code: &[u8], offset: usize) -> Result<usize> {
    let opcode = code[offset];
    let length = match opcode {
        0x00..=0x0f => 1,
        0x10 => 2,
        0x11 => 3,
        0x12 => 2,
        0x13 | 0x14 => 3,
        0x15..=0x19 => 2,
        0x1a..=0x35 => 1,
        0x36..=0x3a => 2,
        0x3b..=0x5f => 1,
        0x60..=0x83 => 1,
        0x84 => 3,
        0x85..=0x98 => 1,
        0x99..=0xa8 => 3,
        0xa9 => 2,
        0xaa => tableswitch_length(code, offset)?,
        0xab => lookupswitch_length(code, offset)?,
        0xac..=0xb1 => 1,
        0xb2..=0xb5 => 3,
        0xb6..=0xb8 => 3,
        0xb9 | 0xba => 5,
        0xbb => 3,
        0xbc => 2,
        0xbd => 3,
        0xbe | 0xbf => 1,
        0xc0 | 0xc1 => 3,
        0xc2 | 0xc3 => 1,
        0xc4 => wide_length(code, offset)?,
        0xc5 => 4,
        0xc6 | 0xc7 => 3,
        0xc8 | 0xc9 => 5,
        0xca => 1,
        0xfe | 0xff => 1,
        _ => return Err(Error::InvalidBytecode(offset)),
    };
    Ok(length)
}

fn tableswitch_length(code: &[u8], offset: usize) -> Result<usize> {
    let padding = switch_padding(offset);
    let base = offset + 1 + padding;
    let low = read_u32(code, base + 4)? as i32;
    let high = read_u32(code, base + 8)? as i32;
    let count = (high as i64)
        .checked_sub(low as i64)
        .and_then(|v| v.checked_add(1))
        .filter(|v| *v >= 0)
        .ok_or(Error::InvalidBytecode(offset))?;
    Ok(1 + padding + 12 + (count as usize) * 4)
}

fn lookupswitch_length(code: &[u8], offset: usize) -> Result<usize> {
    let padding = switch_padding(offset);
    let base = offset + 1 + padding;
    let npairs = read_u32(code, base + 4)?;
    Ok(1 + padding + 8 + (npairs as usize) * 8)
}

fn wide_length(code: &[u8], offset: usize) -> Result<usize> {
    let modified = code.get(offset + 1).copied().ok_or(Error::InvalidBytecode(offset))?;
    // wide iinc carries two extra operand bytes.
    if modified == 0x84 {
        Ok(6)
    } else {
        Ok(4)
    }
}

fn switch_padding(offset: usize) -> usize {
    (4 - ((offset + 1) % 4)) % 4
}

fn read_u16(code: &[u8], offset: usize) -> Result<u16> {
    let slice = code
        .get(offset..offset + 2)
        .ok_or(Error::InvalidBytecode(offset))?;
    Ok(u16::from_be_bytes([slice[0], slice[1]]))
}

fn read_u32(code: &[u8], offset: usize) -> Result<u32> {
    let slice = code
        .get(offset..offset + 4)
        .ok_or(Error::InvalidBytecode(offset))?;
    Ok(u32::from_be_bytes([slice[0], slice[1], slice[2], slice[3]]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_at_picks_latest_entry_before_offset() {
        let table = [(0u16, 10u16), (4, 12), (9, 15)];
        assert_eq!(line_at(&table, 0), Some(10));
        assert_eq!(line_at(&table, 5), Some(12));
        assert_eq!(line_at(&table, 20), Some(15));
        assert_eq!(line_at(&[], 3), None);
    }

    #[test]
    fn test_instruction_length_simple_opcodes() {
        // nop, aload_0, return
        assert_eq!(instruction_length(&[0x00], 0).unwrap(), 1);
        assert_eq!(instruction_length(&[0x2a], 0).unwrap(), 1);
        assert_eq!(instruction_length(&[0xb1], 0).unwrap(), 1);
        // invokevirtual
        assert_eq!(instruction_length(&[0xb6, 0x00, 0x01], 0).unwrap(), 3);
        // invokeinterface
        assert_eq!(
            instruction_length(&[0xb9, 0x00, 0x01, 0x01, 0x00], 0).unwrap(),
            5
        );
    }

    #[test]
    fn test_tableswitch_length_includes_padding() {
        // tableswitch at offset 0: 3 padding bytes, default, low=0, high=1,
        // two 4-byte jump offsets.
        let mut code = vec![0xaa];
        code.extend_from_slice(&[0, 0, 0]); // padding to offset 4
        code.extend_from_slice(&0i32.to_be_bytes()); // default
        code.extend_from_slice(&0i32.to_be_bytes()); // low
        code.extend_from_slice(&1i32.to_be_bytes()); // high
        code.extend_from_slice(&0i32.to_be_bytes());
        code.extend_from_slice(&0i32.to_be_bytes());
        assert_eq!(instruction_length(&code, 0).unwrap(), code.len());
    }

    #[test]
    fn test_wide_iinc_length() {
        assert_eq!(
            instruction_length(&[0xc4, 0x84, 0, 1, 0, 5], 0).unwrap(),
            6
        );
        assert_eq!(instruction_length(&[0xc4, 0x15, 0, 1], 0).unwrap(), 4);
    }
}

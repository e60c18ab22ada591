//! Bytecode representation and binary serialization.
//!
//! A compiled buffer is laid out as:
//!
//! ```text
//! BytecodeHeader { "JINX", version: u32, data_size: u32 }
//! <opcode stream>
//! [ DebugHeader { "JDBG", line_entry_count: u32, data_size: u32 }
//!   script name, line entries ]
//! ```
//!
//! All multi-byte integers are little-endian. Strings serialize as a u32
//! length, the UTF-8 bytes, and a NUL terminator. Jump addresses are absolute
//! byte offsets into the buffer.

use std::sync::Arc;

#[cfg(test)]
use crate::variant::Variant;

const fn make_four_cc(a: u8, b: u8, c: u8, d: u8) -> u32 {
    (a as u32) | ((b as u32) << 8) | ((c as u32) << 16) | ((d as u32) << 24)
}

/// `JINX`, leading every compiled buffer.
pub(crate) const BYTECODE_SIGNATURE: u32 = make_four_cc(b'J', b'I', b'N', b'X');

/// Current bytecode format version.
pub(crate) const BYTECODE_VERSION: u32 = 1;

/// `JDBG`, leading the optional debug section.
pub(crate) const DEBUG_SIGNATURE: u32 = make_four_cc(b'J', b'D', b'B', b'G');

/// Size in bytes of the serialized [`BytecodeHeader`].
pub(crate) const BYTECODE_HEADER_SIZE: usize = 12;

/// Fixed header of a compiled buffer.
#[derive(Debug, Clone, Copy)]
pub(crate) struct BytecodeHeader {
    pub signature: u32,
    pub version: u32,
    /// Size of header plus opcode stream, excluding the debug section.
    pub data_size: u32,
}

impl BytecodeHeader {
    pub(crate) fn write(&self, writer: &mut BinaryWriter) {
        writer.write_u32(self.signature);
        writer.write_u32(self.version);
        writer.write_u32(self.data_size);
    }

    pub(crate) fn read(reader: &mut BinaryReader) -> Option<Self> {
        Some(Self {
            signature: reader.read_u32()?,
            version: reader.read_u32()?,
            data_size: reader.read_u32()?,
        })
    }

    pub(crate) fn is_valid(&self) -> bool {
        self.signature == BYTECODE_SIGNATURE && self.version == BYTECODE_VERSION
    }
}

/// One source-line record in the debug section.
#[derive(Debug, Clone, Copy)]
pub(crate) struct DebugLineEntry {
    /// Absolute byte offset of the first opcode of the line.
    pub opcode_position: u32,
    /// 1-based source line number.
    pub line_number: u32,
}

/// All VM opcodes. The discriminant is the serialized byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub(crate) enum Opcode {
    Add,
    And,
    CallFunc,
    Cast,
    Decrement,
    Divide,
    Equals,
    EraseProp,
    ErasePropElem,
    EraseVar,
    EraseVarElem,
    Exit,
    Function,
    Greater,
    GreaterEq,
    Increment,
    Jump,
    JumpFalse,
    JumpFalseCheck,
    JumpTrue,
    JumpTrueCheck,
    Less,
    LessEq,
    Library,
    LoopCount,
    LoopOver,
    Mod,
    Multiply,
    Negate,
    Not,
    NotEquals,
    Or,
    Pop,
    PopCount,
    Property,
    PushColl,
    PushItr,
    PushKeyVal,
    PushList,
    PushProp,
    PushPropKeyVal,
    PushTop,
    PushVal,
    PushVar,
    PushVarKey,
    Return,
    ScopeBegin,
    ScopeEnd,
    SetIndex,
    SetProp,
    SetPropKeyVal,
    SetVar,
    SetVarKey,
    Subtract,
    Type,
    Wait,
}

impl Opcode {
    const ALL: [Self; 56] = [
        Self::Add,
        Self::And,
        Self::CallFunc,
        Self::Cast,
        Self::Decrement,
        Self::Divide,
        Self::Equals,
        Self::EraseProp,
        Self::ErasePropElem,
        Self::EraseVar,
        Self::EraseVarElem,
        Self::Exit,
        Self::Function,
        Self::Greater,
        Self::GreaterEq,
        Self::Increment,
        Self::Jump,
        Self::JumpFalse,
        Self::JumpFalseCheck,
        Self::JumpTrue,
        Self::JumpTrueCheck,
        Self::Less,
        Self::LessEq,
        Self::Library,
        Self::LoopCount,
        Self::LoopOver,
        Self::Mod,
        Self::Multiply,
        Self::Negate,
        Self::Not,
        Self::NotEquals,
        Self::Or,
        Self::Pop,
        Self::PopCount,
        Self::Property,
        Self::PushColl,
        Self::PushItr,
        Self::PushKeyVal,
        Self::PushList,
        Self::PushProp,
        Self::PushPropKeyVal,
        Self::PushTop,
        Self::PushVal,
        Self::PushVar,
        Self::PushVarKey,
        Self::Return,
        Self::ScopeBegin,
        Self::ScopeEnd,
        Self::SetIndex,
        Self::SetProp,
        Self::SetPropKeyVal,
        Self::SetVar,
        Self::SetVarKey,
        Self::Subtract,
        Self::Type,
        Self::Wait,
    ];

    pub(crate) fn to_byte(self) -> u8 {
        self as u8
    }

    pub(crate) fn from_byte(byte: u8) -> Option<Self> {
        Self::ALL.get(byte as usize).copied()
    }
}

/// A compiled, immutable bytecode buffer.
///
/// Cloning is cheap; scripts, function definitions, and coroutines all share
/// the same underlying bytes.
#[derive(Debug, Clone)]
pub struct Bytecode {
    data: Arc<Vec<u8>>,
}

impl Bytecode {
    pub(crate) fn new(data: Vec<u8>) -> Self {
        Self {
            data: Arc::new(data),
        }
    }

    /// Wraps raw bytes (e.g. bytecode loaded from a cache) as a buffer.
    ///
    /// The content is validated when a script is created from it, not here.
    #[must_use]
    pub fn from_bytes(data: Vec<u8>) -> Self {
        Self::new(data)
    }

    /// Borrows the raw bytes of the buffer.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Total size of the buffer in bytes, including any debug section.
    #[must_use]
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

/// Sequential little-endian reader over a byte slice.
///
/// Every read returns `None` past the end of the data, so malformed bytecode
/// surfaces as a runtime error rather than a panic.
pub(crate) struct BinaryReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> BinaryReader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub(crate) fn tell(&self) -> usize {
        self.pos
    }

    pub(crate) fn seek(&mut self, pos: usize) {
        self.pos = pos;
    }

    pub(crate) fn read_bytes(&mut self, count: usize) -> Option<&'a [u8]> {
        let end = self.pos.checked_add(count)?;
        let bytes = self.data.get(self.pos..end)?;
        self.pos = end;
        Some(bytes)
    }

    pub(crate) fn read_u8(&mut self) -> Option<u8> {
        let b = *self.data.get(self.pos)?;
        self.pos += 1;
        Some(b)
    }

    pub(crate) fn read_bool(&mut self) -> Option<bool> {
        Some(self.read_u8()? != 0)
    }

    pub(crate) fn read_u32(&mut self) -> Option<u32> {
        let bytes = self.read_bytes(4)?;
        Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub(crate) fn read_i32(&mut self) -> Option<i32> {
        self.read_u32().map(|v| v as i32)
    }

    pub(crate) fn read_u64(&mut self) -> Option<u64> {
        let bytes = self.read_bytes(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(bytes);
        Some(u64::from_le_bytes(raw))
    }

    pub(crate) fn read_i64(&mut self) -> Option<i64> {
        self.read_u64().map(|v| v as i64)
    }

    pub(crate) fn read_f64(&mut self) -> Option<f64> {
        self.read_u64().map(f64::from_bits)
    }

    /// Reads a length-prefixed, NUL-terminated string.
    pub(crate) fn read_str(&mut self) -> Option<String> {
        let length = self.read_u32()? as usize;
        let bytes = self.read_bytes(length)?;
        let text = std::str::from_utf8(bytes).ok()?.to_owned();
        // Skip the NUL terminator.
        self.read_u8()?;
        Some(text)
    }
}

/// Sequential little-endian writer with seek support for jump backfilling.
#[derive(Debug, Default)]
pub(crate) struct BinaryWriter {
    data: Vec<u8>,
    pos: usize,
}

impl BinaryWriter {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn tell(&self) -> usize {
        self.pos
    }

    pub(crate) fn seek(&mut self, pos: usize) {
        self.pos = pos;
    }

    pub(crate) fn write_bytes(&mut self, bytes: &[u8]) {
        let end = self.pos + bytes.len();
        if end > self.data.len() {
            self.data.resize(end, 0);
        }
        self.data[self.pos..end].copy_from_slice(bytes);
        self.pos = end;
    }

    pub(crate) fn write_u8(&mut self, value: u8) {
        self.write_bytes(&[value]);
    }

    pub(crate) fn write_bool(&mut self, value: bool) {
        self.write_u8(u8::from(value));
    }

    pub(crate) fn write_u32(&mut self, value: u32) {
        self.write_bytes(&value.to_le_bytes());
    }

    pub(crate) fn write_i32(&mut self, value: i32) {
        self.write_u32(value as u32);
    }

    pub(crate) fn write_u64(&mut self, value: u64) {
        self.write_bytes(&value.to_le_bytes());
    }

    pub(crate) fn write_i64(&mut self, value: i64) {
        self.write_u64(value as u64);
    }

    pub(crate) fn write_f64(&mut self, value: f64) {
        self.write_u64(value.to_bits());
    }

    /// Writes a length-prefixed, NUL-terminated string.
    pub(crate) fn write_str(&mut self, value: &str) {
        self.write_u32(value.len() as u32);
        self.write_bytes(value.as_bytes());
        self.write_u8(0);
    }

    pub(crate) fn into_bytecode(self) -> Bytecode {
        Bytecode::new(self.data)
    }
}

/// Parsed form of a buffer's debug section.
#[derive(Debug, Default, Clone)]
pub(crate) struct DebugInfo {
    pub script_name: String,
    pub line_entries: Vec<DebugLineEntry>,
}

impl DebugInfo {
    /// Reads the debug section trailing the opcode stream, if present.
    pub(crate) fn read(bytecode: &Bytecode) -> Option<Self> {
        let mut reader = BinaryReader::new(bytecode.as_bytes());
        let header = BytecodeHeader::read(&mut reader)?;
        if !header.is_valid() || (header.data_size as usize) >= bytecode.size() {
            return None;
        }
        reader.seek(header.data_size as usize);
        if reader.read_u32()? != DEBUG_SIGNATURE {
            return None;
        }
        let line_entry_count = reader.read_u32()?;
        let _data_size = reader.read_u32()?;
        let script_name = reader.read_str()?;
        let mut line_entries = Vec::with_capacity(line_entry_count as usize);
        for _ in 0..line_entry_count {
            line_entries.push(DebugLineEntry {
                opcode_position: reader.read_u32()?,
                line_number: reader.read_u32()?,
            });
        }
        Some(Self {
            script_name,
            line_entries,
        })
    }

    /// The source line of the instruction at `position`, when known.
    pub(crate) fn line_at(&self, position: usize) -> Option<u32> {
        let mut line = None;
        for entry in &self.line_entries {
            if (entry.opcode_position as usize) > position {
                break;
            }
            line = Some(entry.line_number);
        }
        line
    }
}

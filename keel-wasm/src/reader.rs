//! A cursor over raw function-body bytecode.
//!
//! The module as a whole is decoded and validated upstream, but function
//! bodies reach the translator as raw bytes: this reader decodes the
//! opcode stream and its LEB128 / little-endian immediates. Since the body
//! was validated, a malformed encoding here indicates a bug in the
//! validator or corrupted memory; errors carry the byte offset and are
//! treated by callers as unrecoverable.

use crate::environ::{WasmError, WasmResult};
use crate::module::ValType;
use crate::operators::BlockType;

/// A byte cursor with Wasm immediate decoding.
pub struct BytecodeReader<'a> {
    bytes: &'a [u8],
    position: usize,
}

impl<'a> BytecodeReader<'a> {
    /// Read from `bytes`, starting at the beginning.
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, position: 0 }
    }

    /// The current byte offset from the start of the body.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Has the reader consumed all bytes?
    pub fn eof(&self) -> bool {
        self.position >= self.bytes.len()
    }

    /// The number of bytes left.
    pub fn bytes_remaining(&self) -> usize {
        self.bytes.len() - self.position
    }

    fn error(&self, message: impl Into<String>) -> WasmError {
        WasmError::InvalidBytecode {
            message: message.into(),
            offset: self.position,
        }
    }

    /// Read one byte.
    pub fn read_byte(&mut self) -> WasmResult<u8> {
        let byte = *self
            .bytes
            .get(self.position)
            .ok_or_else(|| self.error("unexpected end of function body"))?;
        self.position += 1;
        Ok(byte)
    }

    fn peek_byte(&self) -> WasmResult<u8> {
        self.bytes
            .get(self.position)
            .copied()
            .ok_or_else(|| self.error("unexpected end of function body"))
    }

    /// Read an unsigned LEB128 integer of at most 32 bits.
    pub fn read_var_u32(&mut self) -> WasmResult<u32> {
        let mut result: u32 = 0;
        let mut shift = 0;
        loop {
            let byte = self.read_byte()?;
            if shift == 28 && byte & 0xf0 != 0 {
                return Err(self.error("overlong unsigned LEB128"));
            }
            result |= u32::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                return Ok(result);
            }
            shift += 7;
            if shift >= 32 {
                return Err(self.error("unsigned LEB128 exceeds 32 bits"));
            }
        }
    }

    /// Read a signed LEB128 integer of at most 32 bits.
    pub fn read_var_i32(&mut self) -> WasmResult<i32> {
        let mut result: i32 = 0;
        let mut shift = 0;
        loop {
            let byte = self.read_byte()?;
            result |= i32::from(byte & 0x7f) << shift;
            shift += 7;
            if byte & 0x80 == 0 {
                if shift < 32 && byte & 0x40 != 0 {
                    result |= -1 << shift;
                }
                return Ok(result);
            }
            if shift >= 32 {
                return Err(self.error("signed LEB128 exceeds 32 bits"));
            }
        }
    }

    /// Read a signed LEB128 integer of at most 64 bits.
    pub fn read_var_i64(&mut self) -> WasmResult<i64> {
        let mut result: i64 = 0;
        let mut shift = 0;
        loop {
            let byte = self.read_byte()?;
            result |= i64::from(byte & 0x7f) << shift;
            shift += 7;
            if byte & 0x80 == 0 {
                if shift < 64 && byte & 0x40 != 0 {
                    result |= -1 << shift;
                }
                return Ok(result);
            }
            if shift >= 64 {
                return Err(self.error("signed LEB128 exceeds 64 bits"));
            }
        }
    }

    /// Read the raw bits of an `f32.const` immediate (little-endian).
    pub fn read_f32_bits(&mut self) -> WasmResult<u32> {
        let mut bytes = [0; 4];
        for byte in &mut bytes {
            *byte = self.read_byte()?;
        }
        Ok(u32::from_le_bytes(bytes))
    }

    /// Read the raw bits of an `f64.const` immediate (little-endian).
    pub fn read_f64_bits(&mut self) -> WasmResult<u64> {
        let mut bytes = [0; 8];
        for byte in &mut bytes {
            *byte = self.read_byte()?;
        }
        Ok(u64::from_le_bytes(bytes))
    }

    /// Read a value type byte.
    pub fn read_val_type(&mut self) -> WasmResult<ValType> {
        let byte = self.read_byte()?;
        val_type_from_byte(byte).ok_or_else(|| self.error(format!("invalid value type 0x{byte:02x}")))
    }

    /// Read a block type: empty, a single result type, or an index into the
    /// type section encoded as a positive signed 33-bit LEB128.
    pub fn read_block_type(&mut self) -> WasmResult<BlockType> {
        let byte = self.peek_byte()?;
        if byte == 0x40 {
            self.position += 1;
            return Ok(BlockType::Empty);
        }
        if let Some(ty) = val_type_from_byte(byte) {
            self.position += 1;
            return Ok(BlockType::Value(ty));
        }
        let index = self.read_var_s33()?;
        if index < 0 {
            return Err(self.error("negative block type index"));
        }
        Ok(BlockType::Func(index as u32))
    }

    /// Read the `(align, offset)` immediate of a memory access.
    pub fn read_memarg(&mut self) -> WasmResult<(u32, u32)> {
        let align = self.read_var_u32()?;
        let offset = self.read_var_u32()?;
        Ok((align, offset))
    }

    fn read_var_s33(&mut self) -> WasmResult<i64> {
        let mut result: i64 = 0;
        let mut shift = 0;
        loop {
            let byte = self.read_byte()?;
            result |= i64::from(byte & 0x7f) << shift;
            shift += 7;
            if byte & 0x80 == 0 {
                if shift < 64 && byte & 0x40 != 0 {
                    result |= -1 << shift;
                }
                return Ok(result);
            }
            if shift >= 35 {
                return Err(self.error("signed LEB128 exceeds 33 bits"));
            }
        }
    }
}

fn val_type_from_byte(byte: u8) -> Option<ValType> {
    match byte {
        0x7f => Some(ValType::I32),
        0x7e => Some(ValType::I64),
        0x7d => Some(ValType::F32),
        0x7c => Some(ValType::F64),
        0x7b => Some(ValType::V128),
        0x70 => Some(ValType::FuncRef),
        0x6f => Some(ValType::ExternRef),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn var_u32() {
        let mut r = BytecodeReader::new(&[0x00, 0x7f, 0xe5, 0x8e, 0x26]);
        assert_eq!(r.read_var_u32().unwrap(), 0);
        assert_eq!(r.read_var_u32().unwrap(), 127);
        assert_eq!(r.read_var_u32().unwrap(), 624485);
        assert!(r.eof());
    }

    #[test]
    fn var_i32_negative() {
        // -1 and -123456 in signed LEB128.
        let mut r = BytecodeReader::new(&[0x7f, 0xc0, 0xbb, 0x78]);
        assert_eq!(r.read_var_i32().unwrap(), -1);
        assert_eq!(r.read_var_i32().unwrap(), -123456);
    }

    #[test]
    fn var_i64_extremes() {
        // i64::MIN is ten bytes.
        let mut r = BytecodeReader::new(&[
            0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x7f,
        ]);
        assert_eq!(r.read_var_i64().unwrap(), i64::MIN);
    }

    #[test]
    fn truncated_input_reports_offset() {
        let mut r = BytecodeReader::new(&[0x80]);
        match r.read_var_u32() {
            Err(WasmError::InvalidBytecode { offset, .. }) => assert_eq!(offset, 1),
            other => panic!("expected invalid bytecode, got {other:?}"),
        }
    }

    #[test]
    fn floats_are_little_endian() {
        let mut r = BytecodeReader::new(&[0x00, 0x00, 0x80, 0x3f]);
        assert_eq!(r.read_f32_bits().unwrap(), 0x3f80_0000);
    }

    #[test]
    fn block_types() {
        let mut r = BytecodeReader::new(&[0x40, 0x7f, 0x03]);
        assert_eq!(r.read_block_type().unwrap(), BlockType::Empty);
        assert_eq!(r.read_block_type().unwrap(), BlockType::Value(ValType::I32));
        assert_eq!(r.read_block_type().unwrap(), BlockType::Func(3));
    }
}

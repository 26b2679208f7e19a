//! Field framing for wire entries
//!
//! Matches the JVM `DataOutput`/`DataInput` conventions the shared store
//! already speaks: big-endian integers, one-byte booleans and strings as an
//! unsigned 16-bit byte length followed by modified UTF-8 (NUL as two bytes,
//! supplementary characters as two three-byte surrogates).

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::CodecError;

const MAX_UTF_LEN: usize = u16::MAX as usize;

/// Append-only writer for entry fields
#[derive(Debug, Default)]
pub struct DataWriter {
    buf: BytesMut,
}

impl DataWriter {
    /// Create an empty writer
    pub fn new() -> Self {
        Self::default()
    }

    /// Write a length-prefixed modified UTF-8 string
    pub fn write_utf(&mut self, value: &str) -> Result<(), CodecError> {
        let encoded_len: usize = value.encode_utf16().map(utf_unit_len).sum();
        if encoded_len > MAX_UTF_LEN {
            return Err(CodecError::StringTooLong(encoded_len));
        }

        self.buf.reserve(2 + encoded_len);
        self.buf.put_u16(encoded_len as u16);
        for unit in value.encode_utf16() {
            match unit {
                0x0001..=0x007f => self.buf.put_u8(unit as u8),
                0x0000 | 0x0080..=0x07ff => {
                    self.buf.put_u8(0xc0 | ((unit >> 6) & 0x1f) as u8);
                    self.buf.put_u8(0x80 | (unit & 0x3f) as u8);
                }
                _ => {
                    self.buf.put_u8(0xe0 | ((unit >> 12) & 0x0f) as u8);
                    self.buf.put_u8(0x80 | ((unit >> 6) & 0x3f) as u8);
                    self.buf.put_u8(0x80 | (unit & 0x3f) as u8);
                }
            }
        }
        Ok(())
    }

    /// Write a boolean as one byte
    pub fn write_bool(&mut self, value: bool) {
        self.buf.put_u8(u8::from(value));
    }

    /// Write a big-endian 32-bit integer
    pub fn write_i32(&mut self, value: i32) {
        self.buf.put_i32(value);
    }

    /// Write raw bytes with no framing
    pub fn write_fully(&mut self, data: &[u8]) {
        self.buf.put_slice(data);
    }

    /// Write a byte block preceded by its `i32` length
    pub fn write_sized(&mut self, data: &[u8]) -> Result<(), CodecError> {
        let len = i32::try_from(data.len())
            .map_err(|_| CodecError::InvalidLength(format!("{} bytes exceeds i32", data.len())))?;
        self.write_i32(len);
        self.write_fully(data);
        Ok(())
    }

    /// Bytes written so far
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Check if nothing has been written
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Finish writing
    pub fn freeze(self) -> Bytes {
        self.buf.freeze()
    }
}

fn utf_unit_len(unit: u16) -> usize {
    match unit {
        0x0001..=0x007f => 1,
        0x0000 | 0x0080..=0x07ff => 2,
        _ => 3,
    }
}

/// Cursor over encoded entry fields
#[derive(Debug)]
pub struct DataReader<'a> {
    buf: &'a [u8],
}

impl<'a> DataReader<'a> {
    /// Read from a byte slice
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    fn require(&self, needed: usize) -> Result<(), CodecError> {
        if self.buf.len() < needed {
            return Err(CodecError::UnexpectedEof {
                needed,
                remaining: self.buf.len(),
            });
        }
        Ok(())
    }

    /// Read a length-prefixed modified UTF-8 string
    pub fn read_utf(&mut self) -> Result<String, CodecError> {
        self.require(2)?;
        let len = self.buf.get_u16() as usize;
        let bytes = self.read_fully(len)?;

        let mut units = Vec::with_capacity(len);
        let mut i = 0;
        while i < bytes.len() {
            let b0 = bytes[i];
            let unit = match b0 >> 4 {
                0x0..=0x7 => {
                    i += 1;
                    b0 as u16
                }
                0xc | 0xd => {
                    let b1 = continuation(bytes, i + 1)?;
                    i += 2;
                    ((b0 as u16 & 0x1f) << 6) | (b1 as u16 & 0x3f)
                }
                0xe => {
                    let b1 = continuation(bytes, i + 1)?;
                    let b2 = continuation(bytes, i + 2)?;
                    i += 3;
                    ((b0 as u16 & 0x0f) << 12) | ((b1 as u16 & 0x3f) << 6) | (b2 as u16 & 0x3f)
                }
                _ => {
                    return Err(CodecError::InvalidUtf8(format!(
                        "malformed lead byte {:#04x} at {}",
                        b0, i
                    )))
                }
            };
            units.push(unit);
        }

        String::from_utf16(&units).map_err(|e| CodecError::InvalidUtf8(e.to_string()))
    }

    /// Read a one-byte boolean
    pub fn read_bool(&mut self) -> Result<bool, CodecError> {
        self.require(1)?;
        Ok(self.buf.get_u8() != 0)
    }

    /// Read a big-endian 32-bit integer
    pub fn read_i32(&mut self) -> Result<i32, CodecError> {
        self.require(4)?;
        Ok(self.buf.get_i32())
    }

    /// Read exactly `len` raw bytes
    pub fn read_fully(&mut self, len: usize) -> Result<&'a [u8], CodecError> {
        self.require(len)?;
        let (head, tail) = self.buf.split_at(len);
        self.buf = tail;
        Ok(head)
    }

    /// Read a byte block preceded by its `i32` length
    pub fn read_sized(&mut self) -> Result<&'a [u8], CodecError> {
        let len = self.read_i32()?;
        let len = usize::try_from(len)
            .map_err(|_| CodecError::InvalidLength(format!("negative data length {}", len)))?;
        self.read_fully(len)
    }

    /// Bytes not yet consumed
    pub fn remaining(&self) -> usize {
        self.buf.len()
    }

    /// Check if all input has been consumed
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

fn continuation(bytes: &[u8], at: usize) -> Result<u8, CodecError> {
    match bytes.get(at) {
        Some(b) if b & 0xc0 == 0x80 => Ok(*b),
        Some(b) => Err(CodecError::InvalidUtf8(format!(
            "bad continuation byte {:#04x} at {}",
            b, at
        ))),
        None => Err(CodecError::InvalidUtf8(
            "truncated multi-byte sequence".to_string(),
        )),
    }
}

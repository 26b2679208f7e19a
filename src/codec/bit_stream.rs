//! Bit-level I/O for packed boolean arrays
//!
//! Bits are packed most-significant first: the first boolean lands in bit 7
//! of the first byte, the ninth in bit 7 of the second byte.

use crate::error::CodecError;

/// Writer for bit-level operations
pub struct BitWriter {
    buffer: Vec<u8>,
    current_byte: u8,
    bit_position: u8,
}

impl BitWriter {
    /// Create a new bit writer
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Create a writer sized for `bits` bits
    pub fn with_capacity(bits: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(bits.div_ceil(8)),
            current_byte: 0,
            bit_position: 0,
        }
    }

    /// Write a single bit
    pub fn write_bit(&mut self, bit: bool) {
        if bit {
            self.current_byte |= 1 << (7 - self.bit_position);
        }

        self.bit_position += 1;
        debug_assert!(self.bit_position <= 8, "bit_position overflow");

        if self.bit_position >= 8 {
            self.buffer.push(self.current_byte);
            self.current_byte = 0;
            self.bit_position = 0;
        }
    }

    /// Flush the trailing partial byte (zero padded) and return the buffer
    pub fn finish(mut self) -> Vec<u8> {
        if self.bit_position > 0 {
            self.buffer.push(self.current_byte);
        }
        self.buffer
    }

    /// Current size in bytes, counting a partial byte
    pub fn len(&self) -> usize {
        let mut len = self.buffer.len();
        if self.bit_position > 0 {
            len += 1;
        }
        len
    }

    /// Check if nothing has been written
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty() && self.bit_position == 0
    }
}

impl Default for BitWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Reader for bit-level operations
pub struct BitReader<'a> {
    buffer: &'a [u8],
    byte_position: usize,
    bit_position: u8,
}

impl<'a> BitReader<'a> {
    /// Create a new bit reader
    pub fn new(buffer: &'a [u8]) -> Self {
        Self {
            buffer,
            byte_position: 0,
            bit_position: 0,
        }
    }

    /// Read a single bit
    pub fn read_bit(&mut self) -> Result<bool, CodecError> {
        let byte = *self
            .buffer
            .get(self.byte_position)
            .ok_or(CodecError::UnexpectedEof {
                needed: 1,
                remaining: 0,
            })?;
        let bit = (byte >> (7 - self.bit_position)) & 1 == 1;

        self.bit_position += 1;

        if self.bit_position >= 8 {
            self.byte_position += 1;
            self.bit_position = 0;
        }

        Ok(bit)
    }

    /// Bytes touched so far, counting a partially read byte
    pub fn bytes_consumed(&self) -> usize {
        self.byte_position + usize::from(self.bit_position > 0)
    }

    /// Check if we've reached the end
    pub fn is_at_end(&self) -> bool {
        self.byte_position >= self.buffer.len()
    }
}

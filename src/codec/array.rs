//! Big-endian scalar and array codec for value-set payloads
//!
//! Layouts:
//! - numeric scalars: fixed width, big-endian (`f32`/`f64` as IEEE-754 bits)
//! - numeric arrays: elements back to back, length implied by the byte count
//! - `bool` arrays: `i32` count, then the values bit-packed MSB first
//! - `String` arrays: `i32` count, `count` x `i32` byte lengths, then the
//!   UTF-8 bytes of every string concatenated
//!
//! Absent arrays are carried as `None` by [`encode_opt`] / [`decode_opt`].

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::bit_stream::{BitReader, BitWriter};
use crate::error::CodecError;

/// Types that encode as a single value
pub trait ScalarCodec: Sized {
    /// Append the encoded value
    fn encode_scalar(&self, out: &mut BytesMut) -> Result<(), CodecError>;

    /// Decode from exactly the bytes of one value
    fn decode_scalar(data: &[u8]) -> Result<Self, CodecError>;
}

/// Types that encode as a homogeneous array
pub trait ArrayCodec: Sized {
    /// Append the encoded array
    fn encode_array(values: &[Self], out: &mut BytesMut) -> Result<(), CodecError>;

    /// Decode an array occupying all of `data`
    fn decode_array(data: &[u8]) -> Result<Vec<Self>, CodecError>;
}

/// Encode a single value
pub fn encode_scalar<T: ScalarCodec>(value: &T) -> Result<Bytes, CodecError> {
    let mut out = BytesMut::new();
    value.encode_scalar(&mut out)?;
    Ok(out.freeze())
}

/// Decode a single value
pub fn decode_scalar<T: ScalarCodec>(data: &[u8]) -> Result<T, CodecError> {
    T::decode_scalar(data)
}

/// Encode an array
pub fn encode<T: ArrayCodec>(values: &[T]) -> Result<Bytes, CodecError> {
    let mut out = BytesMut::new();
    T::encode_array(values, &mut out)?;
    Ok(out.freeze())
}

/// Decode an array
pub fn decode<T: ArrayCodec>(data: &[u8]) -> Result<Vec<T>, CodecError> {
    T::decode_array(data)
}

/// Encode an array that may be absent
pub fn encode_opt<T: ArrayCodec>(values: Option<&[T]>) -> Result<Option<Bytes>, CodecError> {
    values.map(encode).transpose()
}

/// Decode an array that may be absent
pub fn decode_opt<T: ArrayCodec>(data: Option<&[u8]>) -> Result<Option<Vec<T>>, CodecError> {
    data.map(decode).transpose()
}

fn count_to_i32(count: usize) -> Result<i32, CodecError> {
    i32::try_from(count).map_err(|_| CodecError::InvalidLength(format!("{} exceeds i32", count)))
}

fn read_count(buf: &mut &[u8], what: &str) -> Result<usize, CodecError> {
    if buf.remaining() < 4 {
        return Err(CodecError::UnexpectedEof {
            needed: 4,
            remaining: buf.remaining(),
        });
    }
    let count = buf.get_i32();
    usize::try_from(count)
        .map_err(|_| CodecError::InvalidLength(format!("negative {} {}", what, count)))
}

macro_rules! fixed_width_codec {
    ($ty:ty, $width:expr, $put:ident, $get:ident) => {
        impl ScalarCodec for $ty {
            fn encode_scalar(&self, out: &mut BytesMut) -> Result<(), CodecError> {
                out.$put(*self);
                Ok(())
            }

            fn decode_scalar(data: &[u8]) -> Result<Self, CodecError> {
                if data.len() != $width {
                    return Err(CodecError::InvalidLength(format!(
                        "{} expects {} bytes, got {}",
                        stringify!($ty),
                        $width,
                        data.len()
                    )));
                }
                let mut buf = data;
                Ok(buf.$get())
            }
        }

        impl ArrayCodec for $ty {
            fn encode_array(values: &[Self], out: &mut BytesMut) -> Result<(), CodecError> {
                out.reserve(values.len() * $width);
                for value in values {
                    out.$put(*value);
                }
                Ok(())
            }

            fn decode_array(data: &[u8]) -> Result<Vec<Self>, CodecError> {
                if data.len() % $width != 0 {
                    return Err(CodecError::InvalidLength(format!(
                        "{} bytes is not a multiple of the {} width {}",
                        data.len(),
                        stringify!($ty),
                        $width
                    )));
                }
                let mut buf = data;
                let mut values = Vec::with_capacity(data.len() / $width);
                while buf.has_remaining() {
                    values.push(buf.$get());
                }
                Ok(values)
            }
        }
    };
}

fixed_width_codec!(i8, 1, put_i8, get_i8);
fixed_width_codec!(u8, 1, put_u8, get_u8);
fixed_width_codec!(i16, 2, put_i16, get_i16);
fixed_width_codec!(i32, 4, put_i32, get_i32);
fixed_width_codec!(i64, 8, put_i64, get_i64);
fixed_width_codec!(f32, 4, put_f32, get_f32);
fixed_width_codec!(f64, 8, put_f64, get_f64);

impl ScalarCodec for bool {
    fn encode_scalar(&self, out: &mut BytesMut) -> Result<(), CodecError> {
        out.put_u8(u8::from(*self));
        Ok(())
    }

    fn decode_scalar(data: &[u8]) -> Result<Self, CodecError> {
        match data {
            [byte] => Ok(*byte != 0),
            _ => Err(CodecError::InvalidLength(format!(
                "bool expects 1 byte, got {}",
                data.len()
            ))),
        }
    }
}

impl ArrayCodec for bool {
    fn encode_array(values: &[Self], out: &mut BytesMut) -> Result<(), CodecError> {
        out.put_i32(count_to_i32(values.len())?);
        let mut bits = BitWriter::with_capacity(values.len());
        for value in values {
            bits.write_bit(*value);
        }
        out.put_slice(&bits.finish());
        Ok(())
    }

    fn decode_array(data: &[u8]) -> Result<Vec<Self>, CodecError> {
        let mut buf = data;
        let count = read_count(&mut buf, "bool count")?;
        let packed = count.div_ceil(8);
        if buf.len() != packed {
            return Err(CodecError::InvalidLength(format!(
                "{} bools need {} packed bytes, got {}",
                count,
                packed,
                buf.len()
            )));
        }

        let mut reader = BitReader::new(buf);
        let mut values = Vec::with_capacity(count);
        for _ in 0..count {
            values.push(reader.read_bit()?);
        }
        Ok(values)
    }
}

impl ScalarCodec for String {
    fn encode_scalar(&self, out: &mut BytesMut) -> Result<(), CodecError> {
        out.put_slice(self.as_bytes());
        Ok(())
    }

    fn decode_scalar(data: &[u8]) -> Result<Self, CodecError> {
        String::from_utf8(data.to_vec()).map_err(|e| CodecError::InvalidUtf8(e.to_string()))
    }
}

impl ArrayCodec for String {
    fn encode_array(values: &[Self], out: &mut BytesMut) -> Result<(), CodecError> {
        let total: usize = values.iter().map(String::len).sum();
        out.reserve(4 + values.len() * 4 + total);
        out.put_i32(count_to_i32(values.len())?);
        for value in values {
            out.put_i32(count_to_i32(value.len())?);
        }
        for value in values {
            out.put_slice(value.as_bytes());
        }
        Ok(())
    }

    fn decode_array(data: &[u8]) -> Result<Vec<Self>, CodecError> {
        let mut buf = data;
        let count = read_count(&mut buf, "string count")?;
        let lengths_size = count
            .checked_mul(4)
            .filter(|size| *size <= buf.remaining())
            .ok_or(CodecError::UnexpectedEof {
                needed: count.saturating_mul(4),
                remaining: buf.remaining(),
            })?;

        let (mut lengths, mut body) = buf.split_at(lengths_size);
        let mut values = Vec::with_capacity(count);
        for _ in 0..count {
            let len = read_count(&mut lengths, "string length")?;
            if body.len() < len {
                return Err(CodecError::UnexpectedEof {
                    needed: len,
                    remaining: body.len(),
                });
            }
            let (head, tail) = body.split_at(len);
            values.push(String::decode_scalar(head)?);
            body = tail;
        }

        if !body.is_empty() {
            return Err(CodecError::CorruptedData(format!(
                "{} trailing bytes after string array",
                body.len()
            )));
        }
        Ok(values)
    }
}

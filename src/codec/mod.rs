//! Binary codec shared by every process that touches the store
//!
//! - [`array`]: big-endian scalars and homogeneous arrays (value payloads,
//!   element id lists)
//! - [`data_io`]: field framing used by the wire entries
//! - [`bit_stream`]: MSB-first bit packing for boolean arrays

pub mod array;
pub mod bit_stream;
pub mod data_io;

pub use array::{decode, decode_opt, encode, encode_opt, ArrayCodec, ScalarCodec};
pub use data_io::{DataReader, DataWriter};

//! Wire entries exchanged through the shared store
//!
//! Every entry writes its fields in a fixed order with [`DataWriter`] and
//! reads them back in the same order. The byte layout is the cross-process
//! contract:
//!
//! | Entry                   | Fields                                                         |
//! |-------------------------|----------------------------------------------------------------|
//! | `ValueSetRequestEntry`  | service, quantity, element set, timestamp, scenario            |
//! | `ValueSetEntry`         | service, quantity, timestamp, element set, scenario, needs-upload, `i32` length, payload |
//! | `ElementSetEntry`       | id, `i32` length, string-array of element ids                  |
//! | `ServiceDescriptorEntry`| id, type, description, url, processing time, max requests, comma-joined quantities |

mod element_set;
mod request;
mod service;
mod value_set;

pub use element_set::ElementSetEntry;
pub use request::ValueSetRequestEntry;
pub use service::ServiceDescriptorEntry;
pub use value_set::ValueSetEntry;

use bytes::Bytes;

use crate::codec::{DataReader, DataWriter};
use crate::error::CodecError;

/// Symmetric binary read/write contract for stored entries
pub trait WireEntry: Sized + Send + Sync {
    /// Write all fields in wire order
    fn write_data(&self, out: &mut DataWriter) -> Result<(), CodecError>;

    /// Read all fields in wire order
    fn read_data(input: &mut DataReader<'_>) -> Result<Self, CodecError>;

    /// Encode into a standalone buffer
    fn encode(&self) -> Result<Bytes, CodecError> {
        let mut out = DataWriter::new();
        self.write_data(&mut out)?;
        Ok(out.freeze())
    }

    /// Decode from a buffer holding exactly one entry
    fn decode(data: &[u8]) -> Result<Self, CodecError> {
        let mut input = DataReader::new(data);
        let entry = Self::read_data(&mut input)?;
        if !input.is_empty() {
            return Err(CodecError::CorruptedData(format!(
                "{} trailing bytes after entry",
                input.remaining()
            )));
        }
        Ok(entry)
    }
}

/// Plain strings (client registrations) travel as a single UTF field
impl WireEntry for String {
    fn write_data(&self, out: &mut DataWriter) -> Result<(), CodecError> {
        out.write_utf(self)
    }

    fn read_data(input: &mut DataReader<'_>) -> Result<Self, CodecError> {
        input.read_utf()
    }
}

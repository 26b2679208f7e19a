//! Fulfilled value set

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::WireEntry;
use crate::codec::{self, DataReader, DataWriter};
use crate::error::CodecError;
use crate::types::{ValueSetAddress, ValueSetKey};

/// A published value set
///
/// Immutable once written to the store. The payload is the array codec
/// encoding of the values (normally `f64`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueSetEntry {
    /// Where the value set lives
    #[serde(flatten)]
    pub address: ValueSetAddress,
    /// Set when the producer wants the entry pushed to a remote sink
    pub needs_upload: bool,
    /// Encoded payload
    pub data: Bytes,
}

impl ValueSetEntry {
    /// Create from an already encoded payload
    pub fn new(address: ValueSetAddress, needs_upload: bool, data: Bytes) -> Self {
        Self {
            address,
            needs_upload,
            data,
        }
    }

    /// Create from `f64` values
    pub fn from_values(
        address: ValueSetAddress,
        needs_upload: bool,
        values: &[f64],
    ) -> Result<Self, CodecError> {
        Ok(Self::new(address, needs_upload, codec::encode(values)?))
    }

    /// Decode the payload as `f64` values
    pub fn values(&self) -> Result<Vec<f64>, CodecError> {
        codec::decode(&self.data)
    }

    /// Payload length in bytes
    pub fn data_len(&self) -> usize {
        self.data.len()
    }

    /// Store key of this entry
    pub fn key(&self) -> ValueSetKey {
        self.address.key()
    }
}

impl WireEntry for ValueSetEntry {
    fn write_data(&self, out: &mut DataWriter) -> Result<(), CodecError> {
        let a = &self.address;
        out.write_utf(&a.service_id)?;
        out.write_utf(&a.quantity_id)?;
        out.write_utf(&a.timestamp)?;
        out.write_utf(&a.element_set_id)?;
        out.write_utf(&a.scenario_id)?;
        out.write_bool(self.needs_upload);
        out.write_sized(&self.data)
    }

    fn read_data(input: &mut DataReader<'_>) -> Result<Self, CodecError> {
        let service_id = input.read_utf()?;
        let quantity_id = input.read_utf()?;
        let timestamp = input.read_utf()?;
        let element_set_id = input.read_utf()?;
        let scenario_id = input.read_utf()?;
        let needs_upload = input.read_bool()?;
        let data = Bytes::copy_from_slice(input.read_sized()?);

        Ok(Self {
            address: ValueSetAddress {
                service_id,
                quantity_id,
                element_set_id,
                timestamp,
                scenario_id,
            },
            needs_upload,
            data,
        })
    }
}

//! Pending ask for a value set

use serde::{Deserialize, Serialize};

use super::WireEntry;
use crate::codec::{DataReader, DataWriter};
use crate::error::CodecError;
use crate::types::{ValueSetAddress, ValueSetKey};

/// Request for a fulfiller to produce one value set
///
/// Consumed exactly once from the request queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueSetRequestEntry {
    /// Which value set is wanted
    #[serde(flatten)]
    pub address: ValueSetAddress,
}

impl ValueSetRequestEntry {
    /// Create a request for `address`
    pub fn new(address: ValueSetAddress) -> Self {
        Self { address }
    }

    /// Store key the fulfiller must publish under
    pub fn key(&self) -> ValueSetKey {
        self.address.key()
    }
}

impl From<ValueSetAddress> for ValueSetRequestEntry {
    fn from(address: ValueSetAddress) -> Self {
        Self::new(address)
    }
}

impl WireEntry for ValueSetRequestEntry {
    fn write_data(&self, out: &mut DataWriter) -> Result<(), CodecError> {
        let a = &self.address;
        out.write_utf(&a.service_id)?;
        out.write_utf(&a.quantity_id)?;
        out.write_utf(&a.element_set_id)?;
        out.write_utf(&a.timestamp)?;
        out.write_utf(&a.scenario_id)
    }

    fn read_data(input: &mut DataReader<'_>) -> Result<Self, CodecError> {
        let service_id = input.read_utf()?;
        let quantity_id = input.read_utf()?;
        let element_set_id = input.read_utf()?;
        let timestamp = input.read_utf()?;
        let scenario_id = input.read_utf()?;
        Ok(Self::new(ValueSetAddress {
            service_id,
            quantity_id,
            element_set_id,
            timestamp,
            scenario_id,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address() -> ValueSetAddress {
        ValueSetAddress {
            service_id: "ws".to_string(),
            quantity_id: "q".to_string(),
            element_set_id: "es".to_string(),
            timestamp: "2000-01-01T00:00:00".to_string(),
            scenario_id: "S000000".to_string(),
        }
    }

    #[test]
    fn test_field_order() {
        let encoded = ValueSetRequestEntry::new(address()).encode().unwrap();
        // element set precedes the timestamp in requests
        assert_eq!(&encoded[..5], &[0, 2, b'w', b's', 0]);
        assert_eq!(&encoded[5..8], &[1, b'q', 0]);
        assert_eq!(&encoded[8..12], &[2, b'e', b's', 0]);
        assert_eq!(encoded[12], 19);
    }

    #[test]
    fn test_decode_matches_key() {
        let request = ValueSetRequestEntry::from(address());
        let decoded = ValueSetRequestEntry::decode(&request.encode().unwrap()).unwrap();
        assert_eq!(decoded, request);
        assert_eq!(
            decoded.key().as_str(),
            "wsqes2000-01-01T00:00:00S000000"
        );
    }

    #[test]
    fn test_truncated_request() {
        let encoded = ValueSetRequestEntry::new(address()).encode().unwrap();
        assert!(ValueSetRequestEntry::decode(&encoded[..encoded.len() - 1]).is_err());
    }
}

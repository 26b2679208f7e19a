//! Descriptor of a remote computation service

use serde::{Deserialize, Serialize};

use super::WireEntry;
use crate::codec::{DataReader, DataWriter};
use crate::error::CodecError;

/// A service that can fulfill requests for some quantities
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDescriptorEntry {
    /// Service identifier, used as the first key field
    pub id: String,
    /// Service kind
    #[serde(rename = "type", default)]
    pub service_type: String,
    /// Free-form description
    #[serde(default)]
    pub description: String,
    /// Endpoint of the service
    #[serde(default)]
    pub url: String,
    /// Expected processing time per request, in milliseconds
    #[serde(default)]
    pub processing_time: String,
    /// Concurrent requests the service accepts
    #[serde(default)]
    pub max_requests: String,
    /// Quantities the service produces
    #[serde(default)]
    pub quantities: Vec<String>,
}

impl ServiceDescriptorEntry {
    /// Create a descriptor with just an id and its quantities
    pub fn new(id: impl Into<String>, quantities: Vec<String>) -> Self {
        Self {
            id: id.into(),
            service_type: String::new(),
            description: String::new(),
            url: String::new(),
            processing_time: String::new(),
            max_requests: String::new(),
            quantities,
        }
    }

    /// Check if the service produces `quantity_id`
    pub fn produces(&self, quantity_id: &str) -> bool {
        self.quantities.iter().any(|q| q == quantity_id)
    }

    /// Quantities as the comma-joined wire field
    ///
    /// Quantity ids containing a comma do not survive decoding; config
    /// validation rejects them.
    pub fn joined_quantities(&self) -> String {
        self.quantities.join(",")
    }
}

impl WireEntry for ServiceDescriptorEntry {
    fn write_data(&self, out: &mut DataWriter) -> Result<(), CodecError> {
        out.write_utf(&self.id)?;
        out.write_utf(&self.service_type)?;
        out.write_utf(&self.description)?;
        out.write_utf(&self.url)?;
        out.write_utf(&self.processing_time)?;
        out.write_utf(&self.max_requests)?;
        out.write_utf(&self.joined_quantities())
    }

    fn read_data(input: &mut DataReader<'_>) -> Result<Self, CodecError> {
        let id = input.read_utf()?;
        let service_type = input.read_utf()?;
        let description = input.read_utf()?;
        let url = input.read_utf()?;
        let processing_time = input.read_utf()?;
        let max_requests = input.read_utf()?;
        let quantities = input
            .read_utf()?
            .split(',')
            .filter(|q| !q.is_empty())
            .map(str::to_string)
            .collect();

        Ok(Self {
            id,
            service_type,
            description,
            url,
            processing_time,
            max_requests,
            quantities,
        })
    }
}

//! Element-set metadata published for fulfillers

use serde::{Deserialize, Serialize};

use super::WireEntry;
use crate::codec::{self, DataReader, DataWriter};
use crate::error::CodecError;
use crate::types::ElementSet;

/// Identifiers of the elements behind an element-set id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementSetEntry {
    /// Element set identifier
    pub id: String,
    /// Element identifiers, in order
    pub element_ids: Vec<String>,
}

impl ElementSetEntry {
    /// Create a new entry
    pub fn new(id: impl Into<String>, element_ids: Vec<String>) -> Self {
        Self {
            id: id.into(),
            element_ids,
        }
    }
}

impl From<&ElementSet> for ElementSetEntry {
    fn from(element_set: &ElementSet) -> Self {
        Self::new(element_set.id.clone(), element_set.element_ids.clone())
    }
}

impl From<ElementSetEntry> for ElementSet {
    fn from(entry: ElementSetEntry) -> Self {
        ElementSet::new(entry.id, entry.element_ids)
    }
}

impl WireEntry for ElementSetEntry {
    fn write_data(&self, out: &mut DataWriter) -> Result<(), CodecError> {
        out.write_utf(&self.id)?;
        out.write_sized(&codec::encode(&self.element_ids)?)
    }

    fn read_data(input: &mut DataReader<'_>) -> Result<Self, CodecError> {
        let id = input.read_utf()?;
        let element_ids = codec::decode(input.read_sized()?)?;
        Ok(Self { id, element_ids })
    }
}

//! Service registry: which service produces which quantity

use crate::entry::ServiceDescriptorEntry;
use crate::error::{Error, Result};
use crate::store::TypedMap;
use crate::types::{OutputLink, SimTime, ValueSetAddress};

/// Service descriptors known to this process
#[derive(Debug, Clone, Default)]
pub struct ServiceRegistry {
    services: Vec<ServiceDescriptorEntry>,
}

impl ServiceRegistry {
    /// Create from configured descriptors
    pub fn new(services: Vec<ServiceDescriptorEntry>) -> Self {
        Self { services }
    }

    /// All descriptors
    pub fn services(&self) -> &[ServiceDescriptorEntry] {
        &self.services
    }

    /// Id of the first service producing `quantity_id`
    pub fn find_service_id_for_quantity(&self, quantity_id: &str) -> Option<&str> {
        self.services
            .iter()
            .find(|s| s.produces(quantity_id))
            .map(|s| s.id.as_str())
    }

    /// Address of the value set for `link` at `time`
    pub fn address(
        &self,
        link: &OutputLink,
        time: SimTime,
        scenario_id: &str,
    ) -> Result<ValueSetAddress> {
        let service_id = self
            .find_service_id_for_quantity(&link.quantity_id)
            .ok_or_else(|| Error::UnroutableQuantity(link.quantity_id.clone()))?;

        Ok(ValueSetAddress {
            service_id: service_id.to_string(),
            quantity_id: link.quantity_id.clone(),
            element_set_id: link.element_set.id.clone(),
            timestamp: time.timestamp()?,
            scenario_id: scenario_id.to_string(),
        })
    }

    /// Publish every descriptor into the shared service map
    pub async fn publish(&self, map: &TypedMap<ServiceDescriptorEntry>) -> Result<()> {
        for service in &self.services {
            map.put(&service.id, service).await?;
            tracing::debug!(service_id = %service.id, "Published service descriptor");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::DataSpace;
    use crate::types::ElementSet;

    fn registry() -> ServiceRegistry {
        ServiceRegistry::new(vec![
            ServiceDescriptorEntry::new("ws-gw", vec!["head".to_string(), "flux".to_string()]),
            ServiceDescriptorEntry::new("ws-sw", vec!["discharge".to_string()]),
        ])
    }

    #[test]
    fn test_find_service() {
        let registry = registry();
        assert_eq!(registry.find_service_id_for_quantity("flux"), Some("ws-gw"));
        assert_eq!(
            registry.find_service_id_for_quantity("discharge"),
            Some("ws-sw")
        );
        assert_eq!(registry.find_service_id_for_quantity("charge"), None);
    }

    #[test]
    fn test_address_for_link() {
        let link = OutputLink::new("l1", "head", ElementSet::new("wells", vec![]));
        let address = registry()
            .address(&link, SimTime(51544.0), "S000000")
            .unwrap();
        assert_eq!(
            address.key().as_str(),
            "ws-gwheadwells2000-01-01T00:00:00S000000"
        );
    }

    #[test]
    fn test_unroutable_quantity() {
        let link = OutputLink::new("l1", "salinity", ElementSet::new("wells", vec![]));
        assert!(matches!(
            registry().address(&link, SimTime(51544.0), "S000000"),
            Err(Error::UnroutableQuantity(q)) if q == "salinity"
        ));
    }

    #[tokio::test]
    async fn test_publish() {
        let space = DataSpace::in_memory(1, 1);
        registry().publish(&space.services).await.unwrap();
        assert_eq!(space.services.len().await.unwrap(), 2);
        let gw = space.services.get("ws-gw").await.unwrap().unwrap();
        assert!(gw.produces("head"));
    }
}

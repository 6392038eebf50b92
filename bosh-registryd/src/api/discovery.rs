use std::sync::Arc;
use shared::types::{Labels, Service, ServiceInstance};
use crate::cache_manager::CatalogCache;
use crate::catalog::hash;
use crate::error::{RegistryError, Result};

/// Read-only catalog queries. Each query reads the cache exactly once.
#[derive(Clone)]
pub struct ServiceDiscovery {
    cache: Arc<CatalogCache>,
}

impl ServiceDiscovery {
    pub fn new(cache: Arc<CatalogCache>) -> Self {
        Self { cache }
    }

    /// All service definitions, in no particular order
    pub async fn services(&self) -> Result<Vec<Arc<Service>>> {
        let catalog = self.cache.get_catalog().await?;
        Ok(catalog.values().map(|entry| entry.service.clone()).collect())
    }

    pub async fn get_service(&self, hostname: &str) -> Result<Option<Arc<Service>>> {
        let catalog = self.cache.get_catalog().await?;
        Ok(catalog.get(hostname).map(|entry| entry.service.clone()))
    }

    /// Instances of `hostname` serving one of the named `ports` whose labels
    /// include every pair in `labels`. An empty port list matches nothing.
    pub async fn instances(
        &self,
        hostname: &str,
        ports: &[String],
        labels: &Labels,
    ) -> Result<Vec<ServiceInstance>> {
        let catalog = self.cache.get_catalog().await?;
        let Some(entry) = catalog.get(hostname) else {
            return Ok(Vec::new());
        };

        let wanted: Vec<&str> = ports
            .iter()
            .map(String::as_str)
            .filter(|name| entry.service.port(name).is_some())
            .collect();

        Ok(entry
            .instances
            .iter()
            .filter(|instance| has_labels(instance, labels))
            .filter(|instance| wanted.contains(&instance.endpoint.service_port.name.as_str()))
            .cloned()
            .collect())
    }

    /// Every instance of every service
    pub async fn host_instances(&self) -> Result<Vec<ServiceInstance>> {
        let catalog = self.cache.get_catalog().await?;
        Ok(catalog
            .values()
            .flat_map(|entry| entry.instances.iter().cloned())
            .collect())
    }

    pub async fn digest(&self) -> Result<String> {
        let catalog = self.cache.get_catalog().await?;
        hash::compute_hash(&catalog).map_err(RegistryError::Digest)
    }
}

fn has_labels(instance: &ServiceInstance, wanted: &Labels) -> bool {
    wanted
        .iter()
        .all(|(key, value)| instance.labels.get(key) == Some(value))
}

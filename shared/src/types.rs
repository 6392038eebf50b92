use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::sync::Arc;
use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};

/// Instance labels, ordered so equal label sets compare and hash identically.
pub type Labels = BTreeMap<String, String>;

/// Hostname-indexed catalog. Immutable once handed out by the cache.
pub type Catalog = BTreeMap<String, ServiceWithInstances>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Protocol {
    #[serde(rename = "TCP")]
    Tcp,
}

/// A port a job intentionally exposes, as declared in its deployment manifest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Port {
    pub name: String,
    pub port: u16,
    pub protocol: Protocol,
}

/// One service per synthesized hostname.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    /// `<process>.<instance-group>.<deployment>.<suffix>`
    pub hostname: String,

    /// Virtual address, stable for the lifetime of the registry process
    pub address: Ipv4Addr,

    /// Exposed ports in manifest declaration order
    pub ports: Vec<Port>,
}

impl Service {
    pub fn port(&self, name: &str) -> Option<&Port> {
        self.ports.iter().find(|p| p.name == name)
    }
}

/// A reachable (IP, port) pair on a VM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub address: String,
    pub port: u16,
    pub service_port: Port,
}

/// One per (VM, IP address, exposed port) for a hostname's backing process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInstance {
    pub endpoint: Endpoint,

    /// Shared with the catalog entry for this hostname
    pub service: Arc<Service>,

    pub labels: Labels,

    pub availability_zone: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceWithInstances {
    pub service: Arc<Service>,
    pub instances: Vec<ServiceInstance>,
}

/// Change counter published by the registry whenever the polled catalog differs
/// from the previous one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogStatus {
    pub generation: u64,
    pub changed_at: Option<DateTime<Utc>>,
}

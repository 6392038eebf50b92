use std::net::Ipv4Addr;
use serde::Serialize;
use sha2::{Sha256, Digest};
use shared::types::{Catalog, Labels, Port};

#[derive(Serialize)]
struct ServiceView<'a> {
    hostname: &'a str,
    address: Ipv4Addr,
    ports: &'a [Port],
    instances: Vec<InstanceView<'a>>,
}

#[derive(Serialize)]
struct InstanceView<'a> {
    address: &'a str,
    port: u16,
    port_name: &'a str,
    labels: &'a Labels,
    availability_zone: &'a str,
}

/// SHA-256 over a stable view of the catalog. Hostnames and labels are ordered
/// maps, so equal catalogs always produce the same digest.
pub fn compute_hash(catalog: &Catalog) -> serde_json::Result<String> {
    let views: Vec<ServiceView<'_>> = catalog
        .values()
        .map(|entry| ServiceView {
            hostname: &entry.service.hostname,
            address: entry.service.address,
            ports: &entry.service.ports,
            instances: entry
                .instances
                .iter()
                .map(|i| InstanceView {
                    address: &i.endpoint.address,
                    port: i.endpoint.port,
                    port_name: &i.endpoint.service_port.name,
                    labels: &i.labels,
                    availability_zone: &i.availability_zone,
                })
                .collect(),
        })
        .collect();

    let json = serde_json::to_string(&views)?;

    let hash = Sha256::digest(json.as_bytes());
    Ok(hex::encode(hash))
}

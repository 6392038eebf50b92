use std::collections::HashMap;
use serde::Deserialize;
use shared::types::{Port, Protocol};
use crate::error::ManifestError;

/// Instance group name -> job name -> exposed ports, in declaration order.
pub type ManifestPortMap = HashMap<String, HashMap<String, Vec<Port>>>;

/// Only the parts of a deployment manifest the registry reads. Everything else
/// in the document is ignored.
///
/// ```yaml
/// instance_groups:
/// - name: nats-group
///   jobs:
///   - name: nats
///     expose_ports:
///     - name: client_port
///       number: 4222
/// ```
#[derive(Debug, Default, Deserialize)]
struct ManifestWithExposedPorts {
    #[serde(default)]
    instance_groups: Vec<ManifestInstanceGroup>,
}

#[derive(Debug, Deserialize)]
struct ManifestInstanceGroup {
    #[serde(default)]
    name: String,
    #[serde(default)]
    jobs: Vec<ManifestJob>,
}

#[derive(Debug, Deserialize)]
struct ManifestJob {
    #[serde(default)]
    name: String,
    #[serde(default)]
    expose_ports: Vec<ExposedPort>,
}

#[derive(Debug, Deserialize)]
struct ExposedPort {
    #[serde(default)]
    name: String,
    #[serde(default)]
    number: u16,
}

/// Parse manifest text into its port exposures.
///
/// Every job listed in the manifest gets an entry, empty when it declares no
/// `expose_ports`. When an instance group appears twice, later job entries
/// replace earlier ones.
pub fn extract(manifest: &str) -> Result<ManifestPortMap, ManifestError> {
    if manifest.trim().is_empty() {
        return Ok(ManifestPortMap::new());
    }

    let parsed: ManifestWithExposedPorts = serde_yaml::from_str(manifest)?;

    let mut exposures = ManifestPortMap::new();
    for group in parsed.instance_groups {
        let jobs = exposures.entry(group.name).or_default();
        for job in group.jobs {
            let ports = job
                .expose_ports
                .into_iter()
                .map(|p| Port {
                    name: p.name,
                    port: p.number,
                    protocol: Protocol::Tcp,
                })
                .collect();
            jobs.insert(job.name, ports);
        }
    }

    Ok(exposures)
}

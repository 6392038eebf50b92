use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use futures::future::try_join_all;
use shared::protocol::{
    LABEL_DNS_PREFIX, LABEL_INDEX, LABEL_PROCESS_STATE, LABEL_VM_JOB_STATE, LABEL_VM_STATE,
};
use shared::types::{
    Catalog, Endpoint, Labels, Port, Service, ServiceInstance, ServiceWithInstances,
};
use crate::catalog::vips::VipStore;
use crate::director::{manifest, Director, VmInfo, VmProcess};
use crate::error::{RegistryError, Result};

/// VMs of one instance group plus the ports its jobs expose
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstanceGroup {
    pub vms: Vec<VmInfo>,
    /// Job name -> exposed ports. Jobs missing from the manifest have no entry.
    pub exposed_ports: HashMap<String, Vec<Port>>,
}

/// Instance group name -> group
pub type Deployment = BTreeMap<String, InstanceGroup>;

/// Deployment name -> deployment
pub type AllDeployments = BTreeMap<String, Deployment>;

/// `<process>.<instance-group>.<deployment>.<suffix>`
pub fn hostname(process: &str, instance_group: &str, deployment: &str, suffix: &str) -> String {
    format!("{process}.{instance_group}.{deployment}.{suffix}")
}

/// Builds the catalog from a full fetch of director inventory.
pub struct Projector {
    director: Arc<dyn Director>,
    vips: Arc<VipStore>,
    domain_suffix: String,
}

impl Projector {
    pub fn new(director: Arc<dyn Director>, vips: Arc<VipStore>, domain_suffix: impl Into<String>) -> Self {
        Self {
            director,
            vips,
            domain_suffix: domain_suffix.into(),
        }
    }

    /// Fetch every deployment's manifest and VMs. The first failing deployment
    /// aborts the whole fetch.
    pub async fn deployments(&self) -> Result<AllDeployments> {
        let names = self
            .director
            .deployments()
            .await
            .map_err(RegistryError::Deployments)?;

        let fetched = try_join_all(names.into_iter().map(|name| self.fetch_deployment(name))).await?;
        Ok(fetched.into_iter().collect())
    }

    async fn fetch_deployment(&self, name: String) -> Result<(String, Deployment)> {
        let manifest_text = self
            .director
            .manifest(&name)
            .await
            .map_err(|source| RegistryError::Manifest {
                deployment: name.clone(),
                source,
            })?;
        let mut exposures =
            manifest::extract(&manifest_text).map_err(|source| RegistryError::ManifestParse {
                deployment: name.clone(),
                source,
            })?;

        let vms = self
            .director
            .instance_infos(&name)
            .await
            .map_err(|source| RegistryError::Instances {
                deployment: name.clone(),
                source,
            })?;

        let mut deployment = Deployment::new();
        for vm in vms {
            let group = deployment
                .entry(vm.job_name.clone())
                .or_insert_with(|| InstanceGroup {
                    vms: Vec::new(),
                    exposed_ports: exposures.remove(&vm.job_name).unwrap_or_default(),
                });
            group.vms.push(vm);
        }

        Ok((name, deployment))
    }

    /// Services and instances backed by one instance group
    pub fn service_instances(
        &self,
        deployment: &str,
        instance_group: &str,
        group: &InstanceGroup,
    ) -> Result<BTreeMap<String, ServiceWithInstances>> {
        let mut services = BTreeMap::new();

        for vm in &group.vms {
            for process in &vm.processes {
                let ports: &[Port] = group
                    .exposed_ports
                    .get(&process.name)
                    .map(Vec::as_slice)
                    .unwrap_or_default();

                let host = hostname(&process.name, instance_group, deployment, &self.domain_suffix);
                let entry = match services.entry(host) {
                    Entry::Occupied(e) => e.into_mut(),
                    Entry::Vacant(e) => {
                        let host = e.key().clone();
                        let address = self.vips.get(&host).map_err(|source| RegistryError::Vip {
                            deployment: deployment.to_string(),
                            instance_group: instance_group.to_string(),
                            hostname: host.clone(),
                            source,
                        })?;
                        e.insert(ServiceWithInstances {
                            service: Arc::new(Service {
                                hostname: host,
                                address,
                                ports: ports.to_vec(),
                            }),
                            instances: Vec::new(),
                        })
                    }
                };

                let labels = instance_labels(vm, process);
                for ip in &vm.ips {
                    for port in ports {
                        entry.instances.push(ServiceInstance {
                            endpoint: Endpoint {
                                address: ip.clone(),
                                port: port.port,
                                service_port: port.clone(),
                            },
                            service: Arc::clone(&entry.service),
                            labels: labels.clone(),
                            availability_zone: vm.az.clone(),
                        });
                    }
                }
            }
        }

        Ok(services)
    }

    /// Full rebuild: fetch everything and project it into a catalog
    pub async fn project(&self) -> Result<Catalog> {
        let all = self.deployments().await?;

        let mut catalog = Catalog::new();
        for (deployment_name, deployment) in &all {
            for (group_name, group) in deployment {
                catalog.extend(self.service_instances(deployment_name, group_name, group)?);
            }
        }

        tracing::debug!(
            "Projected {} deployments into {} services ({} virtual IPs reserved)",
            all.len(),
            catalog.len(),
            self.vips.reserved()
        );
        Ok(catalog)
    }
}

fn instance_labels(vm: &VmInfo, process: &VmProcess) -> Labels {
    let mut labels = Labels::from([
        (LABEL_VM_STATE.to_string(), vm.state.clone()),
        (LABEL_VM_JOB_STATE.to_string(), vm.process_state.clone()),
        (LABEL_PROCESS_STATE.to_string(), process.state.clone()),
    ]);
    if let Some(index) = vm.index {
        labels.insert(LABEL_INDEX.to_string(), index.to_string());
    }
    for (i, dns) in vm.dns.iter().enumerate() {
        labels.insert(format!("{LABEL_DNS_PREFIX}{i}"), dns.clone());
    }
    labels
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use shared::types::Protocol;
    use crate::director::fake::{manifest, vm, FakeDirector};
    use crate::error::VipError;

    fn projector(director: Arc<FakeDirector>) -> Projector {
        Projector::new(director, Arc::new(VipStore::new()), "bosh")
    }

    #[tokio::test]
    async fn test_single_exposed_process() {
        let director = Arc::new(FakeDirector::new());
        director.put("d1", &manifest("g1", "p1", &[("client_port", 4222)]), vec![vm("g1", &["10.0.0.5"], &["p1"])]);

        let catalog = projector(director).project().await.unwrap();

        assert_eq!(catalog.len(), 1);
        let entry = &catalog["p1.g1.d1.bosh"];
        assert_eq!(entry.service.hostname, "p1.g1.d1.bosh");
        assert_eq!(entry.service.address, Ipv4Addr::new(169, 254, 255, 1));
        assert_eq!(
            entry.service.ports,
            vec![Port {
                name: "client_port".to_string(),
                port: 4222,
                protocol: Protocol::Tcp,
            }]
        );

        assert_eq!(entry.instances.len(), 1);
        let instance = &entry.instances[0];
        assert_eq!(instance.endpoint.address, "10.0.0.5");
        assert_eq!(instance.endpoint.port, 4222);
        assert_eq!(instance.endpoint.service_port.name, "client_port");
        assert!(Arc::ptr_eq(&instance.service, &entry.service));
        assert_eq!(instance.availability_zone, "z1");
    }

    #[tokio::test]
    async fn test_process_without_exposure_has_no_ports_or_instances() {
        let director = Arc::new(FakeDirector::new());
        director.put(
            "d1",
            &manifest("g1", "p1", &[("client_port", 4222)]),
            vec![vm("g1", &["10.0.0.5"], &["p1", "syslog-forwarder"])],
        );

        let catalog = projector(director).project().await.unwrap();

        let entry = &catalog["syslog-forwarder.g1.d1.bosh"];
        assert!(entry.service.ports.is_empty());
        assert!(entry.instances.is_empty());
        assert_eq!(catalog["p1.g1.d1.bosh"].instances.len(), 1);
    }

    #[tokio::test]
    async fn test_one_instance_per_vm_ip_and_port() {
        let director = Arc::new(FakeDirector::new());
        let ports = [("client_port", 2181), ("quorum_port", 2888)];
        director.put(
            "zk",
            &manifest("zookeeper", "zookeeper", &ports),
            vec![
                vm("zookeeper", &["10.0.1.1", "192.168.1.1"], &["zookeeper"]),
                vm("zookeeper", &["10.0.1.2"], &["zookeeper"]),
            ],
        );

        let catalog = projector(director).project().await.unwrap();

        let entry = &catalog["zookeeper.zookeeper.zk.bosh"];
        assert_eq!(entry.instances.len(), 6);
        let endpoints: Vec<String> = entry
            .instances
            .iter()
            .map(|i| format!("{}:{}", i.endpoint.address, i.endpoint.port))
            .collect();
        assert_eq!(
            endpoints,
            vec![
                "10.0.1.1:2181",
                "10.0.1.1:2888",
                "192.168.1.1:2181",
                "192.168.1.1:2888",
                "10.0.1.2:2181",
                "10.0.1.2:2888",
            ]
        );
    }

    #[tokio::test]
    async fn test_labels_from_vm_state() {
        let director = Arc::new(FakeDirector::new());
        let mut info = vm("g1", &["10.0.0.5"], &["p1"]);
        info.index = Some(3);
        info.state = "started".to_string();
        info.process_state = "failing".to_string();
        info.processes[0].state = "unknown".to_string();
        info.dns = vec!["a.g1.d1.bosh".to_string(), "b.g1.d1.bosh".to_string()];
        director.put("d1", &manifest("g1", "p1", &[("http", 80)]), vec![info]);

        let catalog = projector(director).project().await.unwrap();

        let labels = &catalog["p1.g1.d1.bosh"].instances[0].labels;
        assert_eq!(labels["vm.state"], "started");
        assert_eq!(labels["vm.job_state"], "failing");
        assert_eq!(labels["process.state"], "unknown");
        assert_eq!(labels["index"], "3");
        assert_eq!(labels["dns-0"], "a.g1.d1.bosh");
        assert_eq!(labels["dns-1"], "b.g1.d1.bosh");
        assert_eq!(labels.len(), 6);
    }

    #[tokio::test]
    async fn test_missing_index_has_no_label() {
        let director = Arc::new(FakeDirector::new());
        let mut info = vm("g1", &["10.0.0.5"], &["p1"]);
        info.index = None;
        director.put("d1", &manifest("g1", "p1", &[("http", 80)]), vec![info]);

        let catalog = projector(director).project().await.unwrap();

        assert!(!catalog["p1.g1.d1.bosh"].instances[0].labels.contains_key("index"));
    }

    #[tokio::test]
    async fn test_addresses_stable_across_rebuilds() {
        let director = Arc::new(FakeDirector::new());
        director.put("d1", &manifest("g1", "p1", &[("http", 80)]), vec![vm("g1", &["10.0.0.5"], &["p1"])]);
        let projector = projector(director.clone());

        let first = projector.project().await.unwrap();

        director.put("d0", &manifest("g0", "p0", &[("http", 80)]), vec![vm("g0", &["10.0.0.9"], &["p0"])]);
        let second = projector.project().await.unwrap();

        assert_eq!(
            first["p1.g1.d1.bosh"].service.address,
            second["p1.g1.d1.bosh"].service.address
        );
        assert_eq!(
            second["p0.g0.d0.bosh"].service.address,
            Ipv4Addr::new(169, 254, 255, 2)
        );
    }

    #[tokio::test]
    async fn test_bad_manifest_aborts_with_deployment_context() {
        let director = Arc::new(FakeDirector::new());
        director.put("good", &manifest("g1", "p1", &[("http", 80)]), vec![vm("g1", &["10.0.0.5"], &["p1"])]);
        director.put("broken", "instance_groups: [", vec![vm("g1", &["10.0.0.6"], &["p1"])]);

        let err = projector(director).project().await.unwrap_err();

        match &err {
            RegistryError::ManifestParse { deployment, .. } => assert_eq!(deployment, "broken"),
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.to_string().contains("broken"));
    }

    #[tokio::test]
    async fn test_director_failure_aborts() {
        let director = Arc::new(FakeDirector::new());
        director.put("d1", &manifest("g1", "p1", &[("http", 80)]), vec![vm("g1", &["10.0.0.5"], &["p1"])]);
        director.set_failing(true);

        let err = projector(director).project().await.unwrap_err();
        assert!(matches!(err, RegistryError::Deployments(_)));
    }

    #[tokio::test]
    async fn test_vip_exhaustion_fails_projection() {
        let director = Arc::new(FakeDirector::new());
        director.put("d1", &manifest("g1", "p1", &[("http", 80)]), vec![vm("g1", &["10.0.0.5"], &["p1"])]);
        let vips = Arc::new(VipStore::new());
        for i in 0..254 {
            vips.get(&format!("other-{i}")).unwrap();
        }
        let projector = Projector::new(director, vips.clone(), "bosh");

        let err = projector.project().await.unwrap_err();

        match err {
            RegistryError::Vip { deployment, instance_group, hostname, source } => {
                assert_eq!(deployment, "d1");
                assert_eq!(instance_group, "g1");
                assert_eq!(hostname, "p1.g1.d1.bosh");
                assert_eq!(source, VipError::Exhausted { capacity: 254 });
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(vips.get("other-0").is_ok());
    }

    #[tokio::test]
    async fn test_inventory_tree_groups_vms() {
        let director = Arc::new(FakeDirector::new());
        director.put(
            "d1",
            &manifest("g1", "p1", &[("http", 80)]),
            vec![
                vm("g1", &["10.0.0.5"], &["p1"]),
                vm("g2", &["10.0.0.6"], &["p2"]),
                vm("g1", &["10.0.0.7"], &["p1"]),
            ],
        );

        let all = projector(director).deployments().await.unwrap();

        let d1 = &all["d1"];
        assert_eq!(d1["g1"].vms.len(), 2);
        assert_eq!(d1["g1"].exposed_ports["p1"][0].port, 80);
        assert_eq!(d1["g2"].vms.len(), 1);
        assert!(d1["g2"].exposed_ports.is_empty());
    }
}

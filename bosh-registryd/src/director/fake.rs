use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use async_trait::async_trait;
use crate::director::{Director, VmInfo, VmProcess};
use crate::error::DirectorError;

/// In-memory director for tests. Counts listing calls, one per rebuild.
#[derive(Default)]
pub struct FakeDirector {
    deployments: Mutex<BTreeMap<String, (String, Vec<VmInfo>)>>,
    pub list_calls: AtomicUsize,
    pub fail: AtomicBool,
    pub latency: Option<Duration>,
}

impl FakeDirector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Self::default()
        }
    }

    pub fn put(&self, deployment: &str, manifest: &str, vms: Vec<VmInfo>) {
        self.deployments
            .lock()
            .unwrap()
            .insert(deployment.to_string(), (manifest.to_string(), vms));
    }

    pub fn calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl Director for FakeDirector {
    async fn deployments(&self) -> Result<Vec<String>, DirectorError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(DirectorError::Status {
                url: "fake:///deployments".to_string(),
                status: 503,
            });
        }
        Ok(self.deployments.lock().unwrap().keys().cloned().collect())
    }

    async fn manifest(&self, deployment: &str) -> Result<String, DirectorError> {
        self.deployments
            .lock()
            .unwrap()
            .get(deployment)
            .map(|(manifest, _)| manifest.clone())
            .ok_or_else(|| not_found(deployment))
    }

    async fn instance_infos(&self, deployment: &str) -> Result<Vec<VmInfo>, DirectorError> {
        self.deployments
            .lock()
            .unwrap()
            .get(deployment)
            .map(|(_, vms)| vms.clone())
            .ok_or_else(|| not_found(deployment))
    }
}

fn not_found(deployment: &str) -> DirectorError {
    DirectorError::Status {
        url: format!("fake:///deployments/{deployment}"),
        status: 404,
    }
}

/// A running VM in `group` with one running process per name.
pub fn vm(group: &str, ips: &[&str], processes: &[&str]) -> VmInfo {
    VmInfo {
        job_name: group.to_string(),
        ips: ips.iter().map(|s| s.to_string()).collect(),
        dns: Vec::new(),
        az: "z1".to_string(),
        state: "started".to_string(),
        process_state: "running".to_string(),
        index: Some(0),
        processes: processes
            .iter()
            .map(|name| VmProcess {
                name: name.to_string(),
                state: "running".to_string(),
            })
            .collect(),
    }
}

/// Manifest with one instance group whose single job exposes the given ports.
pub fn manifest(group: &str, job: &str, ports: &[(&str, u16)]) -> String {
    let mut yaml = format!("instance_groups:\n- name: {group}\n  jobs:\n  - name: {job}\n");
    if !ports.is_empty() {
        yaml.push_str("    expose_ports:\n");
        for (name, number) in ports {
            yaml.push_str(&format!("    - name: {name}\n      number: {number}\n"));
        }
    }
    yaml
}

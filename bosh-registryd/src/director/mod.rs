pub mod http;
pub mod manifest;

#[cfg(test)]
pub mod fake;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer};
use crate::error::DirectorError;

/// The slice of the orchestrator API the registry consumes.
#[async_trait]
pub trait Director: Send + Sync {
    /// Names of all deployments
    async fn deployments(&self) -> Result<Vec<String>, DirectorError>;

    /// Raw manifest YAML of a deployment
    async fn manifest(&self, deployment: &str) -> Result<String, DirectorError>;

    /// VM and process records of a deployment
    async fn instance_infos(&self, deployment: &str) -> Result<Vec<VmInfo>, DirectorError>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct VmInfo {
    /// Instance group the VM belongs to
    #[serde(default, deserialize_with = "null_as_default")]
    pub job_name: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub ips: Vec<String>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub dns: Vec<String>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub az: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub state: String,

    #[serde(default, rename = "job_state", deserialize_with = "null_as_default")]
    pub process_state: String,

    #[serde(default)]
    pub index: Option<u32>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub processes: Vec<VmProcess>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct VmProcess {
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub state: String,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

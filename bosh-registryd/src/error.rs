#[derive(Debug, thiserror::Error)]
pub enum DirectorError {
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("director returned {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("task {id} finished in state '{state}'")]
    Task { id: u64, state: String },

    #[error("unexpected director response from {url}: {reason}")]
    Protocol { url: String, reason: String },

    #[error("decoding director response: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Debug, thiserror::Error)]
#[error("parsing manifest yaml: {0}")]
pub struct ManifestError(#[from] pub serde_yaml::Error);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VipError {
    #[error("used up all {capacity} virtual IPs")]
    Exhausted { capacity: u8 },
}

/// Failure of a full catalog rebuild. Always carries the deployment (and, where
/// relevant, instance group) the rebuild was working on.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("getting deployments: {0}")]
    Deployments(#[source] DirectorError),

    #[error("getting manifest for {deployment}: {source}")]
    Manifest {
        deployment: String,
        source: DirectorError,
    },

    #[error("getting port exposures for {deployment}: {source}")]
    ManifestParse {
        deployment: String,
        source: ManifestError,
    },

    #[error("getting instance infos for deployment {deployment}: {source}")]
    Instances {
        deployment: String,
        source: DirectorError,
    },

    #[error("reserving virtual IP for {hostname} ({deployment}/{instance_group}): {source}")]
    Vip {
        deployment: String,
        instance_group: String,
        hostname: String,
        source: VipError,
    },

    #[error("computing catalog digest: {0}")]
    Digest(#[source] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, RegistryError>;

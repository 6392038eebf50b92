use std::time::Duration;
use async_trait::async_trait;
use reqwest::{redirect, Certificate, Client, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use crate::config::DirectorConfig;
use crate::director::{Director, VmInfo};
use crate::error::DirectorError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const TASK_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Task states that mean the task has not finished yet
const TASK_RUNNING_STATES: &[&str] = &["queued", "processing", "cancelling"];
const TASK_DONE: &str = "done";

#[derive(Debug, Deserialize)]
struct DeploymentResp {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ManifestResp {
    #[serde(default)]
    manifest: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TaskResp {
    id: u64,
    state: String,
}

/// Director REST client authenticating with HTTP basic auth.
///
/// Inventory requests are asynchronous on the director side: they answer with
/// a redirect to a task, which is polled until done before its result output is
/// read. No overall timeout is applied to that wait.
pub struct HttpDirector {
    client: Client,
    base_url: String,
    client_id: String,
    client_secret: String,
}

impl HttpDirector {
    pub fn new(config: &DirectorConfig, ca_cert: Option<&[u8]>) -> Result<Self, DirectorError> {
        let base_url = format!("https://{}:{}", config.host, config.port);

        let mut builder = Client::builder()
            .redirect(redirect::Policy::none())
            .connect_timeout(CONNECT_TIMEOUT);

        if let Some(pem) = ca_cert {
            let cert = Certificate::from_pem(pem).map_err(|source| DirectorError::Http {
                url: base_url.clone(),
                source,
            })?;
            builder = builder.add_root_certificate(cert);
        }

        let client = builder.build().map_err(|source| DirectorError::Http {
            url: base_url.clone(),
            source,
        })?;

        Ok(Self {
            client,
            base_url,
            client_id: config.client.clone(),
            client_secret: config.client_secret.clone(),
        })
    }

    async fn get(&self, path: &str) -> Result<(String, Response), DirectorError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .send()
            .await
            .map_err(|source| DirectorError::Http {
                url: url.clone(),
                source,
            })?;
        Ok((url, response))
    }

    async fn get_text(&self, path: &str) -> Result<String, DirectorError> {
        let (url, response) = self.get(path).await?;
        if !response.status().is_success() {
            return Err(DirectorError::Status {
                url,
                status: response.status().as_u16(),
            });
        }
        response
            .text()
            .await
            .map_err(|source| DirectorError::Http { url, source })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, DirectorError> {
        let body = self.get_text(path).await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Start a task-backed request and return the task id
    async fn start_task(&self, path: &str) -> Result<u64, DirectorError> {
        let (url, response) = self.get(path).await?;
        let status = response.status();

        if status.is_redirection() {
            let location = response
                .headers()
                .get(reqwest::header::LOCATION)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default();
            return task_id_from_location(location).ok_or_else(|| DirectorError::Protocol {
                url,
                reason: format!("redirect without task location: '{location}'"),
            });
        }

        if status.is_success() {
            let body = response
                .text()
                .await
                .map_err(|source| DirectorError::Http { url, source })?;
            let task: TaskResp = serde_json::from_str(&body)?;
            return Ok(task.id);
        }

        Err(DirectorError::Status {
            url,
            status: status.as_u16(),
        })
    }

    async fn wait_for_task(&self, id: u64) -> Result<(), DirectorError> {
        loop {
            let task: TaskResp = self.get_json(&format!("/tasks/{id}")).await?;
            if TASK_RUNNING_STATES.contains(&task.state.as_str()) {
                tokio::time::sleep(TASK_POLL_INTERVAL).await;
                continue;
            }
            if task.state == TASK_DONE {
                return Ok(());
            }
            return Err(DirectorError::Task {
                id,
                state: task.state,
            });
        }
    }
}

#[async_trait]
impl Director for HttpDirector {
    async fn deployments(&self) -> Result<Vec<String>, DirectorError> {
        let deployments: Vec<DeploymentResp> = self.get_json("/deployments").await?;
        Ok(deployments.into_iter().map(|d| d.name).collect())
    }

    async fn manifest(&self, deployment: &str) -> Result<String, DirectorError> {
        let resp: ManifestResp = self.get_json(&deployment_path(deployment)).await?;
        Ok(resp.manifest.unwrap_or_default())
    }

    async fn instance_infos(&self, deployment: &str) -> Result<Vec<VmInfo>, DirectorError> {
        let id = self
            .start_task(&format!("{}/instances?format=full", deployment_path(deployment)))
            .await?;
        tracing::debug!("Waiting for director task {} ({})", id, deployment);
        self.wait_for_task(id).await?;

        let output = self
            .get_text(&format!("/tasks/{id}/output?type=result"))
            .await?;
        parse_vm_infos(&output)
    }
}

fn deployment_path(deployment: &str) -> String {
    format!("/deployments/{}", urlencoding::encode(deployment))
}

/// Task id from a `Location` such as `/tasks/42` or `https://host:25555/tasks/42`
fn task_id_from_location(location: &str) -> Option<u64> {
    let path = location.split('?').next()?;
    path.trim_end_matches('/').rsplit('/').next()?.parse().ok()
}

/// Task result output is one JSON record per line
fn parse_vm_infos(output: &str) -> Result<Vec<VmInfo>, DirectorError> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| serde_json::from_str(line).map_err(DirectorError::from))
        .collect()
}

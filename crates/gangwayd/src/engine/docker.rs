//! Docker implementation of the engine client.
//!
//! Thin translation layer: every trait method maps to one Docker API
//! call, with engine responses converted into domain types at the edge.
//! State is never cached here; each call reads the daemon live.

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, KillContainerOptions, ListContainersOptions, LogsOptions,
    RemoveContainerOptions, StartContainerOptions, StatsOptions, StopContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::image::CreateImageOptions;
use bollard::models::{HostConfig, PortBinding};
use bollard::Docker;
use futures::StreamExt;
use gangway_core::{ContainerBrief, ContainerId, ContainerState, SpawnPlan};
use std::collections::HashMap;
use tracing::{debug, info};

use super::{ChunkStream, ContainerEngine, EngineError, EngineResult, ShellSession};

/// Seconds the engine waits before force-killing on stop.
const STOP_TIMEOUT_SECS: i64 = 10;

/// Engine client backed by the local Docker daemon.
pub struct DockerEngine {
    docker: Docker,
}

impl DockerEngine {
    /// Connects to the Docker daemon and verifies it responds.
    pub async fn connect() -> EngineResult<Self> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| EngineError::Unavailable(e.to_string()))?;

        docker
            .ping()
            .await
            .map_err(|e| EngineError::Unavailable(e.to_string()))?;
        info!("Connected to Docker daemon");

        Ok(Self { docker })
    }
}

/// Maps a Docker API error onto the engine taxonomy.
fn map_engine_err(err: bollard::errors::Error) -> EngineError {
    match err {
        bollard::errors::Error::DockerResponseServerError {
            status_code: 404,
            message,
        } => EngineError::NotFound(message),
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } => EngineError::Api(format!("engine returned {status_code}: {message}")),
        other => EngineError::Unavailable(other.to_string()),
    }
}

/// Treats the engine's 304 "not modified" as success: the container is
/// already in the requested state, which the engine owns.
fn tolerate_already_done(result: Result<(), bollard::errors::Error>) -> EngineResult<()> {
    match result {
        Ok(()) => Ok(()),
        Err(bollard::errors::Error::DockerResponseServerError {
            status_code: 304, ..
        }) => Ok(()),
        Err(e) => Err(map_engine_err(e)),
    }
}

#[async_trait]
impl ContainerEngine for DockerEngine {
    async fn list_containers(&self, all: bool) -> EngineResult<Vec<ContainerBrief>> {
        let options = ListContainersOptions::<String> {
            all,
            ..Default::default()
        };

        let summaries = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(map_engine_err)?;

        Ok(summaries
            .into_iter()
            .map(|c| ContainerBrief {
                id: ContainerId::new(c.id.unwrap_or_default()),
                names: c.names.unwrap_or_default(),
                image: c.image.unwrap_or_default(),
                state: ContainerState::parse(c.state.as_deref().unwrap_or("")),
                status: c.status.unwrap_or_default(),
            })
            .collect())
    }

    async fn start_container(&self, id: &ContainerId) -> EngineResult<()> {
        self.docker
            .start_container(id.as_str(), None::<StartContainerOptions<String>>)
            .await
            .map_err(map_engine_err)
    }

    async fn stop_container(&self, id: &ContainerId) -> EngineResult<()> {
        let options = StopContainerOptions {
            t: STOP_TIMEOUT_SECS,
        };
        tolerate_already_done(self.docker.stop_container(id.as_str(), Some(options)).await)
    }

    async fn kill_container(&self, id: &ContainerId) -> EngineResult<()> {
        self.docker
            .kill_container(id.as_str(), None::<KillContainerOptions<String>>)
            .await
            .map_err(map_engine_err)
    }

    async fn restart_container(&self, id: &ContainerId) -> EngineResult<()> {
        tolerate_already_done(self.docker.restart_container(id.as_str(), None).await)
    }

    async fn remove_container(&self, id: &ContainerId) -> EngineResult<()> {
        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };
        self.docker
            .remove_container(id.as_str(), Some(options))
            .await
            .map_err(map_engine_err)
    }

    async fn image_exists(&self, image: &str) -> EngineResult<bool> {
        match self.docker.inspect_image(image).await {
            Ok(_) => Ok(true),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(false),
            Err(e) => Err(map_engine_err(e)),
        }
    }

    async fn pull_image(&self, image: &str) -> EngineResult<()> {
        let options = CreateImageOptions {
            from_image: image.to_string(),
            ..Default::default()
        };

        // Drain the progress stream; the pull is done when it ends, and
        // the first error aborts it.
        let mut progress = self.docker.create_image(Some(options), None, None);
        while let Some(step) = progress.next().await {
            let info = step.map_err(map_engine_err)?;
            debug!(image = %image, status = ?info.status, "Pull progress");
        }

        info!(image = %image, "Image pulled");
        Ok(())
    }

    async fn create_container(&self, plan: &SpawnPlan) -> EngineResult<ContainerId> {
        let mut exposed_ports: HashMap<String, HashMap<(), ()>> = HashMap::new();
        let mut port_bindings: HashMap<String, Option<Vec<PortBinding>>> = HashMap::new();
        for mapping in &plan.ports {
            exposed_ports.insert(mapping.container_key(), HashMap::new());
            port_bindings.insert(
                mapping.container_key(),
                Some(vec![PortBinding {
                    host_ip: None,
                    host_port: Some(mapping.host_port.to_string()),
                }]),
            );
        }

        let mut volumes: HashMap<String, HashMap<(), ()>> = HashMap::new();
        let mut binds: Vec<String> = Vec::new();
        for mapping in &plan.volumes {
            volumes.insert(mapping.container_path.clone(), HashMap::new());
            binds.push(mapping.bind());
        }

        let config = Config {
            image: Some(plan.image.clone()),
            env: (!plan.env.is_empty()).then(|| plan.env.clone()),
            exposed_ports: (!exposed_ports.is_empty()).then_some(exposed_ports),
            volumes: (!volumes.is_empty()).then_some(volumes),
            host_config: Some(HostConfig {
                port_bindings: (!port_bindings.is_empty()).then_some(port_bindings),
                binds: (!binds.is_empty()).then_some(binds),
                ..Default::default()
            }),
            ..Default::default()
        };

        let response = match &plan.name {
            Some(name) => {
                let options = CreateContainerOptions {
                    name: name.clone(),
                    platform: None,
                };
                self.docker.create_container(Some(options), config).await
            }
            None => {
                self.docker
                    .create_container(None::<CreateContainerOptions<String>>, config)
                    .await
            }
        }
        .map_err(map_engine_err)?;

        Ok(ContainerId::new(response.id))
    }

    async fn log_stream(&self, id: &ContainerId) -> EngineResult<ChunkStream> {
        let options = LogsOptions::<String> {
            follow: true,
            stdout: true,
            stderr: true,
            since: 0,
            ..Default::default()
        };

        let stream = self.docker.logs(id.as_str(), Some(options)).map(|item| {
            item.map(|chunk| String::from_utf8_lossy(&chunk.into_bytes()).into_owned())
                .map_err(map_engine_err)
        });

        Ok(Box::pin(stream))
    }

    async fn stats_stream(&self, id: &ContainerId) -> EngineResult<ChunkStream> {
        let options = StatsOptions {
            stream: true,
            one_shot: false,
        };

        let stream = self.docker.stats(id.as_str(), Some(options)).map(|item| {
            item.map_err(map_engine_err).and_then(|stats| {
                serde_json::to_string(&stats).map_err(|e| EngineError::Api(e.to_string()))
            })
        });

        Ok(Box::pin(stream))
    }

    async fn open_shell(&self, id: &ContainerId) -> EngineResult<ShellSession> {
        let exec = self
            .docker
            .create_exec(
                id.as_str(),
                CreateExecOptions::<String> {
                    cmd: Some(vec!["/bin/sh".to_string()]),
                    attach_stdin: Some(true),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    tty: Some(true),
                    ..Default::default()
                },
            )
            .await
            .map_err(map_engine_err)?;

        match self
            .docker
            .start_exec(&exec.id, None)
            .await
            .map_err(map_engine_err)?
        {
            StartExecResults::Attached { output, input } => {
                let output = output.map(|item| {
                    item.map(|chunk| String::from_utf8_lossy(&chunk.into_bytes()).into_owned())
                        .map_err(map_engine_err)
                });
                Ok(ShellSession {
                    output: Box::pin(output),
                    input,
                })
            }
            StartExecResults::Detached => {
                Err(EngineError::Api("exec session started detached".to_string()))
            }
        }
    }
}

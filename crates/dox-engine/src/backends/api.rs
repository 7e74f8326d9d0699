//! Structured API backend
//!
//! Talks to the engine's control socket through bollard. Container steps are
//! exposed individually through [`ContainerEngine`] and driven by
//! [`run_attached`].

use crate::attach::{Attachment, ContainerEngine, run_attached};
use crate::backend::{Backend, Session};
use crate::error::{Error, Result};
use crate::io::OutputChunk;
use crate::progress::drain_progress;
use crate::request::ExecutionRequest;
use crate::resolver::split_reference;
use crate::terminal::TerminalSize;
use async_trait::async_trait;
use bollard::container::{
    AttachContainerOptions, AttachContainerResults, Config, CreateContainerOptions,
    KillContainerOptions, ListContainersOptions, RemoveContainerOptions,
    ResizeContainerTtyOptions, StartContainerOptions, WaitContainerOptions,
};
use bollard::image::{BuildImageOptions, CreateImageOptions, ListImagesOptions, RemoveImageOptions};
use bollard::models::{HostConfig, PortBinding as ApiPortBinding};
use bollard::{API_DEFAULT_VERSION, Docker};
use futures_util::{StreamExt, TryStreamExt};
use nix::sys::signal::Signal;
use std::collections::HashMap;
use tracing::{debug, info};

/// Seconds before a request to the engine times out
const CONNECT_TIMEOUT_SECS: u64 = 120;

/// Backend speaking the engine's HTTP API over its control socket
#[derive(Clone)]
pub struct ApiBackend {
    docker: Docker,
}

impl ApiBackend {
    /// Connect using the engine's local defaults (`DOCKER_HOST` or the
    /// standard socket)
    pub fn connect_local() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| Error::unavailable(format!("Failed to connect to Docker: {}", e)))?;
        Ok(Self { docker })
    }

    /// Connect to an explicit host: a unix socket path or `unix://`, `tcp://`
    /// or `http://` URL
    pub fn connect(host: &str) -> Result<Self> {
        let connected = if host.starts_with("tcp://") || host.starts_with("http://") {
            Docker::connect_with_http(host, CONNECT_TIMEOUT_SECS, API_DEFAULT_VERSION)
        } else {
            Docker::connect_with_unix(host, CONNECT_TIMEOUT_SECS, API_DEFAULT_VERSION)
        };
        let docker = connected.map_err(|e| {
            Error::unavailable(format!("Failed to connect to Docker at {}: {}", host, e))
        })?;
        Ok(Self { docker })
    }

    fn container_config(request: &ExecutionRequest) -> Config<String> {
        let mut exposed_ports = HashMap::new();
        let mut port_bindings: HashMap<String, Option<Vec<ApiPortBinding>>> = HashMap::new();
        for pair in request.ports().iter().flat_map(|binding| binding.pairs()) {
            let key = pair.container_key();
            exposed_ports.insert(key.clone(), HashMap::new());
            port_bindings
                .entry(key)
                .or_insert_with(|| Some(Vec::new()))
                .get_or_insert_with(Vec::new)
                .push(ApiPortBinding {
                    host_ip: pair.host_ip.clone(),
                    host_port: pair.host_port.map(|port| port.to_string()),
                });
        }

        let host_config = HostConfig {
            binds: Some(request.binds().to_vec()),
            network_mode: request.network().as_engine_str().map(str::to_string),
            port_bindings: (!port_bindings.is_empty()).then_some(port_bindings),
            console_size: request
                .terminal_size()
                .map(|size| vec![i32::from(size.rows), i32::from(size.cols)]),
            ..Default::default()
        };

        Config {
            image: Some(request.image().to_string()),
            cmd: (!request.argv().is_empty()).then(|| request.argv().to_vec()),
            env: Some(request.env_strings()),
            user: Some(request.user()),
            working_dir: request.working_dir().map(str::to_string),
            attach_stdin: Some(true),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            open_stdin: Some(true),
            tty: Some(request.tty()),
            exposed_ports: (!exposed_ports.is_empty()).then_some(exposed_ports),
            host_config: Some(host_config),
            ..Default::default()
        }
    }
}

#[async_trait]
impl Backend for ApiBackend {
    fn name(&self) -> &str {
        "docker"
    }

    async fn is_available(&self) -> Result<()> {
        self.docker.ping().await.map_err(|e| {
            debug!("Docker ping failed: {}", e);
            Error::unavailable("Docker daemon not responding. Is Docker running?")
        })?;
        Ok(())
    }

    async fn pull_image(&self, image: &str) -> Result<()> {
        let (from_image, tag) = split_reference(image);
        let options = CreateImageOptions {
            from_image,
            tag,
            ..Default::default()
        };
        info!("Pulling {}", image);
        drain_progress(image, self.docker.create_image(Some(options), None, None)).await
    }

    async fn build_image(&self, dockerfile: &str, tag: &str) -> Result<()> {
        let mut header = tar::Header::new_gnu();
        header.set_size(dockerfile.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();

        let mut archive = tar::Builder::new(Vec::new());
        archive.append_data(&mut header, "Dockerfile", dockerfile.as_bytes())?;
        let context = archive.into_inner()?;

        let options = BuildImageOptions {
            dockerfile: "Dockerfile",
            t: tag,
            rm: true,
            ..Default::default()
        };
        info!("Building {}", tag);
        drain_progress(tag, self.docker.build_image(options, None, Some(context.into()))).await
    }

    async fn list_images(&self) -> Result<Vec<String>> {
        let images = self
            .docker
            .list_images(Some(ListImagesOptions::<String>::default()))
            .await?;
        Ok(images
            .into_iter()
            .flat_map(|image| image.repo_tags)
            .filter(|tag| tag != "<none>:<none>")
            .collect())
    }

    async fn remove_image(&self, image: &str) -> Result<()> {
        let options = RemoveImageOptions {
            force: false,
            noprune: false,
        };
        self.docker
            .remove_image(image, Some(options), None)
            .await?;
        Ok(())
    }

    async fn remove_stopped_containers(&self) -> Result<usize> {
        let options = ListContainersOptions {
            all: true,
            filters: HashMap::from([("status", vec!["exited"])]),
            ..Default::default()
        };
        let containers = self.docker.list_containers(Some(options)).await?;

        let mut removed = 0;
        for id in containers.into_iter().filter_map(|container| container.id) {
            self.docker
                .remove_container(&id, None::<RemoveContainerOptions>)
                .await?;
            debug!("Removed container {}", id);
            removed += 1;
        }
        Ok(removed)
    }

    async fn create_and_run(&self, request: &ExecutionRequest, session: Session) -> Result<i64> {
        run_attached(self, request, session).await
    }
}

#[async_trait]
impl ContainerEngine for ApiBackend {
    async fn create_container(&self, request: &ExecutionRequest) -> Result<String> {
        let response = self
            .docker
            .create_container(
                None::<CreateContainerOptions<String>>,
                Self::container_config(request),
            )
            .await
            .map_err(|e| match e {
                bollard::errors::Error::DockerResponseServerError {
                    status_code: 404, ..
                } => Error::ImageNotFound {
                    image: request.image().to_string(),
                },
                other => Error::Api(other),
            })?;

        for warning in &response.warnings {
            debug!("Create warning: {}", warning);
        }
        Ok(response.id)
    }

    async fn attach_container(&self, id: &str) -> Result<Attachment> {
        let options = AttachContainerOptions::<String> {
            stdin: Some(true),
            stdout: Some(true),
            stderr: Some(true),
            stream: Some(true),
            ..Default::default()
        };
        let AttachContainerResults { output, input } =
            self.docker.attach_container(id, Some(options)).await?;

        Ok(Attachment {
            output: output
                .map_ok(OutputChunk::from)
                .map_err(Error::from)
                .boxed(),
            input,
        })
    }

    async fn start_container(&self, id: &str) -> Result<()> {
        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await?;
        Ok(())
    }

    async fn resize_container(&self, id: &str, size: TerminalSize) -> Result<()> {
        let options = ResizeContainerTtyOptions {
            width: size.cols,
            height: size.rows,
        };
        self.docker.resize_container_tty(id, options).await?;
        Ok(())
    }

    async fn wait_container(&self, id: &str) -> Result<i64> {
        let options = WaitContainerOptions {
            condition: "not-running",
        };
        let mut events = self.docker.wait_container(id, Some(options));

        match events.next().await {
            Some(Ok(response)) => Ok(response.status_code),
            // Non-zero exits arrive as an error carrying the code
            Some(Err(bollard::errors::Error::DockerContainerWaitError { code, .. })) => Ok(code),
            Some(Err(e)) => Err(Error::wait(e)),
            None => Err(Error::wait("wait stream closed without a status")),
        }
    }

    async fn kill_container(&self, id: &str, signal: Signal) -> Result<()> {
        let options = KillContainerOptions {
            signal: signal.as_str(),
        };
        self.docker.kill_container(id, Some(options)).await?;
        Ok(())
    }

    async fn remove_container(&self, id: &str) -> Result<()> {
        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };
        self.docker.remove_container(id, Some(options)).await?;
        Ok(())
    }
}

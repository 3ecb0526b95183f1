//! Container sandbox driven through the `docker` CLI.
//!
//! # Lifecycle
//!
//! - [`DockerSandbox::create`] force-removes any container already using the
//!   target name, starts a fresh one and runs the setup commands. Stale
//!   repository state is never reused across sessions.
//! - [`Sandbox::teardown`] force-removes the container and is safe to call
//!   repeatedly.
//! - `Drop` performs the same removal synchronously as a last resort, so
//!   the container is released on every exit path, panics included.

use std::process::Stdio;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::process::run_with_timeout;
use super::{merged_script, CommandOutput, ContainerStatus, Sandbox};
use crate::config::SandboxConfig;
use crate::error::{RepairError, Result};

/// Everything needed to provision a container for one repository checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxSpec {
    /// Image with the repository already checked out and installed.
    pub image: String,
    /// Container name.
    pub name: String,
    /// Repository root inside the container.
    pub workdir: String,
    /// Commands run once after start.
    pub setup: Vec<String>,
    /// Default per-command timeout.
    pub timeout: Duration,
}

impl SandboxSpec {
    /// Build a spec from configuration, generating a name when none is set.
    #[must_use]
    pub fn from_config(config: &SandboxConfig) -> Self {
        Self {
            image: config.image.clone(),
            name: config
                .name
                .clone()
                .unwrap_or_else(|| format!("repairkit-{}", Uuid::new_v4().simple())),
            workdir: config.workdir.clone(),
            setup: config.setup.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

/// A running container bound to one session.
#[derive(Debug)]
pub struct DockerSandbox {
    name: String,
    workdir: String,
    timeout: Duration,
    status: Mutex<ContainerStatus>,
}

impl DockerSandbox {
    /// Provision a fresh container for `spec`.
    ///
    /// # Errors
    ///
    /// Returns [`RepairError::MissingTool`] if `docker` is not on PATH and
    /// [`RepairError::SandboxSetup`] if the container cannot be started or a
    /// setup command fails. Either aborts the session.
    pub async fn create(spec: &SandboxSpec) -> Result<Self> {
        which::which("docker").map_err(|_| RepairError::MissingTool {
            tool: "docker".to_string(),
        })?;

        if let Some(status) = inspect_status(&spec.name).await? {
            warn!(container = %spec.name, %status, "Removing stale container with the same name");
            force_remove(&spec.name).await?;
        }

        let mut run = Command::new("docker");
        run.args(["run", "-d", "--name", spec.name.as_str(), "-w", spec.workdir.as_str()])
            .arg(&spec.image)
            .args(["sleep", "infinity"]);
        let started = run_with_timeout(run, None, spec.timeout).await?;
        if !started.success() {
            return Err(RepairError::sandbox_setup(format!(
                "docker run {} failed: {}",
                spec.image,
                started.output.trim()
            )));
        }

        info!(container = %spec.name, image = %spec.image, "Container started");

        let sandbox = Self {
            name: spec.name.clone(),
            workdir: spec.workdir.clone(),
            timeout: spec.timeout,
            status: Mutex::new(ContainerStatus::Running),
        };

        // On failure `sandbox` drops here and removes the container.
        for command in &spec.setup {
            let output = sandbox.execute(command).await.map_err(|e| {
                RepairError::sandbox_setup(format!("setup command failed: {}", e))
            })?;
            debug!(container = %spec.name, command = %command, output = %output.trim(), "Setup step done");
        }

        Ok(sandbox)
    }

    fn set_status(&self, status: ContainerStatus) {
        *self.status.lock().unwrap_or_else(|e| e.into_inner()) = status;
    }
}

#[async_trait]
impl Sandbox for DockerSandbox {
    fn name(&self) -> &str {
        &self.name
    }

    fn workdir(&self) -> &str {
        &self.workdir
    }

    fn default_timeout(&self) -> Duration {
        self.timeout
    }

    fn status(&self) -> ContainerStatus {
        *self.status.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn exec_raw(
        &self,
        command: &str,
        stdin: Option<&str>,
        workdir: &str,
        timeout: Duration,
    ) -> Result<CommandOutput> {
        let mut cmd = Command::new("docker");
        cmd.arg("exec");
        if stdin.is_some() {
            cmd.arg("-i");
        }
        cmd.args(["-w", workdir, self.name.as_str(), "sh", "-c"])
            .arg(merged_script(command));
        run_with_timeout(cmd, stdin, timeout).await
    }

    async fn teardown(&self) -> Result<()> {
        if !self.status().needs_removal() {
            return Ok(());
        }

        match inspect_status(&self.name).await? {
            Some(status) => {
                debug!(container = %self.name, %status, "Tearing down container");
                force_remove(&self.name).await?;
            }
            None => debug!(container = %self.name, "Container already gone"),
        }
        self.set_status(ContainerStatus::Removed);
        info!(container = %self.name, "Container removed");
        Ok(())
    }
}

impl Drop for DockerSandbox {
    fn drop(&mut self) {
        if !self.status().needs_removal() {
            return;
        }
        warn!(container = %self.name, "Sandbox dropped without teardown; force-removing");
        let _ = std::process::Command::new("docker")
            .args(["rm", "-f", self.name.as_str()])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
    }
}

/// Current status of a named container, or `None` if it does not exist.
async fn inspect_status(name: &str) -> Result<Option<ContainerStatus>> {
    let mut cmd = Command::new("docker");
    cmd.args(["inspect", "-f", "{{.State.Status}}", name]);
    let out = run_with_timeout(cmd, None, Duration::from_secs(30)).await?;
    if out.success() {
        Ok(Some(ContainerStatus::from_docker_state(&out.output)))
    } else {
        Ok(None)
    }
}

async fn force_remove(name: &str) -> Result<()> {
    let mut cmd = Command::new("docker");
    cmd.args(["rm", "-f", name]);
    let out = run_with_timeout(cmd, None, Duration::from_secs(60)).await?;
    if !out.success() {
        return Err(RepairError::command_failed(
            format!("docker rm -f {name}"),
            out.output,
            out.exit_code,
        ));
    }
    Ok(())
}

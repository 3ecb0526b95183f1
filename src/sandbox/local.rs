//! Host-directory sandbox.
//!
//! Runs commands with `sh -c` inside a directory on the host. There is no
//! isolation; it exists for working on a local checkout and for tests.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use super::process::run_with_timeout;
use super::{merged_script, CommandOutput, ContainerStatus, Sandbox};
use crate::error::{IntoRepairError, RepairError, Result};

/// A sandbox rooted at a host directory.
#[derive(Debug)]
pub struct LocalSandbox {
    name: String,
    root: PathBuf,
    workdir: String,
    timeout: Duration,
    status: Mutex<ContainerStatus>,
}

impl LocalSandbox {
    /// Bind to an existing directory.
    ///
    /// # Errors
    ///
    /// Returns a setup error if `root` is not a directory.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        if !root.is_dir() {
            return Err(RepairError::sandbox_setup(format!(
                "{} is not a directory",
                root.display()
            )));
        }
        let root = root.canonicalize().into_repair_setup()?;
        Ok(Self {
            name: format!("local:{}", root.display()),
            workdir: root.display().to_string(),
            root,
            timeout: Duration::from_secs(300),
            status: Mutex::new(ContainerStatus::Running),
        })
    }

    /// Override the default per-command timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Root directory on the host.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, workdir: &str) -> PathBuf {
        let path = Path::new(workdir);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

#[async_trait]
impl Sandbox for LocalSandbox {
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
        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(merged_script(command))
            .current_dir(self.resolve(workdir));
        run_with_timeout(cmd, stdin, timeout).await
    }

    async fn teardown(&self) -> Result<()> {
        let mut status = self.status.lock().unwrap_or_else(|e| e.into_inner());
        if status.needs_removal() {
            debug!(sandbox = %self.name, "Releasing local sandbox");
            *status = ContainerStatus::Removed;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::{ExecOptions, TIMEOUT_EXIT_CODE};
    use tempfile::TempDir;

    fn sandbox(temp: &TempDir) -> LocalSandbox {
        LocalSandbox::new(temp.path()).unwrap()
    }

    #[tokio::test]
    async fn test_execute_returns_output() {
        let temp = TempDir::new().unwrap();
        let sb = sandbox(&temp);
        assert_eq!(sb.execute("echo hello world").await.unwrap(), "hello world\n");
    }

    #[tokio::test]
    async fn test_stderr_is_merged() {
        let temp = TempDir::new().unwrap();
        let sb = sandbox(&temp);
        let out = sb.execute("echo out; echo err >&2").await.unwrap();
        assert_eq!(out, "out\nerr\n");
    }

    #[tokio::test]
    async fn test_non_zero_exit_fails_with_command_and_output() {
        let temp = TempDir::new().unwrap();
        let sb = sandbox(&temp);
        match sb.execute("echo boom; exit 3").await {
            Err(RepairError::CommandFailed {
                command,
                output,
                exit_code,
            }) => {
                assert_eq!(command, "echo boom; exit 3");
                assert_eq!(output, "boom\n");
                assert_eq!(exit_code, 3);
            }
            other => panic!("expected CommandFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_ignore_errors_returns_output() {
        let temp = TempDir::new().unwrap();
        let sb = sandbox(&temp);
        let out = sb
            .execute_with("echo partial; exit 1", &ExecOptions::lenient())
            .await
            .unwrap();
        assert_eq!(out, "partial\n");
    }

    #[tokio::test]
    async fn test_timeout_is_annotated_and_fails() {
        let temp = TempDir::new().unwrap();
        let sb = sandbox(&temp);
        let opts = ExecOptions::default().with_timeout(Duration::from_secs(1));

        match sb.run("echo started; sleep 5", &opts).await {
            Err(RepairError::CommandFailed {
                output, exit_code, ..
            }) => {
                assert_eq!(exit_code, TIMEOUT_EXIT_CODE);
                assert!(output.ends_with("timed out after 1 seconds"));
            }
            other => panic!("expected timeout failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_timeout_with_ignore_errors_returns_annotated_output() {
        let temp = TempDir::new().unwrap();
        let sb = sandbox(&temp);
        let opts = ExecOptions::lenient().with_timeout(Duration::from_secs(1));

        let out = sb.run("sleep 5", &opts).await.unwrap();
        assert!(out.timed_out);
        assert!(out.output.contains("timed out after 1 seconds"));
    }

    #[tokio::test]
    async fn test_write_read_and_exists() {
        let temp = TempDir::new().unwrap();
        let sb = sandbox(&temp);
        let content = "x = 'quoted $HOME `tick`'\n";

        assert!(!sb.file_exists("pkg/mod.py").await.unwrap());
        sb.write_file("pkg/mod.py", content).await.unwrap();
        assert!(sb.file_exists("pkg/mod.py").await.unwrap());
        assert_eq!(sb.read_file("pkg/mod.py").await.unwrap(), content);
        assert_eq!(
            std::fs::read_to_string(temp.path().join("pkg/mod.py")).unwrap(),
            content
        );
    }

    #[tokio::test]
    async fn test_relative_workdir_resolves_against_root() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir(temp.path().join("sub")).unwrap();
        std::fs::write(temp.path().join("sub/marker.txt"), "").unwrap();
        let sb = sandbox(&temp);

        let out = sb
            .execute_with("ls", &ExecOptions::default().with_workdir("sub"))
            .await
            .unwrap();
        assert_eq!(out.trim(), "marker.txt");
    }

    #[tokio::test]
    async fn test_teardown_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let sb = sandbox(&temp);
        assert_eq!(sb.status(), ContainerStatus::Running);
        sb.teardown().await.unwrap();
        sb.teardown().await.unwrap();
        assert_eq!(sb.status(), ContainerStatus::Removed);
    }

    #[test]
    fn test_new_rejects_missing_directory() {
        let temp = TempDir::new().unwrap();
        let result = LocalSandbox::new(temp.path().join("nope"));
        assert!(matches!(result, Err(RepairError::SandboxSetup { .. })));
    }
}

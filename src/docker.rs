//! # Container Runtime Adapter
//!
//! Blocking interface to the local container engine, implemented by
//! shelling out to the `docker` binary. The trait exists so services can
//! run against a fake runtime in tests; the CLI binds [`DockerCli`].
//!
//! All methods block and are intended to run under
//! `tokio::task::spawn_blocking` when called from async services.

use std::io::{Read, Write};
use std::path::Path;
use std::process::{Child, ChildStdout, Command, Stdio};

use tracing::debug;

use crate::error::{Error, Result};

/// Local container engine operations the distribution layer needs.
pub trait ContainerRuntime: Send + Sync {
    /// Starts an export of `image_ref` and returns the tar stream.
    ///
    /// The returned reader surfaces the exporter's failure as an I/O error
    /// at end of stream, so consumers cannot mistake a truncated export for
    /// a complete one.
    fn export(&self, image_ref: &str) -> Result<Box<dyn Read + Send>>;

    /// Imports an image from a tar stream.
    fn import(&self, tar: &mut dyn Read) -> Result<()>;

    /// Returns whether the engine already has `image_ref` locally.
    fn exists(&self, image_ref: &str) -> Result<bool>;

    /// Builds an image from a context directory and Dockerfile.
    fn build(
        &self,
        context: &Path,
        dockerfile: &str,
        tags: &[String],
        platform: Option<&str>,
    ) -> Result<()>;
}

/// [`ContainerRuntime`] backed by the `docker` command-line client.
pub struct DockerCli {
    binary: String,
}

impl DockerCli {
    /// Uses the `docker` binary found on `PATH`.
    pub fn new() -> Self {
        Self::with_binary("docker")
    }

    /// Uses a specific engine binary (e.g. `podman`).
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new()
    }
}

impl ContainerRuntime for DockerCli {
    fn export(&self, image_ref: &str) -> Result<Box<dyn Read + Send>> {
        debug!(image_ref, "exporting image");
        let mut child = Command::new(&self.binary)
            .args(["save", image_ref])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::ExportFailed {
                reference: image_ref.to_string(),
                reason: e.to_string(),
            })?;

        let stdout = child.stdout.take().ok_or_else(|| Error::ExportFailed {
            reference: image_ref.to_string(),
            reason: "export stream unavailable".to_string(),
        })?;

        Ok(Box::new(ExportStream {
            child,
            stdout,
            finished: false,
        }))
    }

    fn import(&self, tar: &mut dyn Read) -> Result<()> {
        debug!("importing image");
        let mut child = Command::new(&self.binary)
            .arg("load")
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::Runtime(format!("failed to start {} load: {e}", self.binary)))?;

        // Feed the tar, then close stdin so the engine sees EOF.
        if let Some(mut stdin) = child.stdin.take() {
            let copy_result = std::io::copy(tar, &mut stdin).and_then(|_| stdin.flush());
            drop(stdin);
            if let Err(e) = copy_result {
                let _ = child.wait();
                return Err(Error::Runtime(format!("failed to stream tar: {e}")));
            }
        }

        let output = child
            .wait_with_output()
            .map_err(|e| Error::Runtime(e.to_string()))?;
        if !output.status.success() {
            return Err(Error::Runtime(format!(
                "{} load exited with {}: {}",
                self.binary,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }

    fn exists(&self, image_ref: &str) -> Result<bool> {
        let output = Command::new(&self.binary)
            .args(["image", "inspect", image_ref])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| Error::Runtime(format!("failed to run {} image inspect: {e}", self.binary)))?;

        if output.status.success() {
            return Ok(true);
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("No such image") || stderr.contains("No such object") {
            return Ok(false);
        }
        Err(Error::Runtime(format!(
            "{} image inspect {image_ref} failed: {}",
            self.binary,
            stderr.trim()
        )))
    }

    fn build(
        &self,
        context: &Path,
        dockerfile: &str,
        tags: &[String],
        platform: Option<&str>,
    ) -> Result<()> {
        let dockerfile_path = if Path::new(dockerfile).is_absolute() {
            Path::new(dockerfile).to_path_buf()
        } else {
            context.join(dockerfile)
        };
        if !dockerfile_path.exists() {
            return Err(Error::BuildFailed {
                tag: tags.first().cloned().unwrap_or_default(),
                reason: format!("dockerfile not found: {}", dockerfile_path.display()),
            });
        }

        let mut command = Command::new(&self.binary);
        command.arg("build").arg("-f").arg(&dockerfile_path);
        for tag in tags {
            command.arg("-t").arg(tag);
        }
        if let Some(platform) = platform {
            command.arg("--platform").arg(platform);
        }
        command.arg(context);

        debug!(?command, "building image");
        let status = command
            .status()
            .map_err(|e| Error::Runtime(format!("failed to run {} build: {e}", self.binary)))?;

        if !status.success() {
            return Err(Error::BuildFailed {
                tag: tags.first().cloned().unwrap_or_default(),
                reason: format!("{} build exited with {status}", self.binary),
            });
        }
        Ok(())
    }
}

/// Tar stream from a running `docker save`, checking the exit status at EOF.
struct ExportStream {
    child: Child,
    stdout: ChildStdout,
    finished: bool,
}

impl Read for ExportStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.stdout.read(buf)?;
        if n == 0 && !self.finished {
            self.finished = true;
            let status = self.child.wait()?;
            if !status.success() {
                let mut stderr = String::new();
                if let Some(mut err) = self.child.stderr.take() {
                    let _ = err.read_to_string(&mut stderr);
                }
                return Err(std::io::Error::other(format!(
                    "export exited with {status}: {}",
                    stderr.trim()
                )));
            }
        }
        Ok(n)
    }
}

impl Drop for ExportStream {
    fn drop(&mut self) {
        if !self.finished {
            // Abandoned mid-stream; reap the exporter.
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

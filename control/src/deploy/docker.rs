//! Docker CLI runtime

use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::deploy::runtime::{BuildSpec, ContainerRuntime, RunSpec, RunningContainer};
use crate::errors::ControlError;

/// Container runtime driving the docker binary
#[derive(Debug, Clone)]
pub struct DockerCli {
    binary: String,
}

impl DockerCli {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Run a docker subcommand, returning stdout on success
    async fn exec(&self, args: &[String]) -> Result<String, ControlError> {
        debug!("{} {}", self.binary, args.join(" "));
        let output = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ControlError::DeployError(format!("Failed to run {}: {}", self.binary, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ControlError::DeployError(format!(
                "docker {} failed: {}",
                args.first().map(String::as_str).unwrap_or_default(),
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

fn owned(args: &[&str]) -> Vec<String> {
    args.iter().map(|a| a.to_string()).collect()
}

/// Build the `docker run` argument list
pub fn run_args(image: &str, spec: &RunSpec) -> Vec<String> {
    let mut args = owned(&["run", "-d", "--name", &spec.name, "--restart", "unless-stopped"]);
    for (key, value) in &spec.env {
        args.push("-e".to_string());
        args.push(format!("{}={}", key, value));
    }
    for (key, value) in &spec.labels {
        args.push("--label".to_string());
        args.push(format!("{}={}", key, value));
    }
    for volume in &spec.volumes {
        args.push("-v".to_string());
        args.push(format!("{}:{}", volume.name, volume.mount_path));
    }
    if let Some(cpus) = spec.cpu_limit {
        args.push("--cpus".to_string());
        args.push(cpus.to_string());
    }
    if let Some(memory) = spec.memory_limit_mb {
        args.push("--memory".to_string());
        args.push(format!("{}m", memory));
    }
    if let Some(port) = spec.container_port {
        // Loopback only; the reverse proxy is the public entry point
        args.push("-p".to_string());
        args.push(format!("127.0.0.1::{}", port));
    }
    args.push(image.to_string());
    args
}

/// Parse `docker port` output such as `127.0.0.1:49153`
pub fn parse_host_port(output: &str) -> Option<u16> {
    output
        .lines()
        .next()
        .and_then(|line| line.trim().rsplit(':').next())
        .and_then(|port| port.parse().ok())
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn build(&self, spec: &BuildSpec) -> Result<String, ControlError> {
        info!("Building image {} from {}", spec.tag, spec.context_dir.display());
        let context = spec.context_dir.to_string_lossy().into_owned();
        let dockerfile = spec.context_dir.join(&spec.dockerfile);
        self.exec(&[
            "build".to_string(),
            "-f".to_string(),
            dockerfile.to_string_lossy().into_owned(),
            "-t".to_string(),
            spec.tag.clone(),
            context,
        ])
        .await?;
        Ok(spec.tag.clone())
    }

    async fn pull(&self, image: &str) -> Result<String, ControlError> {
        info!("Pulling image {}", image);
        self.exec(&owned(&["pull", image])).await?;
        Ok(image.to_string())
    }

    async fn tag(&self, source: &str, target: &str) -> Result<(), ControlError> {
        self.exec(&owned(&["tag", source, target])).await?;
        Ok(())
    }

    async fn run(&self, image: &str, spec: &RunSpec) -> Result<RunningContainer, ControlError> {
        // A leftover container with the same name blocks `run`
        let _ = self.exec(&owned(&["rm", "-f", &spec.name])).await;

        let stdout = self.exec(&run_args(image, spec)).await?;
        let container_id = stdout.trim().to_string();
        if container_id.is_empty() {
            return Err(ControlError::DeployError(format!(
                "docker run returned no container id for {}",
                image
            )));
        }

        let host_port = match spec.container_port {
            Some(port) => {
                let out = self
                    .exec(&owned(&["port", &container_id, &format!("{}/tcp", port)]))
                    .await?;
                parse_host_port(&out)
            }
            None => None,
        };

        info!("Started container {} from {}", container_id, image);
        Ok(RunningContainer {
            container_id,
            host_port,
        })
    }

    async fn stop(&self, container_id: &str) -> Result<(), ControlError> {
        self.exec(&owned(&["stop", container_id])).await?;
        if let Err(e) = self.exec(&owned(&["rm", container_id])).await {
            warn!("Failed to remove container {}: {}", container_id, e);
        }
        Ok(())
    }

    async fn logs(&self, container_id: &str, tail: usize) -> Result<String, ControlError> {
        let output = Command::new(&self.binary)
            .args(["logs", "--tail", &tail.to_string(), container_id])
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ControlError::DeployError(format!("Failed to run docker logs: {}", e)))?;

        if !output.status.success() {
            return Err(ControlError::DeployError(format!(
                "docker logs failed for {}: {}",
                container_id,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        // Containers write to both streams
        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(text)
    }

    async fn image_exists(&self, image: &str) -> Result<bool, ControlError> {
        let status = Command::new(&self.binary)
            .args(["image", "inspect", image])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await
            .map_err(|e| ControlError::DeployError(format!("Failed to run docker image inspect: {}", e)))?;
        Ok(status.success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::VolumeMount;

    #[test]
    fn test_run_args() {
        let mut spec = RunSpec {
            name: "api-0".to_string(),
            memory_limit_mb: Some(256),
            container_port: Some(8080),
            ..Default::default()
        };
        spec.env.insert("PORT".to_string(), "8080".to_string());
        spec.volumes.push(VolumeMount {
            name: "data".to_string(),
            mount_path: "/data".to_string(),
        });

        let args = run_args("shipyard/api:1", &spec);
        assert_eq!(&args[..6], &["run", "-d", "--name", "api-0", "--restart", "unless-stopped"]);
        assert!(args.windows(2).any(|w| w == ["-e", "PORT=8080"]));
        assert!(args.windows(2).any(|w| w == ["-v", "data:/data"]));
        assert!(args.windows(2).any(|w| w == ["--memory", "256m"]));
        assert!(args.windows(2).any(|w| w == ["-p", "127.0.0.1::8080"]));
        assert_eq!(args.last().unwrap(), "shipyard/api:1");
    }

    #[test]
    fn test_parse_host_port() {
        assert_eq!(parse_host_port("127.0.0.1:49153\n"), Some(49153));
        assert_eq!(parse_host_port("[::1]:32768"), Some(32768));
        assert_eq!(parse_host_port(""), None);
    }
}

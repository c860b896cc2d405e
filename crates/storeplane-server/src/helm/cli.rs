// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Helm CLI executor.
//!
//! Shells out to `helm` with piped output and a per-command execution
//! timeout. Children are spawned with `kill_on_drop` so a timed-out or
//! cancelled task never leaves a CLI process behind.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, error, info};

use super::{HelmError, HelmExecutor, InstallRequest, Result};
use crate::config::Config;

/// Keep persisted stderr excerpts short; failure reasons are for humans.
const STDERR_EXCERPT_MAX: usize = 500;

/// Timeout for the lightweight `helm status` existence probe.
const STATUS_TIMEOUT: Duration = Duration::from_secs(30);

/// Helm executor backed by the `helm` binary.
pub struct HelmCli {
    chart_path: PathBuf,
    values_file: String,
    env_values_file: String,
    install_timeout: Duration,
    uninstall_timeout: Duration,
}

impl HelmCli {
    /// Create an executor from the control plane configuration.
    pub fn new(config: &Config) -> Self {
        Self {
            chart_path: config.helm_chart_path.clone(),
            values_file: config.helm_values_file.clone(),
            env_values_file: config.helm_env_values_file.clone(),
            install_timeout: config.helm_install_timeout,
            uninstall_timeout: config.helm_uninstall_timeout,
        }
    }

    async fn run(&self, mut cmd: Command, timeout: Duration) -> Result<std::process::Output> {
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        let child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                HelmError::CliNotFound
            } else {
                HelmError::Io(e)
            }
        })?;

        match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(HelmError::Io(e)),
            // Dropping the wait future drops the child, which kills it.
            Err(_elapsed) => Err(HelmError::Timeout),
        }
    }
}

#[async_trait]
impl HelmExecutor for HelmCli {
    async fn install(&self, request: &InstallRequest) -> Result<()> {
        let mut cmd = Command::new("helm");
        cmd.arg("install")
            .arg(&request.release)
            .arg(&self.chart_path)
            .arg("--namespace")
            .arg(&request.namespace)
            .arg("--create-namespace")
            .arg("-f")
            .arg(self.chart_path.join(&self.values_file))
            .arg("-f")
            .arg(self.chart_path.join(&self.env_values_file));
        for (key, value) in request.set_values() {
            cmd.arg("--set").arg(format!("{key}={value}"));
        }

        debug!(
            release = %request.release,
            namespace = %request.namespace,
            chart = %self.chart_path.display(),
            "running helm install"
        );

        let output = self.run(cmd, self.install_timeout).await?;
        if output.status.success() {
            info!(release = %request.release, "helm install succeeded");
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let err = classify_install_failure(&stderr);
        error!(
            release = %request.release,
            exit_code = output.status.code().unwrap_or(-1),
            error = %err,
            "helm install failed"
        );
        Err(err)
    }

    async fn uninstall(&self, release: &str, namespace: &str) -> Result<()> {
        let mut cmd = Command::new("helm");
        cmd.arg("uninstall")
            .arg(release)
            .arg("--namespace")
            .arg(namespace);

        debug!(release = %release, namespace = %namespace, "running helm uninstall");

        let output = self.run(cmd, self.uninstall_timeout).await?;
        if output.status.success() {
            info!(release = %release, "helm uninstall succeeded");
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        if mentions_missing_release(&stderr) {
            // Already gone: uninstall is idempotent by contract.
            info!(release = %release, "release already absent, treating uninstall as success");
            return Ok(());
        }

        let err = HelmError::Failed { stderr: excerpt(&stderr) };
        error!(release = %release, error = %err, "helm uninstall failed");
        Err(err)
    }

    async fn release_exists(&self, release: &str, namespace: &str) -> Result<bool> {
        let mut cmd = Command::new("helm");
        cmd.arg("status")
            .arg(release)
            .arg("--namespace")
            .arg(namespace);

        let output = self.run(cmd, STATUS_TIMEOUT).await?;
        if output.status.success() {
            return Ok(true);
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        if mentions_missing_release(&stderr) {
            return Ok(false);
        }
        Err(HelmError::Failed { stderr: excerpt(&stderr) })
    }
}

/// Map a non-zero `helm install` to an error kind by stderr content.
fn classify_install_failure(stderr: &str) -> HelmError {
    let lower = stderr.to_lowercase();
    if lower.contains("cannot re-use a name") || lower.contains("already exists") {
        HelmError::AlreadyExists
    } else if lower.contains("chart") && lower.contains("not found") {
        HelmError::ChartNotFound(excerpt(stderr))
    } else {
        HelmError::Failed { stderr: excerpt(stderr) }
    }
}

/// `helm status`/`helm uninstall` stderr for a release that does not exist.
fn mentions_missing_release(stderr: &str) -> bool {
    stderr.to_lowercase().contains("not found")
}

/// Trimmed, bounded stderr excerpt suitable for a persisted failure reason.
fn excerpt(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.len() > STDERR_EXCERPT_MAX {
        let mut cut = STDERR_EXCERPT_MAX;
        while !trimmed.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}...", &trimmed[..cut])
    } else {
        trimmed.to_string()
    }
}

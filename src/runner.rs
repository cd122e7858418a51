use anyhow::{Context, Result};
use std::process::Command;

/// Captured result of a finished command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Output {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

/// Run a command and capture output
pub fn run_capture(cmd: &str, args: &[&str]) -> Result<String> {
    let output = Command::new(cmd)
        .args(args)
        .output()
        .with_context(|| format!("Failed to execute: {} {}", cmd, args.join(" ")))?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("Command failed: {}", stderr.trim())
    }
}

/// Run a shell snippet through `sh -c`, whatever its exit status
pub fn shell(script: &str) -> Result<Output> {
    log::debug!("sh -c {script}");
    let output = Command::new("sh")
        .arg("-c")
        .arg(script)
        .output()
        .with_context(|| format!("Failed to execute: {script}"))?;

    Ok(Output {
        success: output.status.success(),
        stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    })
}

/// Run a shell snippet, failing on a non-zero exit status
pub fn shell_checked(script: &str) -> Result<String> {
    let output = shell(script)?;
    if output.success {
        Ok(output.stdout)
    } else if output.stderr.is_empty() {
        anyhow::bail!("Command failed: {script}")
    } else {
        anyhow::bail!("Command failed: {}", output.stderr)
    }
}

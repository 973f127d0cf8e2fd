//! Command Reloader
//!
//! Implements ProxyReloader by running the configured reload command,
//! e.g. `systemctl reload nginx`.

use crate::domain::ports::ProxyReloader;
use crate::error::{NlbError, Result};
use async_trait::async_trait;
use tokio::process::Command;

pub struct CommandReloader {
    program: String,
    args: Vec<String>,
}

impl CommandReloader {
    /// Split a whitespace-separated command line into program and arguments.
    pub fn new(command_line: &str) -> Result<Self> {
        let mut parts = command_line.split_whitespace().map(String::from);
        let program = parts
            .next()
            .ok_or_else(|| NlbError::Config("reload command is empty".to_string()))?;

        Ok(Self {
            program,
            args: parts.collect(),
        })
    }

    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[async_trait]
impl ProxyReloader for CommandReloader {
    async fn reload(&self) -> Result<()> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .output()
            .await
            .map_err(|e| NlbError::Reload(format!("{}: {}", self.command_line(), e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(NlbError::Reload(format!(
                "{} exited with {}: {}",
                self.command_line(),
                output.status,
                stderr.trim()
            )));
        }

        tracing::info!("proxy reloaded with `{}`", self.command_line());
        Ok(())
    }
}

//! Console access through `rcon-cli` inside the server's Docker container.

use std::time::Duration;

use async_trait::async_trait;
use bollard::container::LogOutput;
use bollard::exec::{CreateExecOptions, StartExecOptions, StartExecResults};
use bollard::Docker;
use tokio_stream::StreamExt;
use tracing::debug;

use super::{ConsoleError, ConsoleSender};

const EXEC_TIMEOUT: Duration = Duration::from_secs(30);

/// Runs console commands with `docker exec <container> rcon-cli <command>`.
#[derive(Debug, Clone)]
pub struct DockerConsole {
    docker: Docker,
    container: String,
}

impl DockerConsole {
    /// Console for the named container, using the local Docker daemon.
    ///
    /// # Errors
    ///
    /// Returns [`ConsoleError::Infrastructure`] if the daemon settings cannot
    /// be resolved.
    pub fn new(container: &str) -> Result<Self, ConsoleError> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| ConsoleError::Infrastructure(e.to_string()))?;
        Ok(Self {
            docker,
            container: container.to_owned(),
        })
    }

    /// Target container name.
    pub fn container(&self) -> &str {
        &self.container
    }

    async fn collect_output(&self, exec_id: &str) -> Result<String, ConsoleError> {
        let started = self
            .docker
            .start_exec(
                exec_id,
                Some(StartExecOptions {
                    detach: false,
                    tty: false,
                    output_capacity: None,
                }),
            )
            .await
            .map_err(|e| ConsoleError::Infrastructure(e.to_string()))?;

        let mut output = String::new();
        if let StartExecResults::Attached {
            output: mut stream, ..
        } = started
        {
            while let Some(chunk) = stream.next().await {
                match chunk.map_err(|e| ConsoleError::Infrastructure(e.to_string()))? {
                    LogOutput::StdOut { message }
                    | LogOutput::StdErr { message }
                    | LogOutput::Console { message } => {
                        output.push_str(&String::from_utf8_lossy(&message));
                    }
                    LogOutput::StdIn { .. } => {}
                }
            }
        }
        Ok(output)
    }
}

#[async_trait]
impl ConsoleSender for DockerConsole {
    async fn send(&self, command: &str) -> Result<String, ConsoleError> {
        let create = CreateExecOptions {
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            cmd: Some(vec!["rcon-cli".to_owned(), command.to_owned()]),
            env: Some(Vec::new()),
            ..Default::default()
        };

        let created = self
            .docker
            .create_exec(&self.container, create)
            .await
            .map_err(|e| ConsoleError::Infrastructure(e.to_string()))?;

        let output = tokio::time::timeout(EXEC_TIMEOUT, self.collect_output(&created.id))
            .await
            .map_err(|_| ConsoleError::Timeout {
                seconds: EXEC_TIMEOUT.as_secs(),
            })??;

        let inspect = self
            .docker
            .inspect_exec(&created.id)
            .await
            .map_err(|e| ConsoleError::Infrastructure(e.to_string()))?;

        let output = output.trim().to_owned();
        match inspect.exit_code {
            Some(0) => {
                debug!(container = %self.container, command, "console command succeeded");
                Ok(output)
            }
            code => Err(ConsoleError::Exec {
                code: code.unwrap_or(-1),
                output,
            }),
        }
    }

    /// Each exec is independent; only checks that the daemon answers.
    async fn reconnect(&self) -> Result<(), ConsoleError> {
        self.docker
            .ping()
            .await
            .map(|_| ())
            .map_err(|e| ConsoleError::Infrastructure(e.to_string()))
    }

    fn kind(&self) -> &'static str {
        "docker"
    }
}

use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use super::{BuildLog, CancelFlag};

const WATCHDOG_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Error, Debug)]
pub enum ExecError {
    #[error("Failed to launch {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("Build cancelled while running {program}")]
    Cancelled { program: String },

    #[error("I/O error while supervising {program}: {source}")]
    Supervision {
        program: String,
        source: std::io::Error,
    },

    #[error("Empty command line")]
    EmptyCommand,
}

/// Outcome of one supervised subprocess invocation. By convention exit code
/// zero is success; a timed-out run is never success regardless of the code
/// the dying process happened to report.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub exit_code: i32,
    pub output: String,
    pub timed_out: bool,
}

impl ExecutionResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0 && !self.timed_out
    }
}

/// Runs external build tools with a merged environment, continuous output
/// draining, and an optional watchdog that forcibly terminates the child
/// once a deadline passes. The reader tasks exist to keep the OS pipe
/// buffers empty; a quiet multi-gigabyte Gradle run would otherwise deadlock
/// against a full pipe.
pub struct Orchestrator {
    default_env: HashMap<String, String>,
    log: BuildLog,
    cancel: CancelFlag,
}

impl Orchestrator {
    pub fn new(log: BuildLog, cancel: CancelFlag) -> Self {
        Self {
            default_env: HashMap::new(),
            log,
            cancel,
        }
    }

    /// Base environment layered under every caller-supplied override.
    pub fn set_default_env(&mut self, key: &str, value: &str) {
        self.default_env.insert(key.to_string(), value.to_string());
    }

    pub fn log(&self) -> &BuildLog {
        &self.log
    }

    pub async fn run(
        &self,
        working_dir: &Path,
        env: &HashMap<String, String>,
        argv: &[String],
        timeout: Option<Duration>,
    ) -> Result<ExecutionResult, ExecError> {
        let program = argv.first().ok_or(ExecError::EmptyCommand)?.clone();
        if self.cancel.is_cancelled() {
            return Err(ExecError::Cancelled { program });
        }

        self.log
            .append(&format!("Executing: {}", shell_words::join(argv)));
        debug!(
            "Spawning {program} in {} (timeout {timeout:?})",
            working_dir.display()
        );

        let mut command = Command::new(&program);
        command
            .args(&argv[1..])
            .current_dir(working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in &self.default_env {
            command.env(key, value);
        }
        for (key, value) in env {
            command.env(key, value);
        }

        let mut child = command.spawn().map_err(|source| ExecError::Spawn {
            program: program.clone(),
            source,
        })?;

        let captured = Arc::new(Mutex::new(String::new()));
        let stdout_task = child
            .stdout
            .take()
            .map(|stream| self.spawn_reader(stream, captured.clone()));
        let stderr_task = child
            .stderr
            .take()
            .map(|stream| self.spawn_reader(stream, captured.clone()));

        let (status, timed_out) = self
            .supervise(&mut child, &program, timeout)
            .await?;

        if let Some(task) = stdout_task {
            let _ = task.await;
        }
        if let Some(task) = stderr_task {
            let _ = task.await;
        }

        if self.cancel.is_cancelled() {
            return Err(ExecError::Cancelled { program });
        }

        let exit_code = status.map(|s| s.code().unwrap_or(-1)).unwrap_or(-1);
        if timed_out {
            self.log.append(&format!("Process {program} timed out"));
        } else {
            self.log
                .append(&format!("Process {program} exited with code {exit_code}"));
        }

        let output = captured.lock().unwrap_or_else(|e| e.into_inner()).clone();
        Ok(ExecutionResult {
            exit_code,
            output,
            timed_out,
        })
    }

    /// Convenience wrapper returning only the captured text; spawn failure
    /// is still an error, a non-zero exit is not.
    pub async fn run_capturing_output(
        &self,
        working_dir: &Path,
        env: &HashMap<String, String>,
        argv: &[String],
        timeout: Option<Duration>,
    ) -> Result<String, ExecError> {
        let result = self.run(working_dir, env, argv, timeout).await?;
        Ok(result.output)
    }

    /// Waits for exit while enforcing cancellation and the optional
    /// deadline. Returns the exit status (if the child was not killed) and
    /// whether the watchdog fired.
    async fn supervise(
        &self,
        child: &mut Child,
        program: &str,
        timeout: Option<Duration>,
    ) -> Result<(Option<std::process::ExitStatus>, bool), ExecError> {
        let started = Instant::now();
        loop {
            tokio::select! {
                status = child.wait() => {
                    let status = status.map_err(|source| ExecError::Supervision {
                        program: program.to_string(),
                        source,
                    })?;
                    return Ok((Some(status), false));
                }
                _ = sleep(WATCHDOG_INTERVAL) => {
                    if self.cancel.is_cancelled() {
                        warn!("Cancellation requested, killing {program}");
                        let _ = child.kill().await;
                        return Ok((None, false));
                    }
                    if let Some(limit) = timeout {
                        if started.elapsed() > limit {
                            warn!("Watchdog killing {program} after {limit:?}");
                            let _ = child.kill().await;
                            return Ok((None, true));
                        }
                    }
                }
            }
        }
    }

    fn spawn_reader(
        &self,
        stream: impl AsyncRead + Unpin + Send + 'static,
        captured: Arc<Mutex<String>>,
    ) -> tokio::task::JoinHandle<()> {
        let log = self.log.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stream).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                log.append(&line);
                let mut captured = captured.lock().unwrap_or_else(|e| e.into_inner());
                captured.push_str(&line);
                captured.push('\n');
            }
        })
    }
}

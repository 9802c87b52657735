//! Child-process runner with a wall-clock deadline.

use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;

use crate::error::{Error, Result};

use super::{Interpreter, InterpreterLocator, Invocation, RunOutput, Runner};

/// Runs the interpreter with `tokio::process`.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    locator: InterpreterLocator,
}

impl ProcessRunner {
    /// Creates a runner searching `candidates` in order.
    pub fn new(candidates: Vec<String>) -> Self {
        Self {
            locator: InterpreterLocator::new(candidates),
        }
    }

    pub fn locator(&self) -> &InterpreterLocator {
        &self.locator
    }
}

#[async_trait]
impl Runner for ProcessRunner {
    fn locate(&self) -> Result<Interpreter> {
        self.locator.locate()
    }

    fn locate_all(&self) -> Vec<Interpreter> {
        self.locator.locate_all()
    }

    async fn run(&self, invocation: Invocation) -> Result<RunOutput> {
        let program = &invocation.interpreter.path;

        tracing::info!(
            interpreter = ?program,
            working_dir = ?invocation.working_dir,
            timeout_secs = invocation.timeout.as_secs(),
            "spawning interpreter"
        );
        tracing::debug!(args = ?invocation.args, "interpreter arguments");

        let start = Instant::now();
        let deadline = tokio::time::Instant::now() + invocation.timeout;

        let mut child = Command::new(program)
            .args(&invocation.args)
            .current_dir(&invocation.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Exec(format!("failed to spawn {}: {}", program.display(), e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Internal("stdout was not piped".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::Internal("stderr was not piped".to_string()))?;

        let stdout_task = tokio::spawn(read_stream(stdout));
        let stderr_task = tokio::spawn(read_stream(stderr));
        let readers = [stdout_task.abort_handle(), stderr_task.abort_handle()];

        let child_ref = &mut child;
        let completion = async move {
            let status = child_ref.wait().await?;
            let stdout = join_stream(stdout_task).await?;
            let stderr = join_stream(stderr_task).await?;
            Ok::<_, std::io::Error>((status, stdout, stderr))
        };
        let outcome = tokio::time::timeout_at(deadline, completion).await;

        match outcome {
            Ok(Ok((status, stdout, stderr))) => {
                let duration = start.elapsed();
                let exit_code = status.code().unwrap_or(-1);

                #[cfg(unix)]
                let signal = {
                    use std::os::unix::process::ExitStatusExt;
                    status.signal()
                };
                #[cfg(not(unix))]
                let signal = None;

                tracing::info!(
                    exit_code,
                    duration_ms = duration.as_millis() as u64,
                    "interpreter finished"
                );

                Ok(RunOutput {
                    exit_code,
                    signal,
                    success: status.success(),
                    stdout: String::from_utf8_lossy(&stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&stderr).into_owned(),
                    duration_ms: duration.as_millis() as u64,
                })
            }
            Ok(Err(e)) => {
                for reader in &readers {
                    reader.abort();
                }
                Err(Error::Exec(format!("failed to wait for interpreter: {}", e)))
            }
            Err(_) => {
                for reader in &readers {
                    reader.abort();
                }
                // kill() also reaps, so nothing is left running or zombied.
                if let Err(e) = child.kill().await {
                    tracing::error!(error = %e, "failed to kill timed out interpreter");
                }
                let elapsed = start.elapsed();
                tracing::warn!(
                    timeout_secs = invocation.timeout.as_secs(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "interpreter timed out"
                );
                Err(Error::Timeout {
                    limit: invocation.timeout,
                    elapsed,
                })
            }
        }
    }

    fn name(&self) -> &str {
        "process"
    }
}

async fn read_stream<R: AsyncRead + Unpin>(mut reader: R) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf).await?;
    Ok(buf)
}

async fn join_stream(task: JoinHandle<std::io::Result<Vec<u8>>>) -> std::io::Result<Vec<u8>> {
    task.await.map_err(std::io::Error::other)?
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;
    use tempfile::TempDir;

    fn sh_invocation(script: &str, dir: &TempDir, timeout: Duration) -> Invocation {
        Invocation {
            interpreter: Interpreter::new("/bin/sh"),
            args: vec!["-c".to_string(), script.to_string()],
            working_dir: dir.path().to_path_buf(),
            timeout,
        }
    }

    #[tokio::test]
    async fn captures_streams_and_exit_code() {
        let dir = TempDir::new().unwrap();
        let runner = ProcessRunner::new(vec![]);

        let output = runner
            .run(sh_invocation(
                "echo out; echo err >&2; exit 3",
                &dir,
                Duration::from_secs(10),
            ))
            .await
            .unwrap();

        assert_eq!(output.exit_code, 3);
        assert!(!output.success);
        assert_eq!(output.stdout, "out\n");
        assert_eq!(output.stderr, "err\n");
        assert_eq!(output.signal, None);
    }

    #[tokio::test]
    async fn runs_in_working_directory() {
        let dir = TempDir::new().unwrap();
        let runner = ProcessRunner::new(vec![]);

        let output = runner
            .run(sh_invocation("echo hi > made.txt", &dir, Duration::from_secs(10)))
            .await
            .unwrap();

        assert!(output.success);
        assert!(dir.path().join("made.txt").exists());
    }

    #[tokio::test]
    async fn timeout_kills_the_child() {
        let dir = TempDir::new().unwrap();
        let runner = ProcessRunner::new(vec![]);
        let limit = Duration::from_secs(1);

        // The child records its pid, then sleeps far past the deadline.
        let err = runner
            .run(sh_invocation("echo $$ > pid; exec sleep 30", &dir, limit))
            .await
            .unwrap_err();

        match err {
            Error::Timeout { limit: l, elapsed } => {
                assert_eq!(l, limit);
                assert!(elapsed >= limit);
                assert!(elapsed < limit + Duration::from_secs(2));
            }
            other => panic!("expected timeout, got {:?}", other),
        }

        let pid = std::fs::read_to_string(dir.path().join("pid")).unwrap();
        let proc_entry = PathBuf::from("/proc").join(pid.trim());
        if PathBuf::from("/proc/self").exists() {
            assert!(!proc_entry.exists(), "child {} still alive", pid.trim());
        }
    }

    #[tokio::test]
    async fn missing_executable_is_exec_error() {
        let dir = TempDir::new().unwrap();
        let runner = ProcessRunner::new(vec![]);
        let invocation = Invocation {
            interpreter: Interpreter::new(dir.path().join("vanished")),
            args: vec![],
            working_dir: dir.path().to_path_buf(),
            timeout: Duration::from_secs(5),
        };

        let err = runner.run(invocation).await.unwrap_err();
        assert!(matches!(err, Error::Exec(_)));
    }

    #[test]
    fn locate_fails_without_candidates_on_path() {
        let runner = ProcessRunner::new(vec!["no-such-interpreter-here".to_string()]);
        assert!(matches!(
            runner.locate(),
            Err(Error::InterpreterNotFound(_))
        ));
    }

    #[test]
    fn runner_has_correct_name() {
        assert_eq!(ProcessRunner::new(vec![]).name(), "process");
    }
}

//! Payload synchronization via the external transformer
//!
//! The transformer is an independent process that reads the committed
//! profile and patches the payload. This module only checks the payload is
//! there, runs the process and interprets its exit status.

use anyhow::{Context, Result};
use serde::Serialize;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::constants::transformer::{
    CONFIG_FLAG, LEADING_ARGS, PAYLOAD_FLAG, POLL_INTERVAL_MS, PROGRAM,
};

/// Result of a sync attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    /// Transformer exited successfully
    Success,
    /// Transformer ran and reported failure
    TransformFailure { detail: String },
    /// Payload was not found; nothing was started
    MissingPayload { path: PathBuf },
}

/// How to launch the transformer
///
/// The final command line is `program [leading_args..] -c <config> -p <payload>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformCommand {
    pub program: String,
    pub leading_args: Vec<String>,
    /// Kill the transformer if it runs longer than this
    pub timeout: Option<Duration>,
}

impl Default for TransformCommand {
    fn default() -> Self {
        Self {
            program: PROGRAM.to_string(),
            leading_args: LEADING_ARGS.iter().map(|s| s.to_string()).collect(),
            timeout: None,
        }
    }
}

impl TransformCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            leading_args: Vec::new(),
            timeout: None,
        }
    }

    fn build(&self, config: &Path, payload: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.leading_args)
            .arg(CONFIG_FLAG)
            .arg(config)
            .arg(PAYLOAD_FLAG)
            .arg(payload)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        // Own process group, so a timeout also takes down helpers it starts
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            if self.timeout.is_some() {
                cmd.process_group(0);
            }
        }
        cmd
    }
}

/// Apply the committed profile at `config` onto the payload at `payload`
///
/// Only a failure to start the transformer is an `Err`; everything the
/// transformer itself reports comes back as an [`Outcome`].
pub fn sync(config: &Path, payload: &Path, transformer: &TransformCommand) -> Result<Outcome> {
    if !payload.exists() {
        error!(payload = %payload.display(), "Payload not found, skipping transform");
        return Ok(Outcome::MissingPayload {
            path: payload.to_path_buf(),
        });
    }

    let child = transformer
        .build(config, payload)
        .spawn()
        .with_context(|| format!("Failed to spawn payload transformer '{}'", transformer.program))?;
    let pid = child.id();
    info!(pid, program = %transformer.program, payload = %payload.display(), "Started payload transformer");

    let finished = match transformer.timeout {
        Some(limit) => wait_with_timeout(child, limit)?,
        None => {
            let output = child
                .wait_with_output()
                .context("Failed to wait for payload transformer")?;
            Some(Captured {
                status: output.status,
                stdout: output.stdout,
                stderr: output.stderr,
            })
        }
    };

    let Some(captured) = finished else {
        let secs = transformer.timeout.map(|t| t.as_secs_f64()).unwrap_or_default();
        warn!(pid, timeout_secs = secs, "Payload transformer timed out and was killed");
        return Ok(Outcome::TransformFailure {
            detail: format!("transformer timed out after {secs}s"),
        });
    };

    if captured.status.success() {
        info!(pid, "Payload updated successfully");
        return Ok(Outcome::Success);
    }

    let detail = captured.diagnostic();
    warn!(pid, exit = ?captured.status.code(), detail = %detail, "Payload transformer failed");
    Ok(Outcome::TransformFailure { detail })
}

struct Captured {
    status: ExitStatus,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
}

impl Captured {
    /// Stderr if any, else stdout, else the exit status
    fn diagnostic(&self) -> String {
        let stderr = String::from_utf8_lossy(&self.stderr);
        let stdout = String::from_utf8_lossy(&self.stdout);
        if !stderr.trim().is_empty() {
            return stderr.trim().to_string();
        }
        if !stdout.trim().is_empty() {
            return stdout.trim().to_string();
        }
        match self.status.code() {
            Some(code) => format!("transformer exited with status {code}"),
            None => "transformer was terminated by a signal".to_string(),
        }
    }
}

/// Poll the child until it exits or `limit` elapses
///
/// Pipes are drained on reader threads so a chatty child cannot block on a
/// full pipe while we poll. Returns `None` if the child had to be killed; the
/// readers are then left behind, since anything still holding the pipes
/// would keep them open.
fn wait_with_timeout(mut child: Child, limit: Duration) -> Result<Option<Captured>> {
    let stdout = child.stdout.take().map(spawn_drain);
    let stderr = child.stderr.take().map(spawn_drain);

    let started = Instant::now();
    let status = loop {
        match child
            .try_wait()
            .context("Failed to query payload transformer status")?
        {
            Some(status) => break status,
            None if started.elapsed() >= limit => {
                kill_transformer(&mut child);
                child
                    .wait()
                    .context("Failed to reap payload transformer")?;
                return Ok(None);
            }
            None => thread::sleep(Duration::from_millis(POLL_INTERVAL_MS)),
        }
    };

    let stdout = join_drain(stdout);
    let stderr = join_drain(stderr);
    debug!(stdout_len = stdout.len(), stderr_len = stderr.len(), "Collected transformer output");

    Ok(Some(Captured {
        status,
        stdout,
        stderr,
    }))
}

/// Kill the transformer's process group, or just the child if that fails
fn kill_transformer(child: &mut Child) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        let group = Pid::from_raw(child.id() as i32);
        match killpg(group, Signal::SIGKILL) {
            Ok(()) => return,
            Err(err) => warn!(error = %err, "Failed to kill transformer process group"),
        }
    }

    if let Err(err) = child.kill() {
        error!(error = ?err, "Failed to kill payload transformer");
    }
}

fn spawn_drain<R: Read + Send + 'static>(mut pipe: R) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Err(err) = pipe.read_to_end(&mut buf) {
            debug!(error = %err, "Transformer pipe read ended early");
        }
        buf
    })
}

fn join_drain(handle: Option<thread::JoinHandle<Vec<u8>>>) -> Vec<u8> {
    handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    /// `sh -c <script> sh -c <config> -p <payload>`: paths land in $2 and $4
    fn script(body: &str) -> TransformCommand {
        TransformCommand {
            leading_args: vec!["-c".to_string(), body.to_string(), "sh".to_string()],
            ..TransformCommand::new("sh")
        }
    }

    fn fixture() -> (tempfile::TempDir, PathBuf, PathBuf) {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = dir.path().join("config.ini");
        let payload = dir.path().join("PAYLOAD");
        fs::write(&config, "[BarStats]\nBadass Tokens = 500.0\n\n").expect("config");
        fs::write(&payload, [0u8, 1, 2, 3]).expect("payload");
        (dir, config, payload)
    }

    #[test]
    fn test_default_command_line() {
        let cmd = TransformCommand::default();
        assert_eq!(cmd.program, "python");
        assert_eq!(cmd.leading_args, vec!["update_payload.py".to_string()]);
        assert_eq!(cmd.timeout, None);
    }

    #[test]
    fn test_missing_payload_starts_nothing() {
        let (dir, config, _) = fixture();
        let marker = dir.path().join("ran");
        let absent = dir.path().join("NOPE");
        let cmd = script(&format!("touch '{}'", marker.display()));
        let before = fs::read_to_string(&config).expect("read");

        let outcome = sync(&config, &absent, &cmd).expect("sync");

        assert_eq!(outcome, Outcome::MissingPayload { path: absent });
        assert!(!marker.exists());
        assert_eq!(fs::read_to_string(&config).expect("read"), before);
    }

    #[test]
    fn test_missing_payload_does_not_need_a_real_program() {
        let (dir, config, _) = fixture();
        let cmd = TransformCommand::new("definitely-not-a-real-transformer");
        let outcome = sync(&config, &dir.path().join("NOPE"), &cmd).expect("sync");
        assert!(matches!(outcome, Outcome::MissingPayload { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_success_receives_both_paths() {
        let (dir, config, payload) = fixture();
        let seen = dir.path().join("seen");
        let cmd = script(&format!(
            "printf '%s|%s|%s|%s' \"$1\" \"$2\" \"$3\" \"$4\" > '{}'",
            seen.display()
        ));

        let outcome = sync(&config, &payload, &cmd).expect("sync");

        assert_eq!(outcome, Outcome::Success);
        assert_eq!(
            fs::read_to_string(&seen).expect("seen"),
            format!("-c|{}|-p|{}", config.display(), payload.display())
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_failure_carries_stderr() {
        let (_dir, config, payload) = fixture();
        let cmd = script("echo 'bad checksum' >&2; exit 1");
        let outcome = sync(&config, &payload, &cmd).expect("sync");
        assert_eq!(
            outcome,
            Outcome::TransformFailure {
                detail: "bad checksum".to_string()
            }
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_failure_falls_back_to_stdout_then_status() {
        let (_dir, config, payload) = fixture();

        let outcome = sync(&config, &payload, &script("echo 'on stdout'; exit 3")).expect("sync");
        assert_eq!(
            outcome,
            Outcome::TransformFailure {
                detail: "on stdout".to_string()
            }
        );

        let outcome = sync(&config, &payload, &script("exit 4")).expect("sync");
        assert_eq!(
            outcome,
            Outcome::TransformFailure {
                detail: "transformer exited with status 4".to_string()
            }
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_success_ignores_output() {
        let (_dir, config, payload) = fixture();
        let cmd = script("echo noise; echo more noise >&2; exit 0");
        assert_eq!(sync(&config, &payload, &cmd).expect("sync"), Outcome::Success);
    }

    #[cfg(unix)]
    #[test]
    fn test_timeout_kills_transformer() {
        let (_dir, config, payload) = fixture();
        let mut cmd = script("exec sleep 30");
        cmd.timeout = Some(Duration::from_millis(200));
        let started = Instant::now();

        let outcome = sync(&config, &payload, &cmd).expect("sync");

        assert!(started.elapsed() < Duration::from_secs(10));
        match outcome {
            Outcome::TransformFailure { detail } => assert!(detail.contains("timed out"), "{detail}"),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_timeout_kills_helpers_the_transformer_started() {
        let (dir, config, payload) = fixture();
        let marker = dir.path().join("finished");
        // No exec: sh waits on a sleeping child that shares its pipes
        let mut cmd = script(&format!("sleep 3; touch '{}'", marker.display()));
        cmd.timeout = Some(Duration::from_millis(200));
        let started = Instant::now();

        let outcome = sync(&config, &payload, &cmd).expect("sync");

        assert!(started.elapsed() < Duration::from_secs(2), "took {:?}", started.elapsed());
        assert!(matches!(outcome, Outcome::TransformFailure { .. }));
        thread::sleep(Duration::from_secs(4));
        assert!(!marker.exists(), "transformer kept running after the timeout");
    }

    #[cfg(unix)]
    #[test]
    fn test_timeout_not_reached_reports_normally() {
        let (_dir, config, payload) = fixture();
        let mut cmd = script("echo 'bad checksum' >&2; exit 2");
        cmd.timeout = Some(Duration::from_secs(20));
        let outcome = sync(&config, &payload, &cmd).expect("sync");
        assert_eq!(
            outcome,
            Outcome::TransformFailure {
                detail: "bad checksum".to_string()
            }
        );
    }

    #[test]
    fn test_spawn_failure_is_error() {
        let (_dir, config, payload) = fixture();
        let cmd = TransformCommand::new("definitely-not-a-real-transformer");
        assert!(sync(&config, &payload, &cmd).is_err());
    }

    #[test]
    fn test_outcome_json() {
        let json = serde_json::to_value(Outcome::TransformFailure {
            detail: "bad checksum".to_string(),
        })
        .expect("json");
        assert_eq!(json["outcome"], "transform_failure");
        assert_eq!(json["detail"], "bad checksum");
    }
}

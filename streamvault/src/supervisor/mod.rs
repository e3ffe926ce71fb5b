//! Child process supervision.
//!
//! Owns the table of capture and conversion children. Each supervised
//! process has a stable string id so other components can refer to it
//! across restarts of their own objects, and its stdout/stderr are
//! streamed line-by-line to a per-job log file rather than buffered in
//! memory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{Error, Result};

/// What to launch and where its output goes.
#[derive(Debug, Clone)]
pub struct SpawnSpec {
    /// Stable identifier, e.g. `capture-<recording id>`.
    pub id: String,
    pub program: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    /// File receiving the child's stdout and stderr.
    pub log_path: PathBuf,
    pub working_dir: Option<PathBuf>,
}

impl SpawnSpec {
    pub fn new(id: impl Into<String>, program: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            program: program.into(),
            args: Vec::new(),
            env: HashMap::new(),
            log_path: PathBuf::from("process.log"),
            working_dir: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I: IntoIterator<Item = S>, S: Into<String>>(mut self, args: I) -> Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn log_to(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = path.into();
        self
    }

    /// The full command line, for logs and writer-drain checks.
    pub fn command_line(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

/// Snapshot of a supervised process.
#[derive(Debug, Clone)]
pub struct ProcessInfo {
    pub id: String,
    pub pid: Option<u32>,
    pub command_line: String,
    pub log_path: PathBuf,
    pub started_at: DateTime<Utc>,
    pub exit_code: Option<i32>,
}

struct Supervised {
    pid: Option<u32>,
    command_line: String,
    log_path: PathBuf,
    started_at: DateTime<Utc>,
    /// Latest exit code; `None` while running. -1 stands in for
    /// signal-terminated children without a code.
    exit_rx: watch::Receiver<Option<i32>>,
    kill_token: CancellationToken,
}

/// Supervisor owning every capture/convert child and its log files.
pub struct ProcessSupervisor {
    table: DashMap<String, Arc<Supervised>>,
}

impl ProcessSupervisor {
    pub fn new() -> Self {
        Self {
            table: DashMap::new(),
        }
    }

    /// Spawn a child and stream its output to the spec's log file.
    ///
    /// Fails with a spawn error when the executable is missing or the
    /// log directory cannot be created.
    pub async fn spawn(&self, spec: SpawnSpec) -> Result<String> {
        if let Some(parent) = spec.log_path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| Error::Spawn {
                command: spec.command_line(),
                source: e,
            })?;
        }

        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .envs(&spec.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &spec.working_dir {
            command.current_dir(dir);
        }
        #[cfg(windows)]
        {
            const CREATE_NO_WINDOW: u32 = 0x0800_0000;
            use std::os::windows::process::CommandExt;
            command.creation_flags(CREATE_NO_WINDOW);
        }

        let mut child = command.spawn().map_err(|e| Error::Spawn {
            command: spec.command_line(),
            source: e,
        })?;

        let pid = child.id();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let log_file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&spec.log_path)
            .await
            .map_err(|e| Error::Spawn {
                command: spec.command_line(),
                source: e,
            })?;
        let log_file = Arc::new(tokio::sync::Mutex::new(log_file));

        if let Some(stdout) = stdout {
            spawn_log_pump(stdout, log_file.clone());
        }
        if let Some(stderr) = stderr {
            spawn_log_pump(stderr, log_file.clone());
        }

        let (exit_tx, exit_rx) = watch::channel(None);
        let kill_token = CancellationToken::new();
        let entry = Arc::new(Supervised {
            pid,
            command_line: spec.command_line(),
            log_path: spec.log_path.clone(),
            started_at: Utc::now(),
            exit_rx,
            kill_token: kill_token.clone(),
        });

        info!(id = %spec.id, pid = ?pid, program = %spec.program, "Spawned child process");
        self.table.insert(spec.id.clone(), entry);

        let id = spec.id.clone();
        tokio::spawn(async move {
            let code = monitor_child(&id, &mut child, kill_token).await;
            debug!(id = %id, code = ?code, "Child process exited");
            let _ = exit_tx.send(Some(code.unwrap_or(-1)));
        });

        Ok(spec.id)
    }

    /// Wait for a child to exit. Never fails: unknown handles report -1
    /// (the process is gone either way).
    pub async fn wait(&self, id: &str) -> i32 {
        let Some(entry) = self.table.get(id).map(|e| e.value().clone()) else {
            return -1;
        };
        let mut rx = entry.exit_rx.clone();
        loop {
            if let Some(code) = *rx.borrow() {
                return code;
            }
            if rx.changed().await.is_err() {
                return (*rx.borrow()).unwrap_or(-1);
            }
        }
    }

    /// Exit code if the child already exited.
    pub fn exit_code(&self, id: &str) -> Option<i32> {
        self.table.get(id).and_then(|e| *e.exit_rx.borrow())
    }

    /// Whether the handle exists and the child has not exited.
    pub fn is_running(&self, id: &str) -> bool {
        self.table
            .get(id)
            .map(|e| e.exit_rx.borrow().is_none())
            .unwrap_or(false)
    }

    /// Request cooperative stop, wait up to `grace`, then force-kill.
    /// Returns whether the child stopped gracefully.
    pub async fn terminate(&self, id: &str, grace: Duration) -> bool {
        let Some(entry) = self.table.get(id).map(|e| e.value().clone()) else {
            return true;
        };
        if entry.exit_rx.borrow().is_some() {
            return true;
        }

        request_interrupt(&entry);

        let graceful = tokio::time::timeout(grace, self.wait(id)).await.is_ok();
        if !graceful {
            warn!(id, "Child ignored cooperative stop; killing");
            entry.kill_token.cancel();
            self.wait(id).await;
        }
        graceful
    }

    /// Remove an exited child from the table. Running children stay.
    pub fn forget(&self, id: &str) {
        if let Some(entry) = self.table.get(id)
            && entry.exit_rx.borrow().is_none()
        {
            return;
        }
        self.table.remove(id);
    }

    /// Snapshots of every supervised process, running or exited.
    pub fn list(&self) -> Vec<ProcessInfo> {
        self.table
            .iter()
            .map(|entry| ProcessInfo {
                id: entry.key().clone(),
                pid: entry.value().pid,
                command_line: entry.value().command_line.clone(),
                log_path: entry.value().log_path.clone(),
                started_at: entry.value().started_at,
                exit_code: *entry.value().exit_rx.borrow(),
            })
            .collect()
    }

    /// Whether any running child's command line references `needle`.
    /// Used by cleanup to avoid deleting files a writer still holds.
    pub fn any_running_references(&self, needle: &str) -> bool {
        self.table.iter().any(|entry| {
            entry.value().exit_rx.borrow().is_none()
                && entry.value().command_line.contains(needle)
        })
    }

    /// Terminate every child, force-killing after `deadline`.
    pub async fn terminate_all(&self, deadline: Duration) {
        let ids: Vec<String> = self.table.iter().map(|e| e.key().clone()).collect();
        if ids.is_empty() {
            return;
        }
        info!(count = ids.len(), "Terminating all supervised processes");

        let grace = deadline / 2;
        for id in &ids {
            self.terminate(id, grace).await;
            self.forget(id);
        }
    }
}

impl Default for ProcessSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

/// Wait for the child, force-killing it when the token fires.
async fn monitor_child(id: &str, child: &mut Child, kill_token: CancellationToken) -> Option<i32> {
    tokio::select! {
        status = child.wait() => match status {
            Ok(status) => exit_code_of(status),
            Err(e) => {
                error!(id, error = %e, "Error waiting for child");
                Some(-1)
            }
        },
        _ = kill_token.cancelled() => {
            let _ = child.kill().await;
            match child.wait().await {
                Ok(status) => exit_code_of(status),
                Err(e) => {
                    error!(id, error = %e, "Error waiting for killed child");
                    Some(-1)
                }
            }
        }
    }
}

#[cfg(unix)]
fn exit_code_of(status: std::process::ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    // Report signal deaths as 128+signal, the shell convention.
    status.code().or_else(|| status.signal().map(|s| 128 + s))
}

#[cfg(not(unix))]
fn exit_code_of(status: std::process::ExitStatus) -> Option<i32> {
    status.code()
}

/// SIGINT on Unix; elsewhere cooperative stop degrades to a kill.
#[cfg(unix)]
fn request_interrupt(entry: &Supervised) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;
    if let Some(pid) = entry.pid {
        if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGINT) {
            warn!(pid, error = %e, "Failed to send SIGINT");
            entry.kill_token.cancel();
        }
    } else {
        entry.kill_token.cancel();
    }
}

#[cfg(not(unix))]
fn request_interrupt(entry: &Supervised) {
    entry.kill_token.cancel();
}

fn spawn_log_pump<R>(reader: R, log_file: Arc<tokio::sync::Mutex<tokio::fs::File>>)
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let mut file = log_file.lock().await;
            if file.write_all(line.as_bytes()).await.is_err() {
                break;
            }
            let _ = file.write_all(b"\n").await;
        }
        let mut file = log_file.lock().await;
        let _ = file.flush().await;
    });
}

/// Per-streamer capture log path: `logs/streamlink/<streamer>_<ts>.log`.
pub fn capture_log_path(log_dir: &Path, streamer: &str, started_at: DateTime<Utc>) -> PathBuf {
    log_dir
        .join("streamlink")
        .join(format!("{streamer}_{}.log", started_at.format("%Y%m%d_%H%M%S")))
}

/// Per-streamer conversion log path: `logs/ffmpeg/<streamer>_<op>_<ts>.log`.
pub fn convert_log_path(
    log_dir: &Path,
    streamer: &str,
    op: &str,
    started_at: DateTime<Utc>,
) -> PathBuf {
    log_dir
        .join("ffmpeg")
        .join(format!(
            "{streamer}_{op}_{}.log",
            started_at.format("%Y%m%d_%H%M%S")
        ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_spawn_missing_executable() {
        let supervisor = ProcessSupervisor::new();
        let dir = tempfile::tempdir().unwrap();
        let spec = SpawnSpec::new("x", "definitely-not-a-real-binary-xyz")
            .log_to(dir.path().join("x.log"));
        let err = supervisor.spawn(spec).await.unwrap_err();
        assert!(matches!(err, Error::Spawn { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_spawn_wait_and_log_capture() {
        let supervisor = ProcessSupervisor::new();
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("echo.log");

        let spec = SpawnSpec::new("echo-test", "sh")
            .args(["-c", "echo hello-supervisor"])
            .log_to(&log);
        let id = supervisor.spawn(spec).await.unwrap();

        let code = supervisor.wait(&id).await;
        assert_eq!(code, 0);

        // Pumps flush asynchronously after exit.
        for _ in 0..50 {
            if tokio::fs::read_to_string(&log)
                .await
                .map(|s| s.contains("hello-supervisor"))
                .unwrap_or(false)
            {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("child output never reached the log file");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_terminate_stubborn_child() {
        let supervisor = ProcessSupervisor::new();
        let dir = tempfile::tempdir().unwrap();

        // Traps SIGINT, so only the force-kill ends it.
        let spec = SpawnSpec::new("stubborn", "sh")
            .args(["-c", "trap '' INT; sleep 60"])
            .log_to(dir.path().join("stubborn.log"));
        let id = supervisor.spawn(spec).await.unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        let graceful = supervisor.terminate(&id, Duration::from_millis(300)).await;
        assert!(!graceful);
        assert!(!supervisor.is_running(&id));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_running_references() {
        let supervisor = ProcessSupervisor::new();
        let dir = tempfile::tempdir().unwrap();

        let spec = SpawnSpec::new("ref", "sleep")
            .arg("5")
            .log_to(dir.path().join("ref.log"));
        supervisor.spawn(spec).await.unwrap();

        assert!(supervisor.any_running_references("sleep 5"));
        assert!(!supervisor.any_running_references("/some/file.ts"));
        supervisor.terminate("ref", Duration::from_millis(200)).await;
    }

    #[test]
    fn test_log_paths() {
        let at = chrono::TimeZone::with_ymd_and_hms(&Utc, 2025, 1, 2, 10, 0, 0).unwrap();
        let path = capture_log_path(Path::new("logs"), "alice", at);
        assert_eq!(path, PathBuf::from("logs/streamlink/alice_20250102_100000.log"));
        let path = convert_log_path(Path::new("logs"), "alice", "remux", at);
        assert_eq!(path, PathBuf::from("logs/ffmpeg/alice_remux_20250102_100000.log"));
    }
}

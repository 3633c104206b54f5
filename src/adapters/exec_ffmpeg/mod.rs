//! FFmpeg execution adapter
//!
//! Runs the interpolation command with the `ffmpeg` binary. The engine's
//! virtual filesystem is a private temporary directory created on load and
//! removed on terminate; commands run with that directory as their working
//! directory so virtual file names resolve inside it. Progress is read from
//! `-progress pipe:1` and forwarded to listeners as elapsed microseconds.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::domain::errors::DomainError;
use crate::ports::*;

/// Arguments placed before every command
const BASE_ARGS: &[&str] = &[
    "-hide_banner",
    "-nostdin",
    "-y",
    "-loglevel",
    "error",
    "-progress",
    "pipe:1",
];

/// Elapsed output time from one `-progress` line, in microseconds
///
/// `out_time_ms` carries microseconds as well, despite its name.
pub fn parse_progress_line(line: &str) -> Option<i64> {
    let (key, value) = line.trim().split_once('=')?;
    match key {
        "out_time_us" | "out_time_ms" => value.trim().parse::<i64>().ok().filter(|v| *v >= 0),
        _ => None,
    }
}

/// Reject names that would escape the engine's private directory
fn validate_name(name: &str) -> Result<(), DomainError> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0');
    if invalid {
        return Err(DomainError::BadArgs(format!(
            "Invalid virtual file name: {:?}",
            name
        )));
    }
    Ok(())
}

/// Creates engines bound to one ffmpeg binary
#[derive(Debug, Clone)]
pub struct FfmpegEngineFactory {
    ffmpeg_path: PathBuf,
}

impl FfmpegEngineFactory {
    pub fn new(ffmpeg_path: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
        }
    }
}

impl EngineFactory for FfmpegEngineFactory {
    fn create(&self) -> Arc<dyn TranscodeEngine> {
        Arc::new(FfmpegEngine::new(self.ffmpeg_path.clone()))
    }
}

/// Process-backed transcoding engine
pub struct FfmpegEngine {
    ffmpeg_path: PathBuf,
    workdir: Mutex<Option<TempDir>>,
    listeners: Mutex<HashMap<ListenerId, ProgressListener>>,
    next_listener: AtomicU64,
    terminated: watch::Sender<bool>,
}

impl FfmpegEngine {
    pub fn new(ffmpeg_path: impl Into<PathBuf>) -> Self {
        let (terminated, _) = watch::channel(false);
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            workdir: Mutex::new(None),
            listeners: Mutex::new(HashMap::new()),
            next_listener: AtomicU64::new(0),
            terminated,
        }
    }

    fn is_terminated(&self) -> bool {
        *self.terminated.borrow()
    }

    /// Root of the private namespace
    fn root(&self) -> Result<PathBuf, DomainError> {
        if self.is_terminated() {
            return Err(DomainError::EngineTerminated);
        }
        self.workdir
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|dir| dir.path().to_path_buf())
            .ok_or_else(|| DomainError::Execution("engine not loaded".to_string()))
    }

    fn resolve(&self, name: &str) -> Result<PathBuf, DomainError> {
        validate_name(name)?;
        Ok(self.root()?.join(name))
    }

    fn emit(&self, time_micros: i64) {
        let listeners: Vec<ProgressListener> = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        for listener in listeners {
            listener(ProgressEvent { time_micros });
        }
    }

    async fn run(&self, root: &Path, args: &[String]) -> Result<i32, DomainError> {
        let mut command = Command::new(&self.ffmpeg_path);
        command
            .args(BASE_ARGS)
            .args(args)
            .current_dir(root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|e| {
            DomainError::Execution(format!(
                "Failed to start {}: {}",
                self.ffmpeg_path.display(),
                e
            ))
        })?;
        let stdout = child.stdout.take();
        let mut terminated = self.terminated.subscribe();

        let progress = async {
            let Some(stdout) = stdout else {
                return;
            };
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if let Some(micros) = parse_progress_line(&line) {
                    self.emit(micros);
                }
            }
        };

        tokio::select! {
            (_, status) = async { tokio::join!(progress, child.wait()) } => {
                let status = status.map_err(|e| DomainError::Execution(e.to_string()))?;
                if self.is_terminated() {
                    return Err(DomainError::EngineTerminated);
                }
                status.code().ok_or_else(|| {
                    DomainError::Execution("ffmpeg was stopped by a signal".to_string())
                })
            }
            _ = async { let _ = terminated.wait_for(|stopped| *stopped).await; } => {
                if let Err(error) = child.start_kill() {
                    warn!(%error, "Failed to kill ffmpeg");
                }
                let _ = child.wait().await;
                Err(DomainError::EngineTerminated)
            }
        }
    }
}

#[async_trait]
impl TranscodeEngine for FfmpegEngine {
    async fn load(&self) -> Result<(), DomainError> {
        if self.is_terminated() {
            return Err(DomainError::EngineTerminated);
        }
        if self.is_loaded() {
            return Ok(());
        }

        let output = Command::new(&self.ffmpeg_path)
            .arg("-version")
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output()
            .await
            .map_err(|e| {
                DomainError::EngineLoad(format!(
                    "Cannot run {}: {}",
                    self.ffmpeg_path.display(),
                    e
                ))
            })?;
        if !output.status.success() {
            return Err(DomainError::EngineLoad(format!(
                "{} -version exited with {}",
                self.ffmpeg_path.display(),
                output.status
            )));
        }
        if let Some(version) = String::from_utf8_lossy(&output.stdout).lines().next() {
            debug!(version, "Probed ffmpeg binary");
        }

        let dir = tempfile::Builder::new()
            .prefix("smoothframe-")
            .tempdir()
            .map_err(|e| DomainError::EngineLoad(format!("Cannot create work directory: {}", e)))?;
        if self.is_terminated() {
            return Err(DomainError::EngineTerminated);
        }
        info!(workdir = %dir.path().display(), "FFmpeg engine loaded");
        *self.workdir.lock().unwrap_or_else(PoisonError::into_inner) = Some(dir);
        Ok(())
    }

    fn is_loaded(&self) -> bool {
        !self.is_terminated()
            && self
                .workdir
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .is_some()
    }

    async fn write_file(&self, name: &str, data: Vec<u8>) -> Result<(), DomainError> {
        let path = self.resolve(name)?;
        tokio::fs::write(&path, data)
            .await
            .map_err(|e| DomainError::FileSystem(format!("Cannot write {}: {}", name, e)))
    }

    async fn read_file(&self, name: &str) -> Result<Vec<u8>, DomainError> {
        let path = self.resolve(name)?;
        tokio::fs::read(&path)
            .await
            .map_err(|e| DomainError::FileSystem(format!("Cannot read {}: {}", name, e)))
    }

    async fn delete_file(&self, name: &str) -> Result<(), DomainError> {
        let path = self.resolve(name)?;
        tokio::fs::remove_file(&path)
            .await
            .map_err(|e| DomainError::FileSystem(format!("Cannot delete {}: {}", name, e)))
    }

    async fn exec(&self, args: &[String]) -> Result<i32, DomainError> {
        let root = self.root()?;
        debug!(?args, "Running ffmpeg");
        self.run(&root, args).await
    }

    fn on_progress(&self, listener: ProgressListener) -> ListenerId {
        let id = self.next_listener.fetch_add(1, Ordering::SeqCst);
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, listener);
        id
    }

    fn off_progress(&self, id: ListenerId) {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
    }

    fn terminate(&self) {
        if self.terminated.send_replace(true) {
            return;
        }
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        let dir = self
            .workdir
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(dir) = dir {
            let path = dir.path().to_path_buf();
            if let Err(error) = dir.close() {
                debug!(workdir = %path.display(), %error, "Ignoring work directory cleanup failure");
            }
        }
        debug!("FFmpeg engine terminated");
    }
}

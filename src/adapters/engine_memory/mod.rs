// Memory engine - Scripted in-process TranscodeEngine for simulation and tests

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::debug;

use crate::domain::errors::DomainError;
use crate::ports::*;

/// What the next `exec` call does
#[derive(Debug, Clone)]
pub enum ScriptedRun {
    /// Emit progress, wait `delay`, copy the `-i` input to the last argument when `code` is 0, return `code`
    Exit {
        code: i32,
        progress_micros: Vec<i64>,
        delay: Duration,
    },
    /// Raise an execution error with this message
    Fail(String),
    /// Never finish on its own; returns once the engine is terminated
    Hang { progress_micros: Vec<i64> },
}

impl ScriptedRun {
    pub fn exit(code: i32) -> Self {
        ScriptedRun::Exit {
            code,
            progress_micros: Vec::new(),
            delay: Duration::ZERO,
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        ScriptedRun::Fail(message.into())
    }

    pub fn hang() -> Self {
        ScriptedRun::Hang {
            progress_micros: Vec::new(),
        }
    }

    /// Progress events (elapsed microseconds) emitted before finishing
    pub fn with_progress(mut self, micros: impl IntoIterator<Item = i64>) -> Self {
        match &mut self {
            ScriptedRun::Exit {
                progress_micros, ..
            }
            | ScriptedRun::Hang { progress_micros } => progress_micros.extend(micros),
            ScriptedRun::Fail(_) => {}
        }
        self
    }

    pub fn with_delay(mut self, duration: Duration) -> Self {
        if let ScriptedRun::Exit { delay, .. } = &mut self {
            *delay = duration;
        }
        self
    }
}

#[derive(Default)]
struct Script {
    runs: VecDeque<ScriptedRun>,
    load_failures: usize,
    created: usize,
    terminated: usize,
    exec_log: Vec<Vec<String>>,
    engines: Vec<Weak<MemoryEngine>>,
}

fn lock(script: &Mutex<Script>) -> MutexGuard<'_, Script> {
    script.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Creates memory engines sharing one run script
///
/// Runs are consumed in order across every engine the factory creates; once
/// the script is exhausted each run exits with status 0.
#[derive(Clone, Default)]
pub struct MemoryEngineFactory {
    script: Arc<Mutex<Script>>,
}

impl MemoryEngineFactory {
    pub fn new(runs: Vec<ScriptedRun>) -> Self {
        let factory = Self::default();
        lock(&factory.script).runs = runs.into();
        factory
    }

    /// Make the next `count` loads fail
    pub fn with_load_failures(self, count: usize) -> Self {
        lock(&self.script).load_failures = count;
        self
    }

    pub fn created_count(&self) -> usize {
        lock(&self.script).created
    }

    pub fn terminated_count(&self) -> usize {
        lock(&self.script).terminated
    }

    /// Arguments of every `exec` call, oldest first
    pub fn exec_log(&self) -> Vec<Vec<String>> {
        lock(&self.script).exec_log.clone()
    }

    /// Engines created so far that are still referenced somewhere
    pub fn engines(&self) -> Vec<Arc<MemoryEngine>> {
        lock(&self.script)
            .engines
            .iter()
            .filter_map(Weak::upgrade)
            .collect()
    }
}

impl EngineFactory for MemoryEngineFactory {
    fn create(&self) -> Arc<dyn TranscodeEngine> {
        let engine = Arc::new(MemoryEngine::new(Arc::clone(&self.script)));
        let mut script = lock(&self.script);
        script.created += 1;
        script.engines.push(Arc::downgrade(&engine));
        engine
    }
}

/// Engine whose virtual filesystem is a hash map and whose runs follow the script
pub struct MemoryEngine {
    script: Arc<Mutex<Script>>,
    files: Mutex<HashMap<String, Vec<u8>>>,
    listeners: Mutex<HashMap<ListenerId, ProgressListener>>,
    next_listener: AtomicU64,
    loaded: AtomicBool,
    terminated: watch::Sender<bool>,
}

impl MemoryEngine {
    fn new(script: Arc<Mutex<Script>>) -> Self {
        let (terminated, _) = watch::channel(false);
        Self {
            script,
            files: Mutex::new(HashMap::new()),
            listeners: Mutex::new(HashMap::new()),
            next_listener: AtomicU64::new(0),
            loaded: AtomicBool::new(false),
            terminated,
        }
    }

    pub fn is_terminated(&self) -> bool {
        *self.terminated.borrow()
    }

    /// Names currently present in the virtual filesystem
    pub fn file_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    pub fn listener_count(&self) -> usize {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn ensure_alive(&self) -> Result<(), DomainError> {
        if self.is_terminated() {
            return Err(DomainError::EngineTerminated);
        }
        Ok(())
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

    async fn wait_terminated(&self) {
        let mut rx = self.terminated.subscribe();
        let _ = rx.wait_for(|terminated| *terminated).await;
    }

    /// Contents of the file named after `-i`, empty when absent
    fn input_of(&self, args: &[String]) -> Vec<u8> {
        let files = self.files.lock().unwrap_or_else(PoisonError::into_inner);
        args.iter()
            .position(|arg| arg == "-i")
            .and_then(|at| args.get(at + 1))
            .and_then(|name| files.get(name))
            .cloned()
            .unwrap_or_default()
    }

    async fn emit_all(&self, progress: &[i64]) -> Result<(), DomainError> {
        for micros in progress {
            self.ensure_alive()?;
            self.emit(*micros);
            tokio::task::yield_now().await;
        }
        self.ensure_alive()
    }
}

#[async_trait]
impl TranscodeEngine for MemoryEngine {
    async fn load(&self) -> Result<(), DomainError> {
        self.ensure_alive()?;
        if self.loaded.load(Ordering::SeqCst) {
            return Ok(());
        }
        let fail = {
            let mut script = lock(&self.script);
            let fail = script.load_failures > 0;
            if fail {
                script.load_failures -= 1;
            }
            fail
        };
        if fail {
            return Err(DomainError::EngineLoad("scripted load failure".to_string()));
        }
        self.ensure_alive()?;
        self.loaded.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::SeqCst) && !self.is_terminated()
    }

    async fn write_file(&self, name: &str, data: Vec<u8>) -> Result<(), DomainError> {
        self.ensure_alive()?;
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), data);
        Ok(())
    }

    async fn read_file(&self, name: &str) -> Result<Vec<u8>, DomainError> {
        self.ensure_alive()?;
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| DomainError::FileSystem(format!("No such virtual file: {}", name)))
    }

    async fn delete_file(&self, name: &str) -> Result<(), DomainError> {
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| DomainError::NotFound(format!("virtual file {}", name)))
    }

    async fn exec(&self, args: &[String]) -> Result<i32, DomainError> {
        self.ensure_alive()?;
        if !self.is_loaded() {
            return Err(DomainError::Execution("engine not loaded".to_string()));
        }
        let run = {
            let mut script = lock(&self.script);
            script.exec_log.push(args.to_vec());
            script.runs.pop_front().unwrap_or_else(|| ScriptedRun::exit(0))
        };
        debug!(?run, "Memory engine run");

        match run {
            ScriptedRun::Exit {
                code,
                progress_micros,
                delay,
            } => {
                self.emit_all(&progress_micros).await?;
                if !delay.is_zero() {
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = self.wait_terminated() => return Err(DomainError::EngineTerminated),
                    }
                }
                if code == 0 {
                    let output_name = args.last().cloned().unwrap_or_default();
                    let output = self.input_of(args);
                    self.write_file(&output_name, output).await?;
                }
                Ok(code)
            }
            ScriptedRun::Fail(message) => Err(DomainError::Execution(message)),
            ScriptedRun::Hang { progress_micros } => {
                self.emit_all(&progress_micros).await?;
                self.wait_terminated().await;
                Err(DomainError::EngineTerminated)
            }
        }
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
        let first = !self.terminated.send_replace(true);
        if first {
            lock(&self.script).terminated += 1;
            self.loaded.store(false, Ordering::SeqCst);
            self.files
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clear();
            self.listeners
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clear();
        }
    }
}

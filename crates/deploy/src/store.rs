//! Persistence of the deployment state.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use fs2::FileExt;

use crate::{intent::Intent, state::State};

pub const INTENT_FILENAME: &str = "intent.toml";
pub const STATE_FILENAME: &str = "state.json";
const LOCK_FILENAME: &str = ".opchain.lock";

/// Receives the state after every committed stage.
pub trait StateStore: Send + Sync {
    fn write(&self, state: &State) -> Result<()>;
}

impl<T: StateStore + ?Sized> StateStore for &T {
    fn write(&self, state: &State) -> Result<()> {
        (**self).write(state)
    }
}

/// Keeps nothing. Runs using it cannot be resumed.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopStateStore;

impl StateStore for NoopStateStore {
    fn write(&self, _state: &State) -> Result<()> {
        Ok(())
    }
}

/// Keeps the last written state in memory.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    last: Mutex<Option<State>>,
}

impl MemoryStateStore {
    pub fn last(&self) -> Option<State> {
        self.last.lock().ok().and_then(|last| last.clone())
    }
}

impl StateStore for MemoryStateStore {
    fn write(&self, state: &State) -> Result<()> {
        let mut last = self
            .last
            .lock()
            .map_err(|_| anyhow::anyhow!("state store lock poisoned"))?;
        *last = Some(state.clone());
        Ok(())
    }
}

/// Writes `state.json` atomically: a sibling temporary file is written, flushed and renamed
/// over the target.
#[derive(Debug, Clone)]
pub struct FileStateStore {
    path: PathBuf,
}

impl FileStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StateStore for FileStateStore {
    fn write(&self, state: &State) -> Result<()> {
        let content = state.to_json()?;
        let tmp = self.path.with_extension("json.tmp");

        let mut file = File::create(&tmp)
            .with_context(|| format!("Failed to create {}", tmp.display()))?;
        file.write_all(content.as_bytes())
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        file.sync_all()
            .with_context(|| format!("Failed to flush {}", tmp.display()))?;
        drop(file);

        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        tracing::debug!(path = %self.path.display(), "State saved");
        Ok(())
    }
}

/// Read a persisted state; a missing file yields a fresh state.
pub fn read_state(path: &Path) -> Result<State> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "No state found, starting fresh");
        return Ok(State::default());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read state from {}", path.display()))?;
    State::from_json(&content).with_context(|| format!("Invalid state in {}", path.display()))
}

/// Held while a run owns a working directory.
#[derive(Debug)]
pub struct WorkdirLock {
    file: File,
}

impl Drop for WorkdirLock {
    fn drop(&mut self) {
        if let Err(err) = FileExt::unlock(&self.file) {
            tracing::warn!(error = %err, "Failed to release working directory lock");
        }
    }
}

/// A deployment working directory holding `intent.toml` and `state.json`.
#[derive(Debug, Clone)]
pub struct Workdir {
    root: PathBuf,
}

impl Workdir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create the directory if needed.
    pub fn create(root: impl Into<PathBuf>) -> Result<Self> {
        let workdir = Self::new(root);
        std::fs::create_dir_all(&workdir.root)
            .with_context(|| format!("Failed to create {}", workdir.root.display()))?;
        Ok(workdir)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn intent_path(&self) -> PathBuf {
        self.root.join(INTENT_FILENAME)
    }

    pub fn state_path(&self) -> PathBuf {
        self.root.join(STATE_FILENAME)
    }

    /// Take the exclusive lock for this directory, failing if another run holds it.
    pub fn lock(&self) -> Result<WorkdirLock> {
        let path = self.root.join(LOCK_FILENAME);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        file.try_lock_exclusive().with_context(|| {
            format!(
                "{} is in use by another deployment",
                self.root.display()
            )
        })?;
        Ok(WorkdirLock { file })
    }

    pub fn read_intent(&self) -> Result<Intent> {
        let path = self.intent_path();
        if !path.exists() {
            anyhow::bail!("Intent file not found: {}", path.display());
        }
        Intent::load_from_file(&path)
    }

    pub fn write_intent(&self, intent: &Intent) -> Result<()> {
        intent.save_to_file(&self.intent_path())
    }

    pub fn read_state(&self) -> Result<State> {
        read_state(&self.state_path())
    }

    pub fn state_store(&self) -> FileStateStore {
        FileStateStore::new(self.state_path())
    }
}

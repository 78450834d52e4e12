//! Execution state persistence.
//!
//! The controller talks to a [`StateStore`] port instead of a fixed path, so
//! tests can swap the filesystem for memory. [`FileStateStore`] owns its state
//! file exclusively for as long as it lives.

use std::cell::RefCell;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, warn};

use crate::core::types::ExecutionState;

/// Default state file name.
pub const DEFAULT_STATE_FILE: &str = "execution_state.json";

/// Load/save port for the controller's execution state.
pub trait StateStore {
    /// Load persisted state, or `None` when nothing has been saved yet.
    fn load(&self) -> Result<Option<ExecutionState>>;
    fn save(&self, state: &ExecutionState) -> Result<()>;
}

/// State stored as pretty JSON at a fixed path, guarded by a `<path>.lock` file.
#[derive(Debug)]
pub struct FileStateStore {
    path: PathBuf,
    lock_path: PathBuf,
}

impl FileStateStore {
    /// Open the store and take the lock for `path`.
    ///
    /// Fails if another store holds the lock. A lock left behind by a crashed
    /// process has to be removed by hand.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let lock_path = lock_path_for(&path);
        if let Some(parent) = lock_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("create directory {}", parent.display()))?;
        }
        let mut lock = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path)
        {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                return Err(anyhow!(
                    "state file {} is locked by another controller (remove {} if stale)",
                    path.display(),
                    lock_path.display()
                ));
            }
            Err(err) => {
                return Err(err).with_context(|| format!("create lock {}", lock_path.display()));
            }
        };
        writeln!(lock, "{}", std::process::id())
            .with_context(|| format!("write lock {}", lock_path.display()))?;
        debug!(path = %path.display(), "state store locked");
        Ok(Self { path, lock_path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StateStore for FileStateStore {
    fn load(&self) -> Result<Option<ExecutionState>> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "no persisted state");
            return Ok(None);
        }
        load_state(&self.path).map(Some)
    }

    fn save(&self, state: &ExecutionState) -> Result<()> {
        write_state(&self.path, state)
    }
}

impl Drop for FileStateStore {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_file(&self.lock_path) {
            warn!(lock = %self.lock_path.display(), err = %err, "failed to release state lock");
        }
    }
}

fn lock_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".lock");
    path.with_file_name(name)
}

/// Load execution state from disk.
pub fn load_state(path: &Path) -> Result<ExecutionState> {
    debug!(path = %path.display(), "loading execution state");
    let contents =
        fs::read_to_string(path).with_context(|| format!("read state {}", path.display()))?;
    let state: ExecutionState = serde_json::from_str(&contents)
        .with_context(|| format!("parse state {}", path.display()))?;
    debug!(
        completed = state.completed_steps.len(),
        failed = state.failed_steps.len(),
        "execution state loaded"
    );
    Ok(state)
}

/// Atomically write execution state to disk (temp file + rename).
pub fn write_state(path: &Path, state: &ExecutionState) -> Result<()> {
    debug!(path = %path.display(), current_step = state.current_step, "writing execution state");
    let mut buf = serde_json::to_string_pretty(state)?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp state {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace state {}", path.display()))?;
    Ok(())
}

/// In-memory store. Clones share the same slot, so a second controller can
/// observe what the first one saved.
#[derive(Debug, Clone, Default)]
pub struct MemoryStateStore {
    slot: Rc<RefCell<Option<ExecutionState>>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last saved state, if any.
    pub fn snapshot(&self) -> Option<ExecutionState> {
        self.slot.borrow().clone()
    }
}

impl StateStore for MemoryStateStore {
    fn load(&self) -> Result<Option<ExecutionState>> {
        Ok(self.snapshot())
    }

    fn save(&self, state: &ExecutionState) -> Result<()> {
        *self.slot.borrow_mut() = Some(state.clone());
        Ok(())
    }
}

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::error::{MrError, MrResult};

const TEMPORARY_DIR: &str = "_temporary";
const SUCCESS_MARKER: &str = "_SUCCESS";

/// Where final `(key, count)` results go.
///
/// A job calls `check`, then `setup`, then `write_partition` once per
/// partition (again if that reduce task is retried), then `commit`. Nothing is
/// visible as output before `commit`; `abort` discards whatever `setup` and
/// `write_partition` left behind.
pub trait OutputSink: Send + Sync {
    fn location(&self) -> String;
    fn check(&self) -> MrResult<()>;
    fn setup(&self) -> MrResult<()>;
    fn write_partition(&self, index: usize, results: &[(String, u64)]) -> MrResult<()>;
    fn commit(&self, partitions: usize) -> MrResult<()>;
    fn abort(&self);
}

pub fn part_file_name(index: usize) -> String {
    format!("part-r-{:05}", index)
}

/// A directory of `part-r-NNNNN` files plus a `_SUCCESS` marker.
#[derive(Debug)]
pub struct DirOutput {
    path: PathBuf,
    created: AtomicBool,
}

impl DirOutput {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DirOutput {
            path: path.into(),
            created: AtomicBool::new(false),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temporary(&self) -> PathBuf {
        self.path.join(TEMPORARY_DIR)
    }
}

impl OutputSink for DirOutput {
    fn location(&self) -> String {
        self.path.display().to_string()
    }

    fn check(&self) -> MrResult<()> {
        if self.path.exists() {
            return Err(MrError::OutputAlreadyExists {
                location: self.location(),
            });
        }
        Ok(())
    }

    fn setup(&self) -> MrResult<()> {
        self.check()?;
        fs::create_dir_all(self.temporary())
            .map_err(|e| MrError::io(format!("creating {}", self.temporary().display()), e))?;
        self.created.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn write_partition(&self, index: usize, results: &[(String, u64)]) -> MrResult<()> {
        let path = self.temporary().join(part_file_name(index));
        let context = || format!("writing {}", path.display());
        let file = File::create(&path).map_err(|e| MrError::io(context(), e))?;
        let mut writer = BufWriter::new(file);
        for (key, count) in results {
            writeln!(writer, "{}\t{}", key, count).map_err(|e| MrError::io(context(), e))?;
        }
        writer.flush().map_err(|e| MrError::io(context(), e))?;
        Ok(())
    }

    fn commit(&self, partitions: usize) -> MrResult<()> {
        for index in 0..partitions {
            let name = part_file_name(index);
            let from = self.temporary().join(&name);
            let to = self.path.join(&name);
            fs::rename(&from, &to)
                .map_err(|e| MrError::io(format!("committing {}", from.display()), e))?;
        }
        fs::remove_dir_all(self.temporary())
            .map_err(|e| MrError::io(format!("removing {}", self.temporary().display()), e))?;
        File::create(self.path.join(SUCCESS_MARKER))
            .map_err(|e| MrError::io("writing success marker", e))?;
        Ok(())
    }

    fn abort(&self) {
        // never touch a directory this job did not create
        if self.created.swap(false, Ordering::SeqCst) {
            if let Err(e) = fs::remove_dir_all(&self.path) {
                tracing::warn!("failed to clean up {}: {}", self.path.display(), e);
            }
        }
    }
}

/// Keeps results in memory. `occupied()` builds one that reports its
/// location as already taken.
#[derive(Debug, Default)]
pub struct MemoryOutput {
    occupied: bool,
    staged: Mutex<BTreeMap<usize, Vec<(String, u64)>>>,
    committed: Mutex<Option<BTreeMap<usize, Vec<(String, u64)>>>>,
}

impl MemoryOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn occupied() -> Self {
        MemoryOutput {
            occupied: true,
            ..Self::default()
        }
    }

    pub fn is_committed(&self) -> bool {
        self.committed.lock().map_or(false, |c| c.is_some())
    }

    /// Committed results of every partition, in partition order.
    pub fn results(&self) -> Vec<(String, u64)> {
        match self.committed.lock() {
            Ok(committed) => committed
                .iter()
                .flat_map(|parts| parts.values().flatten().cloned())
                .collect(),
            Err(_) => vec![],
        }
    }
}

fn poisoned() -> MrError {
    MrError::io("memory output", std::io::Error::other("lock poisoned"))
}

impl OutputSink for MemoryOutput {
    fn location(&self) -> String {
        "memory".to_string()
    }

    fn check(&self) -> MrResult<()> {
        if self.occupied || self.is_committed() {
            return Err(MrError::OutputAlreadyExists {
                location: self.location(),
            });
        }
        Ok(())
    }

    fn setup(&self) -> MrResult<()> {
        self.check()
    }

    fn write_partition(&self, index: usize, results: &[(String, u64)]) -> MrResult<()> {
        let mut staged = self.staged.lock().map_err(|_| poisoned())?;
        staged.insert(index, results.to_vec());
        Ok(())
    }

    fn commit(&self, _partitions: usize) -> MrResult<()> {
        let staged = self
            .staged
            .lock()
            .map(|mut s| std::mem::take(&mut *s))
            .map_err(|_| poisoned())?;
        if let Ok(mut committed) = self.committed.lock() {
            *committed = Some(staged);
        }
        Ok(())
    }

    fn abort(&self) {
        if let Ok(mut staged) = self.staged.lock() {
            staged.clear();
        }
    }
}

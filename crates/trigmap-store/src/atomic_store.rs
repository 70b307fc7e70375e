//! Lock-scoped mutation of a JSONL store snapshot.
//!
//! Dependency mutations must not interleave: two writers validating against
//! the same snapshot could each pass the cycle check and together close a
//! cycle. A create-new lock file serializes load → mutate → save across
//! processes.

use crate::error::StoreError;
use crate::memory::MemoryStore;
use chrono::Utc;
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

pub fn store_lock_path(store_path: &Path) -> PathBuf {
    let mut path: OsString = store_path.as_os_str().to_os_string();
    path.push(".lock");
    PathBuf::from(path)
}

#[derive(Debug, thiserror::Error)]
pub enum AtomicStoreMutationError<E: std::error::Error + 'static> {
    #[error("store lock busy: {lock_path}")]
    LockBusy { lock_path: String },

    #[error("failed to acquire store lock {lock_path}: {message}")]
    LockIo { lock_path: String, message: String },

    #[error(transparent)]
    Store(StoreError),

    #[error(transparent)]
    Mutation(E),
}

/// Load the snapshot at `path`, run `mutator`, and persist when it reports
/// `changed = true`, all while holding the store lock.
pub fn mutate_store_jsonl<T, E, F>(
    path: impl AsRef<Path>,
    mutator: F,
) -> Result<T, AtomicStoreMutationError<E>>
where
    E: std::error::Error + 'static,
    F: FnOnce(&mut MemoryStore) -> Result<(T, bool), E>,
{
    let path = path.as_ref();
    let _guard = StoreLockGuard::acquire(path)?;

    let mut store = MemoryStore::load_jsonl(path).map_err(AtomicStoreMutationError::Store)?;
    let (value, changed) = mutator(&mut store).map_err(AtomicStoreMutationError::Mutation)?;
    if changed {
        store
            .save_jsonl(path)
            .map_err(AtomicStoreMutationError::Store)?;
        tracing::debug!(path = %path.display(), "store snapshot persisted");
    }
    Ok(value)
}

struct StoreLockGuard {
    lock_path: PathBuf,
    _file: File,
}

impl StoreLockGuard {
    fn acquire<E: std::error::Error + 'static>(
        path: &Path,
    ) -> Result<Self, AtomicStoreMutationError<E>> {
        let lock_path = store_lock_path(path);
        if let Some(parent) = lock_path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| lock_io(&lock_path, e))?;
        }

        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path)
        {
            Ok(mut file) => {
                let _ = writeln!(
                    file,
                    "pid={}\nutc={}",
                    std::process::id(),
                    Utc::now().to_rfc3339()
                );
                Ok(Self {
                    lock_path,
                    _file: file,
                })
            }
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                tracing::warn!(lock = %lock_path.display(), "store lock busy");
                Err(AtomicStoreMutationError::LockBusy {
                    lock_path: lock_path.display().to_string(),
                })
            }
            Err(err) => Err(lock_io(&lock_path, err)),
        }
    }
}

fn lock_io<E: std::error::Error + 'static>(
    lock_path: &Path,
    err: std::io::Error,
) -> AtomicStoreMutationError<E> {
    AtomicStoreMutationError::LockIo {
        lock_path: lock_path.display().to_string(),
        message: err.to_string(),
    }
}

impl Drop for StoreLockGuard {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.lock_path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jsonl::{StoreRecord, write_records_to_path};
    use std::time::{SystemTime, UNIX_EPOCH};
    use trigmap_kernel::DependencyEdge;

    fn temp_store(prefix: &str) -> PathBuf {
        let unique = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock should be after unix epoch")
            .as_nanos();
        let path = std::env::temp_dir().join(format!(
            "trigmap-atomic-{prefix}-{}-{unique}.jsonl",
            std::process::id()
        ));
        write_records_to_path(&path, &[StoreRecord::Dependency(DependencyEdge::new(2, 1))])
            .expect("seed snapshot should be written");
        path
    }

    #[derive(Debug, thiserror::Error)]
    #[error("refused")]
    struct Refused;

    #[test]
    fn unchanged_mutation_does_not_rewrite_and_releases_lock() {
        let path = temp_store("unchanged");
        let before = fs::read(&path).expect("snapshot should exist");

        let count = mutate_store_jsonl::<_, Refused, _>(&path, |store| {
            Ok((store.dependency_edges().count(), false))
        })
        .expect("mutation should run");

        assert_eq!(count, 1);
        assert_eq!(fs::read(&path).expect("snapshot should exist"), before);
        assert!(!store_lock_path(&path).exists());
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn busy_lock_is_reported() {
        let path = temp_store("busy");
        let lock = store_lock_path(&path);
        fs::write(&lock, "pid=0\n").expect("lock should be planted");

        let err = mutate_store_jsonl::<(), Refused, _>(&path, |_| Ok(((), false)))
            .expect_err("held lock must fail");
        assert!(matches!(err, AtomicStoreMutationError::LockBusy { .. }));

        let _ = fs::remove_file(&lock);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn mutation_error_leaves_snapshot_untouched() {
        let path = temp_store("refused");
        let before = fs::read(&path).expect("snapshot should exist");

        let err = mutate_store_jsonl::<(), Refused, _>(&path, |_| Err(Refused))
            .expect_err("mutation error must propagate");
        assert!(matches!(err, AtomicStoreMutationError::Mutation(Refused)));
        assert_eq!(fs::read(&path).expect("snapshot should exist"), before);
        let _ = fs::remove_file(&path);
    }
}

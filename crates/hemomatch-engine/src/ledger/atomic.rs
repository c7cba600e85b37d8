use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::Utc;
use tracing::{debug, warn};

/// Seconds after which an abandoned lock file may be taken over.
const STALE_LOCK_SECS: i64 = 60;

/// Write `content` to `path` via temp file, fsync, rename.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    let dir = path.parent().unwrap_or(Path::new("."));
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "state".into());
    let temp_path = dir.join(format!(".{name}.{}.tmp", temp_suffix()));

    let mut file = std::fs::File::create(&temp_path)
        .with_context(|| format!("cannot create temp file for {}", path.display()))?;
    file.write_all(content)?;
    file.sync_all()?;
    drop(file);

    std::fs::rename(&temp_path, path)
        .with_context(|| format!("cannot rename temp to {}", path.display()))?;
    Ok(())
}

/// Advisory lock over a hemomatch state directory.
///
/// The lock file holds the owner's pid, acquisition time and a per-holder
/// nonce. A lock whose timestamp is older than a minute is considered
/// abandoned; a lock file that cannot be parsed is treated as held, since a
/// new owner may not have written it yet. Released on drop.
#[derive(Debug)]
pub struct StateLock {
    lock_path: Option<PathBuf>,
    token: String,
}

impl StateLock {
    pub fn acquire(state_dir: &Path) -> Result<Self> {
        let lock_path = state_dir.join("hemomatch.lock");

        match std::fs::read_to_string(&lock_path) {
            Ok(content) => match lock_taken_at(&content) {
                Some(ts) if Utc::now().timestamp() - ts > STALE_LOCK_SECS => {
                    warn!(lock = %lock_path.display(), "removing stale state lock");
                    remove_if_holds(&lock_path, &content)
                        .with_context(|| format!("cannot remove stale lock {}", lock_path.display()))?;
                }
                _ => bail!(
                    "state directory is locked by another process (lock: {})",
                    lock_path.display()
                ),
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(e).with_context(|| format!("cannot read lock {}", lock_path.display()))
            }
        }

        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path)
            .with_context(|| format!("cannot acquire lock {}", lock_path.display()))?;
        let token = format!(
            "{}\n{}\n{}\n",
            std::process::id(),
            Utc::now().timestamp(),
            temp_suffix()
        );
        file.write_all(token.as_bytes())?;
        file.sync_all()?;
        debug!(lock = %lock_path.display(), "state lock acquired");

        Ok(Self {
            lock_path: Some(lock_path),
            token,
        })
    }

    /// Remove the lock file if it is still ours. A lock another process took
    /// over in the meantime is left in place.
    pub fn release(mut self) -> Result<()> {
        if let Some(path) = self.lock_path.take() {
            remove_if_holds(&path, &self.token)
                .with_context(|| format!("cannot release lock {}", path.display()))?;
        }
        Ok(())
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        if let Some(path) = self.lock_path.take() {
            let _ = remove_if_holds(&path, &self.token);
        }
    }
}

fn lock_taken_at(content: &str) -> Option<i64> {
    content.lines().nth(1).and_then(|ts| ts.trim().parse::<i64>().ok())
}

/// Delete `path` only while it still contains `expected`.
fn remove_if_holds(path: &Path, expected: &str) -> io::Result<()> {
    match std::fs::read_to_string(path) {
        Ok(current) if current == expected => std::fs::remove_file(path),
        Ok(_) => {
            debug!(lock = %path.display(), "lock changed hands, leaving it");
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

fn temp_suffix() -> String {
    let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    format!("{}-{nanos:x}", std::process::id())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Barrier};
    use std::thread;

    #[test]
    fn atomic_write_replaces_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weights.json");
        atomic_write(&path, b"v1").unwrap();
        atomic_write(&path, b"v2").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "v2");
        // no temp files left behind
        let leftovers = std::fs::read_dir(dir.path())
            .unwrap()
            .filter(|e| {
                e.as_ref()
                    .map(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
                    .unwrap_or(false)
            })
            .count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn lock_blocks_second_holder_until_dropped() {
        let dir = tempfile::tempdir().unwrap();
        {
            let _lock = StateLock::acquire(dir.path()).unwrap();
            assert!(StateLock::acquire(dir.path()).is_err());
        }
        let lock = StateLock::acquire(dir.path()).unwrap();
        lock.release().unwrap();
        assert!(!dir.path().join("hemomatch.lock").exists());
    }

    #[test]
    fn stale_lock_is_taken_over() {
        let dir = tempfile::tempdir().unwrap();
        let old = Utc::now().timestamp() - 3_600;
        std::fs::write(dir.path().join("hemomatch.lock"), format!("1\n{old}\n")).unwrap();
        assert!(StateLock::acquire(dir.path()).is_ok());
    }

    #[test]
    fn unwritten_lock_counts_as_held() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hemomatch.lock");
        for content in ["", "12345\n", "garbage"] {
            std::fs::write(&path, content).unwrap();
            assert!(StateLock::acquire(dir.path()).is_err(), "{content:?}");
            assert_eq!(std::fs::read_to_string(&path).unwrap(), content);
        }
    }

    #[test]
    fn fresh_lock_is_not_taken_over() {
        let dir = tempfile::tempdir().unwrap();
        let now = Utc::now().timestamp();
        std::fs::write(dir.path().join("hemomatch.lock"), format!("1\n{now}\n")).unwrap();
        assert!(StateLock::acquire(dir.path()).is_err());
    }

    #[test]
    fn release_leaves_a_lock_taken_over_by_another_holder() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hemomatch.lock");
        let lock = StateLock::acquire(dir.path()).unwrap();

        let foreign = format!("999\n{}\nother\n", Utc::now().timestamp());
        std::fs::write(&path, &foreign).unwrap();
        lock.release().unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), foreign);

        // same through drop
        std::fs::remove_file(&path).unwrap();
        let lock = StateLock::acquire(dir.path()).unwrap();
        std::fs::write(&path, &foreign).unwrap();
        drop(lock);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), foreign);
    }

    #[test]
    fn only_one_concurrent_holder() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().to_path_buf();
        let barrier = Arc::new(Barrier::new(8));
        let holding = Arc::new(AtomicU32::new(0));
        let peak = Arc::new(AtomicU32::new(0));
        let acquired = Arc::new(AtomicU32::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let barrier = Arc::clone(&barrier);
                let holding = Arc::clone(&holding);
                let peak = Arc::clone(&peak);
                let acquired = Arc::clone(&acquired);
                let path = path.clone();
                thread::spawn(move || {
                    barrier.wait();
                    for _ in 0..20 {
                        if let Ok(lock) = StateLock::acquire(&path) {
                            let now_holding = holding.fetch_add(1, Ordering::SeqCst) + 1;
                            peak.fetch_max(now_holding, Ordering::SeqCst);
                            acquired.fetch_add(1, Ordering::SeqCst);
                            thread::sleep(std::time::Duration::from_millis(2));
                            holding.fetch_sub(1, Ordering::SeqCst);
                            lock.release().unwrap();
                        }
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert!(acquired.load(Ordering::SeqCst) >= 1);
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }
}

//! Cross-process advisory lock on a single path.
//!
//! The lock protects a *file*, not a name, so acquiring it is an
//! open-lock-verify loop: another holder may unlink the lock file between our
//! `open` and our `lock_exclusive`, in which case our file descriptor locks a
//! file that no longer has any path pointing at it and a fresh holder can
//! acquire a *different* descriptor on a newly created file with the same
//! name. We detect that race by re-checking, once the OS grants us the lock,
//! that the path still resolves to the inode we locked.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use fs2::FileExt;

/// A held exclusive lock on `path`. Dropping it releases the lock the same
/// way [`FileLock::release`] does.
pub struct FileLock {
    path: PathBuf,
    handle: Option<File>,
}

impl FileLock {
    /// Blocks until exclusive ownership of `path` is obtained.
    pub fn acquire(path: &Path) -> io::Result<Self> {
        let path = path
            .canonicalize_parent_or_self()
            .unwrap_or_else(|| path.to_path_buf());
        loop {
            let handle = match OpenOptions::new().write(true).create(true).open(&path) {
                Ok(handle) => handle,
                Err(err) => return Err(err),
            };

            if let Err(err) = handle.lock_exclusive() {
                drop(handle);
                return Err(err);
            }

            match identity_still_matches(&handle, &path) {
                Ok(true) => return Ok(FileLock {
                    path,
                    handle: Some(handle),
                }),
                Ok(false) => {
                    // Someone unlinked (and possibly recreated) the lock file
                    // while we waited for the OS lock. Drop this descriptor's
                    // lock and retry against whatever now exists at `path`.
                    let _ = handle.unlock();
                    drop(handle);
                    continue;
                }
                Err(err) => {
                    let _ = handle.unlock();
                    drop(handle);
                    return Err(err);
                }
            }
        }
    }

    /// Releases the lock: unlinks the lock file, then closes the descriptor.
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = fs::remove_file(&self.path);
            let _ = handle.unlock();
            drop(handle);
        }
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        self.release_inner();
    }
}

#[cfg(unix)]
fn identity_still_matches(handle: &File, path: &Path) -> io::Result<bool> {
    use std::os::unix::fs::MetadataExt;

    let handle_meta = handle.metadata()?;
    match fs::metadata(path) {
        Ok(path_meta) => {
            Ok(handle_meta.dev() == path_meta.dev() && handle_meta.ino() == path_meta.ino())
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err),
    }
}

#[cfg(not(unix))]
fn identity_still_matches(_handle: &File, path: &Path) -> io::Result<bool> {
    // No stable inode to compare against on this platform; fall back to a
    // weaker existence check. Good enough for the development-mode use
    // this platform is permitted (spec.md 4.1).
    Ok(path.exists())
}

trait CanonicalizeParent {
    fn canonicalize_parent_or_self(&self) -> Option<PathBuf>;
}

impl CanonicalizeParent for Path {
    fn canonicalize_parent_or_self(&self) -> Option<PathBuf> {
        let parent = self.parent()?;
        let file_name = self.file_name()?;
        let canonical_parent = parent.canonicalize().ok()?;
        Some(canonical_parent.join(file_name))
    }
}

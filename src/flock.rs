//! Directory lock
//!
//! The engine supports exactly one node per storage directory per process
//! lifetime. A `LOCK` file held under an advisory exclusive lock makes a
//! second opener fail fast instead of corrupting shared state.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

#[cfg(unix)]
use std::os::unix::io::AsRawFd;

pub struct DirLock {
    _file: File,
    path: PathBuf,
}

impl DirLock {
    /// Create (or reopen) the lock file and take an exclusive, non-blocking
    /// lock on it. The file records the holder's process ID for debugging.
    pub fn acquire<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)?;

        Self::try_lock(&file)?;

        writeln!(file, "{}", std::process::id())?;
        file.flush()?;

        Ok(Self { _file: file, path })
    }

    #[cfg(unix)]
    fn try_lock(file: &File) -> io::Result<()> {
        use libc::{flock, LOCK_EX, LOCK_NB};

        let fd = file.as_raw_fd();
        let result = unsafe { flock(fd, LOCK_EX | LOCK_NB) };
        if result != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    #[cfg(not(unix))]
    fn try_lock(_file: &File) -> io::Result<()> {
        // No advisory locking on this platform; the exclusive-access
        // contract falls back to the caller.
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for DirLock {
    fn drop(&mut self) {
        // The OS releases the lock when the file handle closes. The lock
        // file itself stays behind to avoid unlink races.
    }
}

// =============================================================================
// Tests
// =============================================================================

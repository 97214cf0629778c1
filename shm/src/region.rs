use anyhow::{ensure, Context, Result};
use std::fs::{self, OpenOptions};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;

/// A named shared-memory region: a file under the shm root mapped
/// read-write into this process.
///
/// The creating side owns the file and unlinks it on drop; openers map
/// whatever the owner published. Both sides see the same bytes.
pub struct Region {
    ptr: NonNull<u8>,
    len: usize,
    path: PathBuf,
    owner: bool,
}

// The raw pointer is to a shared mapping; moving the handle between
// threads does not move the mapping.
unsafe impl Send for Region {}

impl Region {
    /// Creates (or truncates) the file at `path`, sizes it to `len` and
    /// maps it. The returned region owns the file.
    pub fn create(path: &Path, len: usize) -> Result<Self> {
        ensure!(len > 0, "cannot create an empty region");
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .with_context(|| format!("creating region {}", path.display()))?;
        file.set_len(len as u64)
            .with_context(|| format!("sizing region {}", path.display()))?;
        tracing::debug!(path = %path.display(), len, "region created");
        Self::map(&file, len, path, true)
    }

    /// Maps an existing region file at its published size.
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .with_context(|| format!("opening region {}", path.display()))?;
        let len = file.metadata()?.len() as usize;
        ensure!(len > 0, "region {} has no size yet", path.display());
        Self::map(&file, len, path, false)
    }

    fn map(file: &std::fs::File, len: usize, path: &Path, owner: bool) -> Result<Self> {
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                file.as_raw_fd(),
                0,
            )
        };
        ensure!(
            ptr != libc::MAP_FAILED,
            "mmap of {} failed: {}",
            path.display(),
            std::io::Error::last_os_error()
        );
        Ok(Self {
            ptr: NonNull::new(ptr.cast()).expect("mmap returned null"),
            len,
            path: path.to_path_buf(),
            owner,
        })
    }

    /// Base pointer of the mapping.
    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// Mapped length in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// True when the mapping is zero-length (never, by construction).
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for Region {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.ptr.as_ptr().cast(), self.len);
        }
        if self.owner {
            tracing::debug!(path = %self.path.display(), "region unlinked");
            fs::remove_file(&self.path).ok();
        }
    }
}

impl std::fmt::Debug for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Region")
            .field("path", &self.path)
            .field("len", &self.len)
            .field("owner", &self.owner)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_open_share_bytes() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("region");
        let a = Region::create(&path, 64)?;
        let b = Region::open(&path)?;
        unsafe {
            a.as_ptr().write(0x5a);
        }
        assert_eq!(unsafe { b.as_ptr().read() }, 0x5a);
        assert_eq!(b.len(), 64);
        drop(b);
        drop(a);
        assert!(!path.exists());
        Ok(())
    }

    #[test]
    fn open_missing_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Region::open(&dir.path().join("nope")).is_err());
    }
}

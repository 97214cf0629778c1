//! # Shared memory plumbing for weir
//!
//! A weir process family shares state through named regions under a
//! process-wide shm root (`/dev/shm/weir`, overridable with `WEIR_SHM`).
//! Every process owns a pid-scoped subdirectory; the leader finds a
//! follower's channel by the follower's pid.
//!
//! [`Region`] memory-maps a named file; [`Ring`] layers a bounded
//! lock-free single-producer single-consumer frame queue on top of one.
#![warn(missing_docs)]

mod region;
mod ring;

pub use crate::region::Region;
pub use crate::ring::Ring;

use std::path::{Path, PathBuf};

/// The shm root directory: `$WEIR_SHM`, or `/dev/shm/weir`.
pub fn root() -> PathBuf {
    std::env::var_os("WEIR_SHM")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("/dev/shm/weir"))
}

/// The pid-scoped subdirectory of the shm root.
pub fn process_dir(pid: u32) -> PathBuf {
    root().join(pid.to_string())
}

/// Resolves a region name: absolute paths pass through, relative names
/// land in the calling process's own shm directory.
pub fn resolve(name: &str) -> PathBuf {
    let path = Path::new(name);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        process_dir(std::process::id()).join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_names_are_pid_scoped() {
        let path = resolve("config-leader-socket");
        assert!(path.ends_with(format!(
            "{}/config-leader-socket",
            std::process::id()
        )));
        assert_eq!(resolve("/tmp/x"), PathBuf::from("/tmp/x"));
    }
}

//! Platform helpers for sandbox defaults and preflight checks.

use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Returns standard Linux library paths that should be readable by default.
#[must_use]
pub fn linux_runtime_roots() -> Vec<PathBuf> {
    #[cfg(target_os = "linux")]
    {
        let candidates = [
            "/lib",
            "/lib64",
            "/usr/lib",
            "/usr/lib64",
            "/lib/x86_64-linux-gnu",
            "/usr/lib/x86_64-linux-gnu",
            "/etc/ld.so.cache",
        ];
        existing_paths(&candidates)
    }

    #[cfg(not(target_os = "linux"))]
    {
        Vec::new()
    }
}

/// Canonical forms of the candidates that exist on this host.
pub(crate) fn existing_paths(candidates: &[&str]) -> Vec<PathBuf> {
    candidates
        .iter()
        .filter_map(|path| fs::canonicalize(Path::new(path)).ok())
        .collect()
}

/// Returns the number of threads in the current process.
pub fn thread_count() -> io::Result<usize> {
    #[cfg(target_os = "linux")]
    {
        let status = fs::read_to_string("/proc/self/status")?;
        let (_, tail) = status
            .split_once("Threads:")
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "missing thread count"))?;
        let count = tail
            .split_whitespace()
            .next()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "malformed thread count"))?;
        count
            .parse::<usize>()
            .map_err(|error| io::Error::new(io::ErrorKind::InvalidData, error))
    }

    #[cfg(not(target_os = "linux"))]
    {
        Ok(1)
    }
}

/// Resolves a command name to an executable path.
///
/// Absolute paths are returned when they exist; bare names are searched for
/// in `PATH`. Names containing a separator are resolved against the current
/// directory.
#[must_use]
pub fn resolve_command(name: &str) -> Option<PathBuf> {
    let candidate = Path::new(name);
    if candidate.is_absolute() {
        return candidate.exists().then(|| candidate.to_path_buf());
    }
    if candidate.components().count() > 1 {
        return std::path::absolute(candidate)
            .ok()
            .filter(|path| path.exists());
    }
    let search = env::var_os("PATH")?;
    env::split_paths(&search)
        .map(|dir| dir.join(name))
        .find(|path| path.is_file())
}

/// Makes `raw` absolute against the current directory without touching the
/// filesystem.
pub(crate) fn absolute_path(raw: &str) -> Option<PathBuf> {
    std::path::absolute(Path::new(raw)).ok()
}

//! Owner-only (mode 0600) flat-file writes. Explicit open-with-mode-bits +
//! truncate + write so the host process's umask cannot weaken the
//! permissions of files that may contain sender emails or conversation
//! transcripts.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;

use crate::error::Result;

pub fn write_json_0600<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut opts = OpenOptions::new();
    opts.write(true).create(true).truncate(true);
    #[cfg(unix)]
    opts.mode(0o600);
    let mut file = opts.open(path)?;
    let body = serde_json::to_string_pretty(value)?;
    file.write_all(body.as_bytes())?;
    Ok(())
}

pub fn ensure_gitkeep(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    let marker = dir.join(".gitkeep");
    if !marker.exists() {
        std::fs::write(marker, b"")?;
    }
    Ok(())
}

//! Atomic Configuration Install
//!
//! Writes the rendered proxy configuration next to its destination and
//! renames it into place, so the proxy never reads a half-written file.

use std::io;
use std::path::{Path, PathBuf};

/// Install `contents` at `path` unless the file already holds exactly that.
///
/// Returns `true` if the file was (re)written.
pub async fn install_if_changed(path: &Path, contents: &str) -> io::Result<bool> {
    match tokio::fs::read(path).await {
        Ok(existing) if existing == contents.as_bytes() => return Ok(false),
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    let staging = staging_path(path);
    tokio::fs::write(&staging, contents).await?;
    if let Err(e) = tokio::fs::rename(&staging, path).await {
        let _ = tokio::fs::remove_file(&staging).await;
        return Err(e);
    }

    Ok(true)
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

//! Best-effort filesystem operations.
//!
//! Failures are logged and reported as `false`. They never abort the
//! database operation that triggered them.

use std::io::ErrorKind;
use std::path::Path;
use tracing::{debug, warn};

pub const DIR_MODE: u32 = 0o777;
pub const FILE_MODE: u32 = 0o666;

#[cfg(unix)]
pub async fn set_mode(path: &Path, mode: u32) -> bool {
    use std::os::unix::fs::PermissionsExt;

    match tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).await {
        Ok(()) => true,
        Err(e) => {
            warn!("Could not set mode {:o} on {:?}: {}", mode, path, e);
            false
        }
    }
}

#[cfg(not(unix))]
pub async fn set_mode(_path: &Path, _mode: u32) -> bool {
    true
}

/// Create `dir` (and parents) and open up its permissions.
pub async fn ensure_dir(dir: &Path) -> bool {
    if let Err(e) = tokio::fs::create_dir_all(dir).await {
        warn!("Could not create directory {:?}: {}", dir, e);
        return false;
    }
    set_mode(dir, DIR_MODE).await
}

/// Copy `src` to `dst`, creating the destination directory when absent.
pub async fn copy_file(src: &Path, dst: &Path) -> bool {
    if let Some(parent) = dst.parent() {
        if !ensure_dir(parent).await {
            return false;
        }
    }
    match tokio::fs::copy(src, dst).await {
        Ok(bytes) => {
            debug!("Copied {:?} to {:?} ({} bytes)", src, dst, bytes);
            set_mode(dst, FILE_MODE).await;
            true
        }
        Err(e) => {
            warn!("Could not copy {:?} to {:?}: {}", src, dst, e);
            false
        }
    }
}

/// Remove a file. A file that is already gone counts as removed.
pub async fn remove_file(path: &Path) -> bool {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            debug!("Deleted {:?}", path);
            true
        }
        Err(e) if e.kind() == ErrorKind::NotFound => true,
        Err(e) => {
            warn!("Could not delete {:?}: {}", path, e);
            false
        }
    }
}

pub async fn remove_dir_all(dir: &Path) -> bool {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => true,
        Err(e) if e.kind() == ErrorKind::NotFound => true,
        Err(e) => {
            warn!("Could not delete directory {:?}: {}", dir, e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_copy_creates_destination_dir() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("song.mp3");
        tokio::fs::write(&src, b"audio").await.unwrap();
        let dst = dir.path().join("Warmup").join("song.mp3");

        assert!(copy_file(&src, &dst).await);
        assert_eq!(tokio::fs::read(&dst).await.unwrap(), b"audio");

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&dst).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, FILE_MODE);
        }
    }

    #[tokio::test]
    async fn test_copy_missing_source_is_reported() {
        let dir = TempDir::new().unwrap();
        let dst = dir.path().join("out.mp3");
        assert!(!copy_file(&dir.path().join("missing.mp3"), &dst).await);
        assert!(!dst.exists());
    }

    #[tokio::test]
    async fn test_remove_file_tolerates_missing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("song.mp3");
        assert!(remove_file(&path).await);

        tokio::fs::write(&path, b"audio").await.unwrap();
        assert!(remove_file(&path).await);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_remove_dir_all() {
        let dir = TempDir::new().unwrap();
        let playlist = dir.path().join("Set");
        assert!(ensure_dir(&playlist).await);
        tokio::fs::write(playlist.join("a.mp3"), b"a").await.unwrap();

        assert!(remove_dir_all(&playlist).await);
        assert!(!playlist.exists());
        assert!(remove_dir_all(&playlist).await);
    }
}

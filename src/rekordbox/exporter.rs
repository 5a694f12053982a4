use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use super::merge::{merge_library, ExportPlaylist, ExportTrack, MergeSummary};
use super::ExportError;
use crate::track_store::{DownloadStatus, TrackStore};

const FILE_URL_PREFIX: &str = "file://localhost";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportTarget {
    Xml,
    /// The binary `master.db` library.
    Database,
    Unsupported,
}

pub fn classify_target(path: &str) -> ExportTarget {
    if path.ends_with(".xml") {
        ExportTarget::Xml
    } else if path.ends_with(".db") || path.contains("master.db") {
        ExportTarget::Database
    } else {
        ExportTarget::Unsupported
    }
}

/// `file://localhost` URL for an absolute path, each segment percent-encoded.
pub fn file_location(path: &str) -> String {
    let encoded: Vec<String> = path
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect();
    format!("{}{}", FILE_URL_PREFIX, encoded.join("/"))
}

/// Maps download-root paths onto where the DJ machine mounts them.
#[derive(Debug, Clone)]
struct MediaRoot {
    download_root: PathBuf,
    media_root: PathBuf,
}

pub struct RekordboxExporter {
    store: Arc<dyn TrackStore>,
    folder_name: String,
    media_root: Option<MediaRoot>,
}

impl RekordboxExporter {
    pub fn new(store: Arc<dyn TrackStore>, folder_name: impl Into<String>) -> Self {
        Self {
            store,
            folder_name: folder_name.into(),
            media_root: None,
        }
    }

    /// Write locations under `media_root` instead of `download_root`.
    pub fn with_media_root(mut self, download_root: &Path, media_root: &Path) -> Self {
        self.media_root = Some(MediaRoot {
            download_root: download_root.to_path_buf(),
            media_root: media_root.to_path_buf(),
        });
        self
    }

    pub fn folder_name(&self) -> &str {
        &self.folder_name
    }

    fn location_for(&self, file_path: &str) -> String {
        let path = Path::new(file_path);
        let rewritten = self.media_root.as_ref().and_then(|m| {
            path.strip_prefix(&m.download_root)
                .ok()
                .map(|relative| m.media_root.join(relative))
        });
        match rewritten {
            Some(path) => file_location(&path.to_string_lossy()),
            None => file_location(file_path),
        }
    }

    /// Every playlist with its downloaded members, in playlist order.
    pub fn snapshot(&self) -> anyhow::Result<Vec<ExportPlaylist>> {
        let mut playlists = Vec::new();
        for summary in self.store.list_playlists()? {
            let tracks = self
                .store
                .list_playlist_entries(summary.playlist.id)?
                .into_iter()
                .filter_map(|entry| {
                    let matched = entry.matched?;
                    if matched.download_status != DownloadStatus::Completed {
                        return None;
                    }
                    let file_path = matched.file_path?;
                    Some(ExportTrack {
                        title: entry.track.title,
                        artist: entry.track.artist,
                        location: self.location_for(&file_path),
                        bpm: matched.bpm,
                    })
                })
                .collect();
            playlists.push(ExportPlaylist {
                name: summary.playlist.name,
                tracks,
            });
        }
        Ok(playlists)
    }

    pub async fn export(&self, library_path: &str) -> Result<MergeSummary, ExportError> {
        let library_path = library_path.trim();
        if library_path.is_empty() {
            return Err(ExportError::MissingPath);
        }
        match classify_target(library_path) {
            ExportTarget::Xml => {}
            ExportTarget::Database => return Err(ExportError::NotYetSupported),
            ExportTarget::Unsupported => {
                return Err(ExportError::UnsupportedExtension(library_path.to_string()))
            }
        }

        let path = PathBuf::from(library_path);
        if !tokio::fs::try_exists(&path).await? {
            return Err(ExportError::NotFound(library_path.to_string()));
        }

        let playlists = self.snapshot()?;
        let folder_name = self.folder_name.clone();
        let summary = tokio::task::spawn_blocking(move || {
            merge_file(&path, &playlists, &folder_name)
        })
        .await
        .map_err(|e| ExportError::Task(e.to_string()))??;

        info!(
            "Exported {} playlists and {} tracks to {}",
            summary.added_playlists, summary.added_tracks, library_path
        );
        Ok(summary)
    }
}

fn merge_file(
    path: &Path,
    playlists: &[ExportPlaylist],
    folder_name: &str,
) -> Result<MergeSummary, ExportError> {
    let original = std::fs::read_to_string(path)?;
    let (merged, summary) = merge_library(&original, playlists, folder_name)?;
    if summary.added_playlists == 0 {
        debug!("{:?} already up to date", path);
        return Ok(summary);
    }

    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let permissions = std::fs::metadata(path)?.permissions();
    let mut tmp = NamedTempFile::new_in(dir)
        .with_context(|| format!("failed to create temporary file in {:?}", dir))?;
    tmp.write_all(merged.as_bytes())?;
    tmp.as_file().sync_all()?;
    std::fs::set_permissions(tmp.path(), permissions)?;
    tmp.persist(path).map_err(|e| ExportError::Io(e.error))?;
    Ok(summary)
}

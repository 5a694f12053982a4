//! On-disk layout of the download root.
//!
//! ```text
//! <root>/<artist> - <title>.mp3             canonical copy
//! <root>/<playlist>/<artist> - <title>.mp3  playlist copies
//! <root>/.partial/                          in-flight downloads
//! ```

mod fs_ops;

pub use fs_ops::{copy_file, ensure_dir, remove_dir_all, remove_file, set_mode, DIR_MODE, FILE_MODE};

use crate::track_store::MatchedTrack;
use std::path::{Path, PathBuf};

const PARTIAL_DIR_NAME: &str = ".partial";
pub const AUDIO_EXTENSION: &str = "mp3";

/// Replace characters that are unsafe in a single path component and trim
/// leading/trailing dots and whitespace. May return an empty string.
pub fn sanitize_component(raw: &str) -> String {
    let replaced: String = raw
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    replaced
        .trim_matches(|c: char| c == '.' || c.is_whitespace())
        .to_string()
}

/// Directory name of a playlist under the download root. Distinct playlist
/// names can share a folder name ("A/B" and "A_B"), so the store refuses a
/// name whose folder is already owned by another playlist.
pub fn playlist_folder_name(playlist_name: &str) -> String {
    let clean = sanitize_component(playlist_name);
    if clean.is_empty() {
        "_".to_string()
    } else {
        clean
    }
}

/// `<artist> - <title>.mp3`. A part that sanitizes to nothing is replaced by `fallback`.
pub fn track_file_name(artist: &str, title: &str, fallback: &str) -> String {
    let pick = |raw: &str| {
        let clean = sanitize_component(raw);
        if clean.is_empty() {
            let fallback = sanitize_component(fallback);
            if fallback.is_empty() {
                "_".to_string()
            } else {
                fallback
            }
        } else {
            clean
        }
    };
    format!("{} - {}.{}", pick(artist), pick(title), AUDIO_EXTENSION)
}

#[derive(Debug, Clone)]
pub struct LibraryPaths {
    root: PathBuf,
}

impl LibraryPaths {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn partial_dir(&self) -> PathBuf {
        self.root.join(PARTIAL_DIR_NAME)
    }

    /// `<root>/<artist> - <title>.mp3`, sanitized.
    pub fn track_path(&self, artist: &str, title: &str, fallback: &str) -> PathBuf {
        self.root.join(track_file_name(artist, title, fallback))
    }

    /// Where a fresh download of `matched` is finalized.
    pub fn derived_canonical_path(&self, matched: &MatchedTrack) -> PathBuf {
        self.track_path(&matched.artist, &matched.title, &matched.external_id)
    }

    /// The recorded file path when there is one, otherwise the derived path.
    pub fn canonical_path(&self, matched: &MatchedTrack) -> PathBuf {
        matched
            .file_path
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| self.derived_canonical_path(matched))
    }

    pub fn playlist_dir(&self, playlist_name: &str) -> PathBuf {
        self.root.join(playlist_folder_name(playlist_name))
    }

    /// The playlist copy keeps the canonical file name.
    pub fn playlist_copy_path(&self, playlist_name: &str, matched: &MatchedTrack) -> PathBuf {
        let canonical = self.canonical_path(matched);
        let file_name = canonical
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_else(|| {
                track_file_name(&matched.artist, &matched.title, &matched.external_id).into()
            });
        self.playlist_dir(playlist_name).join(file_name)
    }
}

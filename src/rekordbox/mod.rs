//! Export of playlists into a Rekordbox library document.
//!
//! Only the XML library format is written. New nodes are spliced into the
//! original text so everything the merge does not touch stays byte-identical.

mod exporter;
mod merge;

pub use exporter::{classify_target, file_location, ExportTarget, RekordboxExporter};
pub use merge::{merge_library, ExportPlaylist, ExportTrack, MergeSummary, DEFAULT_FOLDER_NAME};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("library path is required")]
    MissingPath,

    #[error("file not found: {0}")]
    NotFound(String),

    #[error("unsupported file format, expected rekordbox.xml or master.db: {0}")]
    UnsupportedExtension(String),

    #[error("master.db export is not yet supported, export the collection as XML instead")]
    NotYetSupported,

    #[error("invalid Rekordbox XML: {0}")]
    InvalidDocument(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("export task failed: {0}")]
    Task(String),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

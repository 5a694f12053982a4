//! Cratedigger Server Library
//!
//! Exposes the internal modules for the binary and the end-to-end tests.

pub mod analysis;
pub mod catalog;
pub mod config;
pub mod download_manager;
pub mod library;
pub mod match_search;
pub mod playlist;
pub mod rekordbox;
pub mod server;
pub mod sqlite_persistence;
pub mod track_store;

// Re-export commonly used types for convenience
pub use server::{make_app, run_server, RequestsLoggingLevel, ServerConfig, ServerState};
pub use track_store::{SqliteTrackStore, TrackStore};

//! Shared constants for end-to-end tests
//!
//! Catalog fixtures, search candidates and timing knobs used across the suite.

// ============================================================================
// Catalog fixtures
// ============================================================================

/// Source playlist the fake catalog serves.
pub const SOURCE_PLAYLIST_ID: &str = "source-playlist";

/// Oldest track in the source playlist.
pub const TRACK_1_ID: &str = "track-1";
pub const TRACK_1_TITLE: &str = "Opening Track";
pub const TRACK_1_ARTIST: &str = "The Test Band";

pub const TRACK_2_ID: &str = "track-2";
pub const TRACK_2_TITLE: &str = "Second Song";
pub const TRACK_2_ARTIST: &str = "Jazz Ensemble";

/// Newest track in the source playlist.
pub const TRACK_3_ID: &str = "track-3";
pub const TRACK_3_TITLE: &str = "Closing Track";
pub const TRACK_3_ARTIST: &str = "The Test Band";

/// Known to the catalog but not part of the source playlist.
pub const ORPHAN_TRACK_ID: &str = "track-orphan";
pub const ORPHAN_TRACK_TITLE: &str = "Removed Song";
pub const ORPHAN_TRACK_ARTIST: &str = "Gone Artist";

/// `added_at` of the oldest playlist entry; each later entry is one day newer.
pub const PLAYLIST_START_TIMESTAMP: i64 = 1_700_000_000;

// ============================================================================
// Search and download fixtures
// ============================================================================

/// Searches for this title (track 2) always run out of attempts.
pub const UNSEARCHABLE_TITLE: &str = "Second Song";

/// Prefix of the fake search service's track ids.
pub const MATCH_ID_PREFIX: &str = "sc-";

pub const MATCH_URL_BASE: &str = "https://soundcloud.test";

/// Tempo and key reported by the fake analyzer.
pub const ANALYZED_BPM: f64 = 124.0;
pub const ANALYZED_KEY: &str = "8A";

/// Bytes served by the fake fetcher.
pub const FAKE_AUDIO: &[u8] = b"ID3 fake audio payload used by the e2e suite";

// ============================================================================
// Timing
// ============================================================================

pub const SERVER_READY_TIMEOUT_MS: u64 = 5_000;
pub const SERVER_READY_POLL_INTERVAL_MS: u64 = 10;
pub const REQUEST_TIMEOUT_SECS: u64 = 10;
pub const DOWNLOAD_SETTLE_TIMEOUT_MS: u64 = 5_000;

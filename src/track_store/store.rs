//! Track store storage and persistence.
//!
//! Holds primary tracks, their matches, playlists and playlist memberships.
//! Every public operation runs under the connection mutex, so a job's progress
//! write and a poller's read never interleave.

use super::models::*;
use super::schema::TRACK_STORE_VERSIONED_SCHEMAS;
use crate::library::playlist_folder_name;
use crate::sqlite_persistence::open_versioned_db;
use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex};

const PRIMARY_COLUMNS: &str = "p.id, p.external_id, p.title, p.artist, p.artwork_url, \
     p.added_at, p.is_saved, p.saved_at, p.in_playlist";
const PRIMARY_COLUMN_COUNT: usize = 9;

const MATCHED_COLUMNS: &str = "m.id, m.primary_id, m.external_id, m.title, m.artist, \
     m.artwork_url, m.duration_ms, m.url, m.stream_url, m.file_path, m.download_status, \
     m.download_progress, m.bpm, m.musical_key, m.job_generation, m.created_at";

/// Trait for track store operations.
pub trait TrackStore: Send + Sync {
    // === Primary tracks ===

    /// Insert a primary track, or refresh title/artist/artwork of an existing one.
    /// `added_at` and the triage flags of an existing row are kept.
    fn upsert_primary(&self, track: NewPrimaryTrack) -> Result<PrimaryTrack>;

    fn get_primary(&self, external_id: &str) -> Result<Option<PrimaryTrack>>;

    /// Delete a primary track. Its match and memberships cascade.
    fn delete_primary(&self, external_id: &str) -> Result<bool>;

    /// True when the track is known and has no confirmed match yet.
    fn is_untriaged(&self, external_id: &str) -> Result<bool>;

    /// Untriaged tracks, most recently added first.
    fn list_untriaged(&self, limit: usize) -> Result<Vec<PrimaryTrack>>;

    /// Saved tracks, most recently saved first, with the total matching count.
    fn list_saved(
        &self,
        exclude_in_playlist: bool,
        limit: usize,
        offset: usize,
    ) -> Result<(Vec<SavedTrack>, usize)>;

    fn stats(&self) -> Result<StoreStats>;

    // === Matches ===

    /// Insert or overwrite the match of a primary track and reset its download state.
    fn save_match(&self, primary_external_id: &str, new_match: NewMatch)
        -> Result<SaveMatchOutcome>;

    fn get_match(&self, primary_external_id: &str) -> Result<Option<MatchedTrack>>;

    fn get_match_by_id(&self, match_id: i64) -> Result<Option<MatchedTrack>>;

    /// `None` when the primary track is unknown.
    fn get_download_state(&self, primary_external_id: &str) -> Result<Option<DownloadState>>;

    /// Remove the match and every membership of the track, then reset its flags.
    /// `None` when the primary track is unknown. A track without a match is
    /// left untouched and reported with `matched: None`.
    fn delete_match(&self, primary_external_id: &str) -> Result<Option<MatchTeardown>>;

    /// Atomically move a failed match back to pending under a new job generation.
    fn claim_retry(&self, primary_external_id: &str) -> Result<RetryClaim>;

    /// Apply a job write. Returns false when the match is gone or was superseded
    /// by a newer job generation.
    fn update_download(&self, match_id: i64, generation: i64, update: DownloadUpdate)
        -> Result<bool>;

    // === Playlists ===

    fn create_playlist(&self, name: &str, description: Option<&str>)
        -> Result<CreatePlaylistOutcome>;

    fn get_playlist(&self, playlist_id: i64) -> Result<Option<Playlist>>;

    /// All playlists ordered by name.
    fn list_playlists(&self) -> Result<Vec<PlaylistSummary>>;

    /// Delete a playlist and clear `in_playlist` on its members.
    fn delete_playlist(&self, playlist_id: i64) -> Result<Option<PlaylistTeardown>>;

    fn add_membership(&self, playlist_id: i64, primary_external_id: &str)
        -> Result<AddMembershipOutcome>;

    fn remove_membership(&self, playlist_id: i64, primary_external_id: &str)
        -> Result<RemoveMembershipOutcome>;

    /// Memberships of a playlist in position order.
    fn list_playlist_entries(&self, playlist_id: i64) -> Result<Vec<PlaylistEntry>>;
}

/// SQLite-backed track store.
pub struct SqliteTrackStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteTrackStore {
    /// Opens an existing database or creates a new one with the current schema.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = open_versioned_db(db_path, TRACK_STORE_VERSIONED_SCHEMAS, "track")?;
        Ok(SqliteTrackStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute("PRAGMA foreign_keys = ON;", [])?;
        TRACK_STORE_VERSIONED_SCHEMAS
            .last()
            .context("No schemas defined")?
            .create(&conn)?;

        Ok(SqliteTrackStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn row_to_primary(row: &Row, base: usize) -> rusqlite::Result<PrimaryTrack> {
        Ok(PrimaryTrack {
            id: row.get(base)?,
            external_id: row.get(base + 1)?,
            title: row.get(base + 2)?,
            artist: row.get(base + 3)?,
            artwork_url: row.get(base + 4)?,
            added_at: row.get(base + 5)?,
            is_saved: row.get::<_, i64>(base + 6)? != 0,
            saved_at: row.get(base + 7)?,
            in_playlist: row.get::<_, i64>(base + 8)? != 0,
        })
    }

    fn row_to_matched(row: &Row, base: usize) -> rusqlite::Result<MatchedTrack> {
        let status: String = row.get(base + 10)?;
        let download_status = DownloadStatus::from_db_str(&status).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                base + 10,
                rusqlite::types::Type::Text,
                format!("unknown download status '{}'", status).into(),
            )
        })?;
        Ok(MatchedTrack {
            id: row.get(base)?,
            primary_id: row.get(base + 1)?,
            external_id: row.get(base + 2)?,
            title: row.get(base + 3)?,
            artist: row.get(base + 4)?,
            artwork_url: row.get(base + 5)?,
            duration_ms: row.get(base + 6)?,
            url: row.get(base + 7)?,
            stream_url: row.get(base + 8)?,
            file_path: row.get(base + 9)?,
            download_status,
            download_progress: row.get::<_, i64>(base + 11)?.clamp(0, 100) as u8,
            bpm: row.get(base + 12)?,
            musical_key: row.get(base + 13)?,
            job_generation: row.get(base + 14)?,
            created_at: row.get(base + 15)?,
        })
    }

    /// Maps the matched-track columns of a LEFT JOIN, which are all NULL on a miss.
    fn row_to_optional_matched(row: &Row, base: usize) -> rusqlite::Result<Option<MatchedTrack>> {
        match row.get::<_, Option<i64>>(base)? {
            Some(_) => Self::row_to_matched(row, base).map(Some),
            None => Ok(None),
        }
    }

    fn query_primary(conn: &Connection, external_id: &str) -> Result<Option<PrimaryTrack>> {
        let track = conn
            .query_row(
                &format!(
                    "SELECT {} FROM primary_tracks p WHERE p.external_id = ?1",
                    PRIMARY_COLUMNS
                ),
                [external_id],
                |row| Self::row_to_primary(row, 0),
            )
            .optional()?;
        Ok(track)
    }

    fn query_match_for_primary(conn: &Connection, primary_id: i64) -> Result<Option<MatchedTrack>> {
        let matched = conn
            .query_row(
                &format!(
                    "SELECT {} FROM matched_tracks m WHERE m.primary_id = ?1",
                    MATCHED_COLUMNS
                ),
                [primary_id],
                |row| Self::row_to_matched(row, 0),
            )
            .optional()?;
        Ok(matched)
    }

    fn query_playlist(conn: &Connection, playlist_id: i64) -> Result<Option<Playlist>> {
        let playlist = conn
            .query_row(
                "SELECT id, name, description, created_at FROM playlists WHERE id = ?1",
                [playlist_id],
                |row| {
                    Ok(Playlist {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        description: row.get(2)?,
                        created_at: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(playlist)
    }

    /// Close the gaps in a playlist's positions, keeping relative order.
    fn renumber_positions(conn: &Connection, playlist_id: i64) -> Result<()> {
        let rows: Vec<(i64, i64)> = conn
            .prepare(
                "SELECT id, position FROM playlist_memberships
                 WHERE playlist_id = ?1 ORDER BY position ASC, id ASC",
            )?
            .query_map([playlist_id], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<_>>()?;

        for (index, (id, position)) in rows.into_iter().enumerate() {
            if position != index as i64 {
                conn.execute(
                    "UPDATE playlist_memberships SET position = ?1 WHERE id = ?2",
                    params![index as i64, id],
                )?;
            }
        }
        Ok(())
    }

    fn count(conn: &Connection, sql: &str) -> Result<usize> {
        let count: i64 = conn.query_row(sql, [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn now() -> i64 {
        chrono::Utc::now().timestamp()
    }
}

impl TrackStore for SqliteTrackStore {
    // === Primary tracks ===

    fn upsert_primary(&self, track: NewPrimaryTrack) -> Result<PrimaryTrack> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO primary_tracks (external_id, title, artist, artwork_url, added_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(external_id) DO UPDATE SET
                title = excluded.title,
                artist = excluded.artist,
                artwork_url = excluded.artwork_url",
            params![
                track.external_id,
                track.title,
                track.artist,
                track.artwork_url,
                track.added_at
            ],
        )?;
        Self::query_primary(&conn, &track.external_id)?
            .context("primary track vanished right after upsert")
    }

    fn get_primary(&self, external_id: &str) -> Result<Option<PrimaryTrack>> {
        let conn = self.conn.lock().unwrap();
        Self::query_primary(&conn, external_id)
    }

    fn delete_primary(&self, external_id: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute(
            "DELETE FROM primary_tracks WHERE external_id = ?1",
            [external_id],
        )?;
        Ok(deleted > 0)
    }

    fn is_untriaged(&self, external_id: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let found = conn
            .prepare("SELECT 1 FROM primary_tracks WHERE external_id = ?1 AND is_saved = 0")?
            .exists([external_id])?;
        Ok(found)
    }

    fn list_untriaged(&self, limit: usize) -> Result<Vec<PrimaryTrack>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM primary_tracks p WHERE p.is_saved = 0
             ORDER BY p.added_at DESC, p.id DESC LIMIT ?1",
            PRIMARY_COLUMNS
        ))?;
        let tracks = stmt
            .query_map([limit as i64], |row| Self::row_to_primary(row, 0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tracks)
    }

    fn list_saved(
        &self,
        exclude_in_playlist: bool,
        limit: usize,
        offset: usize,
    ) -> Result<(Vec<SavedTrack>, usize)> {
        let conn = self.conn.lock().unwrap();
        let filter = if exclude_in_playlist {
            "p.is_saved = 1 AND p.in_playlist = 0"
        } else {
            "p.is_saved = 1"
        };

        let total = Self::count(
            &conn,
            &format!("SELECT COUNT(*) FROM primary_tracks p WHERE {}", filter),
        )?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {}, m.bpm, m.musical_key, m.download_status
             FROM primary_tracks p
             LEFT JOIN matched_tracks m ON m.primary_id = p.id
             WHERE {}
             ORDER BY p.saved_at DESC, p.id DESC
             LIMIT ?1 OFFSET ?2",
            PRIMARY_COLUMNS, filter
        ))?;
        let tracks = stmt
            .query_map(params![limit as i64, offset as i64], |row| {
                let status: Option<String> = row.get(PRIMARY_COLUMN_COUNT + 2)?;
                Ok(SavedTrack {
                    track: Self::row_to_primary(row, 0)?,
                    bpm: row.get(PRIMARY_COLUMN_COUNT)?,
                    key: row.get(PRIMARY_COLUMN_COUNT + 1)?,
                    download_status: status.as_deref().and_then(DownloadStatus::from_db_str),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok((tracks, total))
    }

    fn stats(&self) -> Result<StoreStats> {
        let conn = self.conn.lock().unwrap();
        Ok(StoreStats {
            primary_tracks: Self::count(&conn, "SELECT COUNT(*) FROM primary_tracks")?,
            saved_tracks: Self::count(
                &conn,
                "SELECT COUNT(*) FROM primary_tracks WHERE is_saved = 1",
            )?,
            playlists: Self::count(&conn, "SELECT COUNT(*) FROM playlists")?,
            downloads_active: Self::count(
                &conn,
                "SELECT COUNT(*) FROM matched_tracks
                 WHERE download_status IN ('pending', 'downloading', 'analyzing')",
            )?,
            downloads_completed: Self::count(
                &conn,
                "SELECT COUNT(*) FROM matched_tracks WHERE download_status = 'completed'",
            )?,
            downloads_failed: Self::count(
                &conn,
                "SELECT COUNT(*) FROM matched_tracks WHERE download_status = 'failed'",
            )?,
        })
    }

    // === Matches ===

    fn save_match(
        &self,
        primary_external_id: &str,
        new_match: NewMatch,
    ) -> Result<SaveMatchOutcome> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let Some(primary) = Self::query_primary(&tx, primary_external_id)? else {
            return Ok(SaveMatchOutcome::TrackNotFound);
        };

        let holder: Option<i64> = tx
            .query_row(
                "SELECT primary_id FROM matched_tracks WHERE external_id = ?1",
                [&new_match.external_id],
                |row| row.get(0),
            )
            .optional()?;
        if holder.is_some_and(|holder| holder != primary.id) {
            return Ok(SaveMatchOutcome::MatchTaken);
        }

        tx.execute(
            "INSERT INTO matched_tracks (
                primary_id, external_id, title, artist, artwork_url, duration_ms,
                url, stream_url, download_status, download_progress, job_generation
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 'pending', 0, 1)
             ON CONFLICT(primary_id) DO UPDATE SET
                external_id = excluded.external_id,
                title = excluded.title,
                artist = excluded.artist,
                artwork_url = excluded.artwork_url,
                duration_ms = excluded.duration_ms,
                url = excluded.url,
                stream_url = excluded.stream_url,
                file_path = NULL,
                download_status = 'pending',
                download_progress = 0,
                bpm = NULL,
                musical_key = NULL,
                job_generation = matched_tracks.job_generation + 1",
            params![
                primary.id,
                new_match.external_id,
                new_match.title,
                new_match.artist,
                new_match.artwork_url,
                new_match.duration_ms,
                new_match.url,
                new_match.stream_url,
            ],
        )?;

        tx.execute(
            "UPDATE primary_tracks SET is_saved = 1, saved_at = ?1 WHERE id = ?2",
            params![Self::now(), primary.id],
        )?;

        let matched = Self::query_match_for_primary(&tx, primary.id)?
            .context("matched track vanished right after save")?;
        tx.commit()?;
        Ok(SaveMatchOutcome::Saved(matched))
    }

    fn get_match(&self, primary_external_id: &str) -> Result<Option<MatchedTrack>> {
        let conn = self.conn.lock().unwrap();
        let matched = conn
            .query_row(
                &format!(
                    "SELECT {} FROM matched_tracks m
                     JOIN primary_tracks p ON p.id = m.primary_id
                     WHERE p.external_id = ?1",
                    MATCHED_COLUMNS
                ),
                [primary_external_id],
                |row| Self::row_to_matched(row, 0),
            )
            .optional()?;
        Ok(matched)
    }

    fn get_match_by_id(&self, match_id: i64) -> Result<Option<MatchedTrack>> {
        let conn = self.conn.lock().unwrap();
        let matched = conn
            .query_row(
                &format!(
                    "SELECT {} FROM matched_tracks m WHERE m.id = ?1",
                    MATCHED_COLUMNS
                ),
                [match_id],
                |row| Self::row_to_matched(row, 0),
            )
            .optional()?;
        Ok(matched)
    }

    fn get_download_state(&self, primary_external_id: &str) -> Result<Option<DownloadState>> {
        let conn = self.conn.lock().unwrap();
        let Some(primary) = Self::query_primary(&conn, primary_external_id)? else {
            return Ok(None);
        };
        let state = match Self::query_match_for_primary(&conn, primary.id)? {
            Some(matched) => DownloadState::Matched(matched),
            None => DownloadState::NoMatch,
        };
        Ok(Some(state))
    }

    fn delete_match(&self, primary_external_id: &str) -> Result<Option<MatchTeardown>> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let Some(primary) = Self::query_primary(&tx, primary_external_id)? else {
            return Ok(None);
        };
        let Some(matched) = Self::query_match_for_primary(&tx, primary.id)? else {
            return Ok(Some(MatchTeardown {
                matched: None,
                playlist_names: Vec::new(),
            }));
        };

        let playlists: Vec<(i64, String)> = tx
            .prepare(
                "SELECT pl.id, pl.name FROM playlist_memberships pm
                 JOIN playlists pl ON pl.id = pm.playlist_id
                 WHERE pm.primary_id = ?1
                 ORDER BY pl.name",
            )?
            .query_map([primary.id], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<_>>()?;

        tx.execute(
            "DELETE FROM matched_tracks WHERE primary_id = ?1",
            [primary.id],
        )?;
        tx.execute(
            "DELETE FROM playlist_memberships WHERE primary_id = ?1",
            [primary.id],
        )?;
        for (playlist_id, _) in &playlists {
            Self::renumber_positions(&tx, *playlist_id)?;
        }
        tx.execute(
            "UPDATE primary_tracks SET is_saved = 0, saved_at = NULL, in_playlist = 0
             WHERE id = ?1",
            [primary.id],
        )?;
        tx.commit()?;

        Ok(Some(MatchTeardown {
            matched: Some(matched),
            playlist_names: playlists.into_iter().map(|(_, name)| name).collect(),
        }))
    }

    fn claim_retry(&self, primary_external_id: &str) -> Result<RetryClaim> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let Some(primary) = Self::query_primary(&tx, primary_external_id)? else {
            return Ok(RetryClaim::TrackNotFound);
        };
        let Some(current) = Self::query_match_for_primary(&tx, primary.id)? else {
            return Ok(RetryClaim::NoMatch);
        };

        let claimed = tx.execute(
            "UPDATE matched_tracks SET
                download_status = 'pending',
                download_progress = 0,
                file_path = NULL,
                bpm = NULL,
                musical_key = NULL,
                job_generation = job_generation + 1
             WHERE id = ?1 AND download_status = 'failed'",
            [current.id],
        )?;
        if claimed == 0 {
            return Ok(RetryClaim::NotFailed(current.download_status));
        }

        let matched = Self::query_match_for_primary(&tx, primary.id)?
            .context("matched track vanished right after retry claim")?;
        tx.commit()?;
        Ok(RetryClaim::Claimed(matched))
    }

    fn update_download(
        &self,
        match_id: i64,
        generation: i64,
        update: DownloadUpdate,
    ) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE matched_tracks SET
                download_status = COALESCE(?1, download_status),
                download_progress = COALESCE(?2, download_progress),
                file_path = COALESCE(?3, file_path),
                bpm = COALESCE(?4, bpm),
                musical_key = COALESCE(?5, musical_key)
             WHERE id = ?6 AND job_generation = ?7",
            params![
                update.status.map(|s| s.as_db_str()),
                update.progress.map(i64::from),
                update.file_path,
                update.bpm,
                update.musical_key,
                match_id,
                generation,
            ],
        )?;
        Ok(changed > 0)
    }

    // === Playlists ===

    fn create_playlist(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> Result<CreatePlaylistOutcome> {
        let conn = self.conn.lock().unwrap();
        let existing: Vec<String> = conn
            .prepare("SELECT name FROM playlists")?
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<_>>()?;
        if existing.iter().any(|other| other == name) {
            return Ok(CreatePlaylistOutcome::NameTaken);
        }
        let folder = playlist_folder_name(name);
        if let Some(owner) = existing
            .into_iter()
            .find(|other| playlist_folder_name(other) == folder)
        {
            return Ok(CreatePlaylistOutcome::FolderTaken(owner));
        }

        conn.execute(
            "INSERT INTO playlists (name, description, created_at) VALUES (?1, ?2, ?3)",
            params![name, description, Self::now()],
        )?;
        let playlist = Self::query_playlist(&conn, conn.last_insert_rowid())?
            .context("playlist vanished right after insert")?;
        Ok(CreatePlaylistOutcome::Created(playlist))
    }

    fn get_playlist(&self, playlist_id: i64) -> Result<Option<Playlist>> {
        let conn = self.conn.lock().unwrap();
        Self::query_playlist(&conn, playlist_id)
    }

    fn list_playlists(&self) -> Result<Vec<PlaylistSummary>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT pl.id, pl.name, pl.description, pl.created_at, COUNT(pm.id)
             FROM playlists pl
             LEFT JOIN playlist_memberships pm ON pm.playlist_id = pl.id
             GROUP BY pl.id
             ORDER BY pl.name",
        )?;
        let playlists = stmt
            .query_map([], |row| {
                Ok(PlaylistSummary {
                    playlist: Playlist {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        description: row.get(2)?,
                        created_at: row.get(3)?,
                    },
                    track_count: row.get::<_, i64>(4)? as usize,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(playlists)
    }

    fn delete_playlist(&self, playlist_id: i64) -> Result<Option<PlaylistTeardown>> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let Some(playlist) = Self::query_playlist(&tx, playlist_id)? else {
            return Ok(None);
        };

        let member_matches: Vec<MatchedTrack> = tx
            .prepare(&format!(
                "SELECT {} FROM playlist_memberships pm
                 JOIN matched_tracks m ON m.primary_id = pm.primary_id
                 WHERE pm.playlist_id = ?1
                 ORDER BY pm.position",
                MATCHED_COLUMNS
            ))?
            .query_map([playlist_id], |row| Self::row_to_matched(row, 0))?
            .collect::<rusqlite::Result<_>>()?;

        tx.execute(
            "UPDATE primary_tracks SET in_playlist = 0
             WHERE id IN (SELECT primary_id FROM playlist_memberships WHERE playlist_id = ?1)",
            [playlist_id],
        )?;
        tx.execute("DELETE FROM playlists WHERE id = ?1", [playlist_id])?;
        tx.commit()?;

        Ok(Some(PlaylistTeardown {
            playlist,
            member_matches,
        }))
    }

    fn add_membership(
        &self,
        playlist_id: i64,
        primary_external_id: &str,
    ) -> Result<AddMembershipOutcome> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let Some(playlist) = Self::query_playlist(&tx, playlist_id)? else {
            return Ok(AddMembershipOutcome::PlaylistNotFound);
        };
        let Some(primary) = Self::query_primary(&tx, primary_external_id)? else {
            return Ok(AddMembershipOutcome::TrackNotFound);
        };
        if primary.in_playlist {
            return Ok(AddMembershipOutcome::AlreadyInPlaylist);
        }
        let duplicate = tx
            .prepare(
                "SELECT 1 FROM playlist_memberships WHERE playlist_id = ?1 AND primary_id = ?2",
            )?
            .exists(params![playlist_id, primary.id])?;
        if duplicate {
            return Ok(AddMembershipOutcome::DuplicateMembership);
        }

        let position: i64 = tx.query_row(
            "SELECT COUNT(*) FROM playlist_memberships WHERE playlist_id = ?1",
            [playlist_id],
            |row| row.get(0),
        )?;
        tx.execute(
            "INSERT INTO playlist_memberships (playlist_id, primary_id, position, added_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![playlist_id, primary.id, position, Self::now()],
        )?;
        tx.execute(
            "UPDATE primary_tracks SET in_playlist = 1 WHERE id = ?1",
            [primary.id],
        )?;
        let matched = Self::query_match_for_primary(&tx, primary.id)?;
        tx.commit()?;

        Ok(AddMembershipOutcome::Added {
            playlist,
            position: position as usize,
            matched,
        })
    }

    fn remove_membership(
        &self,
        playlist_id: i64,
        primary_external_id: &str,
    ) -> Result<RemoveMembershipOutcome> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let Some(playlist) = Self::query_playlist(&tx, playlist_id)? else {
            return Ok(RemoveMembershipOutcome::PlaylistNotFound);
        };
        let Some(primary) = Self::query_primary(&tx, primary_external_id)? else {
            return Ok(RemoveMembershipOutcome::TrackNotFound);
        };

        let removed = tx.execute(
            "DELETE FROM playlist_memberships WHERE playlist_id = ?1 AND primary_id = ?2",
            params![playlist_id, primary.id],
        )?;
        if removed == 0 {
            return Ok(RemoveMembershipOutcome::NotMember);
        }

        tx.execute(
            "UPDATE primary_tracks SET in_playlist = 0 WHERE id = ?1",
            [primary.id],
        )?;
        Self::renumber_positions(&tx, playlist_id)?;
        let matched = Self::query_match_for_primary(&tx, primary.id)?;
        tx.commit()?;

        Ok(RemoveMembershipOutcome::Removed { playlist, matched })
    }

    fn list_playlist_entries(&self, playlist_id: i64) -> Result<Vec<PlaylistEntry>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT pm.position, pm.added_at, {}, {}
             FROM playlist_memberships pm
             JOIN primary_tracks p ON p.id = pm.primary_id
             LEFT JOIN matched_tracks m ON m.primary_id = p.id
             WHERE pm.playlist_id = ?1
             ORDER BY pm.position",
            PRIMARY_COLUMNS, MATCHED_COLUMNS
        ))?;
        let entries = stmt
            .query_map([playlist_id], |row| {
                Ok(PlaylistEntry {
                    position: row.get::<_, i64>(0)? as usize,
                    added_at: row.get(1)?,
                    track: Self::row_to_primary(row, 2)?,
                    matched: Self::row_to_optional_matched(row, 2 + PRIMARY_COLUMN_COUNT)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }
}

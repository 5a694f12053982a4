//! Database schema for cratedigger.db.

use crate::sqlite_column;
use crate::sqlite_persistence::{
    Column, ForeignKey, ForeignKeyOnChange, SqlType, Table, VersionedSchema, DEFAULT_TIMESTAMP,
};
use anyhow::Result;
use rusqlite::Connection;

// =============================================================================
// Version 0
// =============================================================================

const PRIMARY_TRACKS_TABLE_V0: Table = Table {
    name: "primary_tracks",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("external_id", &SqlType::Text, non_null = true, is_unique = true),
        sqlite_column!("title", &SqlType::Text, non_null = true),
        sqlite_column!("artist", &SqlType::Text, non_null = true),
        sqlite_column!("artwork_url", &SqlType::Text),
        sqlite_column!("added_at", &SqlType::Integer, non_null = true),
        sqlite_column!(
            "is_saved",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!("saved_at", &SqlType::Integer),
        sqlite_column!(
            "in_playlist",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
    ],
    indices: &[
        ("idx_primary_saved", "is_saved, saved_at"),
        ("idx_primary_added", "added_at"),
    ],
    unique_constraints: &[],
};

const MATCHED_TRACKS_TABLE_V0: Table = Table {
    name: "matched_tracks",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!(
            "primary_id",
            &SqlType::Integer,
            non_null = true,
            is_unique = true,
            foreign_key = Some(&ForeignKey {
                foreign_table: "primary_tracks",
                foreign_column: "id",
                on_delete: ForeignKeyOnChange::Cascade,
            })
        ),
        sqlite_column!("external_id", &SqlType::Text, non_null = true, is_unique = true),
        sqlite_column!("title", &SqlType::Text, non_null = true),
        sqlite_column!("artist", &SqlType::Text, non_null = true),
        sqlite_column!("artwork_url", &SqlType::Text),
        sqlite_column!(
            "duration_ms",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!("url", &SqlType::Text, non_null = true),
        sqlite_column!("stream_url", &SqlType::Text),
        sqlite_column!("file_path", &SqlType::Text),
        sqlite_column!(
            "download_status",
            &SqlType::Text,
            non_null = true,
            default_value = Some("'pending'")
        ),
        sqlite_column!(
            "download_progress",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!("bpm", &SqlType::Real),
        sqlite_column!("musical_key", &SqlType::Text),
        sqlite_column!(
            "created_at",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[("idx_matched_status", "download_status")],
    unique_constraints: &[],
};

const PLAYLISTS_TABLE_V0: Table = Table {
    name: "playlists",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("name", &SqlType::Text, non_null = true, is_unique = true),
        sqlite_column!("description", &SqlType::Text),
        sqlite_column!(
            "created_at",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[],
    unique_constraints: &[],
};

const PLAYLIST_MEMBERSHIPS_TABLE_V0: Table = Table {
    name: "playlist_memberships",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!(
            "playlist_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&ForeignKey {
                foreign_table: "playlists",
                foreign_column: "id",
                on_delete: ForeignKeyOnChange::Cascade,
            })
        ),
        sqlite_column!(
            "primary_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&ForeignKey {
                foreign_table: "primary_tracks",
                foreign_column: "id",
                on_delete: ForeignKeyOnChange::Cascade,
            })
        ),
        sqlite_column!("position", &SqlType::Integer, non_null = true),
        sqlite_column!(
            "added_at",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[
        ("idx_membership_position", "playlist_id, position"),
        ("idx_membership_primary", "primary_id"),
    ],
    unique_constraints: &[&["playlist_id", "primary_id"]],
};

// =============================================================================
// Version 1 - job generation stamp on matched tracks
// =============================================================================

const MATCHED_TRACKS_TABLE_V1: Table = Table {
    name: "matched_tracks",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!(
            "primary_id",
            &SqlType::Integer,
            non_null = true,
            is_unique = true,
            foreign_key = Some(&ForeignKey {
                foreign_table: "primary_tracks",
                foreign_column: "id",
                on_delete: ForeignKeyOnChange::Cascade,
            })
        ),
        sqlite_column!("external_id", &SqlType::Text, non_null = true, is_unique = true),
        sqlite_column!("title", &SqlType::Text, non_null = true),
        sqlite_column!("artist", &SqlType::Text, non_null = true),
        sqlite_column!("artwork_url", &SqlType::Text),
        sqlite_column!(
            "duration_ms",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!("url", &SqlType::Text, non_null = true),
        sqlite_column!("stream_url", &SqlType::Text),
        sqlite_column!("file_path", &SqlType::Text),
        sqlite_column!(
            "download_status",
            &SqlType::Text,
            non_null = true,
            default_value = Some("'pending'")
        ),
        sqlite_column!(
            "download_progress",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!("bpm", &SqlType::Real),
        sqlite_column!("musical_key", &SqlType::Text),
        sqlite_column!(
            "created_at",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
        sqlite_column!(
            "job_generation",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
    ],
    indices: &[("idx_matched_status", "download_status")],
    unique_constraints: &[],
};

fn migrate_v0_to_v1(conn: &Connection) -> Result<()> {
    conn.execute(
        "ALTER TABLE matched_tracks ADD COLUMN job_generation INTEGER NOT NULL DEFAULT 0",
        [],
    )?;
    Ok(())
}

pub const TRACK_STORE_VERSIONED_SCHEMAS: &[VersionedSchema] = &[
    VersionedSchema {
        version: 0,
        tables: &[
            PRIMARY_TRACKS_TABLE_V0,
            MATCHED_TRACKS_TABLE_V0,
            PLAYLISTS_TABLE_V0,
            PLAYLIST_MEMBERSHIPS_TABLE_V0,
        ],
        migration: None,
    },
    VersionedSchema {
        version: 1,
        tables: &[
            PRIMARY_TRACKS_TABLE_V0,
            MATCHED_TRACKS_TABLE_V1,
            PLAYLISTS_TABLE_V0,
            PLAYLIST_MEMBERSHIPS_TABLE_V0,
        ],
        migration: Some(migrate_v0_to_v1),
    },
];

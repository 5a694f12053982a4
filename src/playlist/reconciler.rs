use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info};

use crate::library::{copy_file, ensure_dir, remove_dir_all, remove_file, LibraryPaths};
use crate::track_store::{
    AddMembershipOutcome, CreatePlaylistOutcome, DownloadStatus, MatchedTrack, PlaylistTeardown,
    RemoveMembershipOutcome, TrackStore,
};

/// Result of tearing down a track's match.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchRemoval {
    Removed,
    /// The primary track exists but was never matched.
    NoMatch,
    TrackNotFound,
}

/// Applies membership mutations to the store, then mirrors them on disk.
///
/// The database write always wins: file operations are best-effort and a
/// failed copy or delete is only logged.
#[derive(Clone)]
pub struct PlaylistReconciler {
    store: Arc<dyn TrackStore>,
    paths: LibraryPaths,
}

impl PlaylistReconciler {
    pub fn new(store: Arc<dyn TrackStore>, paths: LibraryPaths) -> Self {
        Self { store, paths }
    }

    pub fn paths(&self) -> &LibraryPaths {
        &self.paths
    }

    pub async fn create_playlist(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> Result<CreatePlaylistOutcome> {
        let outcome = self.store.create_playlist(name, description)?;
        if let CreatePlaylistOutcome::Created(playlist) = &outcome {
            ensure_dir(&self.paths.playlist_dir(&playlist.name)).await;
            info!("Created playlist '{}' ({})", playlist.name, playlist.id);
        }
        Ok(outcome)
    }

    pub async fn delete_playlist(&self, playlist_id: i64) -> Result<Option<PlaylistTeardown>> {
        let teardown = self.store.delete_playlist(playlist_id)?;
        if let Some(teardown) = &teardown {
            remove_dir_all(&self.paths.playlist_dir(&teardown.playlist.name)).await;
            info!(
                "Deleted playlist '{}' with {} downloaded members",
                teardown.playlist.name,
                teardown.member_matches.len()
            );
        }
        Ok(teardown)
    }

    /// Append the track to the playlist. A completed download is copied into
    /// the playlist directory; anything else is just recorded.
    pub async fn add_track(
        &self,
        playlist_id: i64,
        track_id: &str,
    ) -> Result<AddMembershipOutcome> {
        let outcome = self.store.add_membership(playlist_id, track_id)?;
        if let AddMembershipOutcome::Added {
            playlist,
            position,
            matched,
        } = &outcome
        {
            debug!(
                "Track {} added to '{}' at position {}",
                track_id, playlist.name, position
            );
            match matched {
                Some(m) if m.download_status == DownloadStatus::Completed => {
                    self.copy_into(&playlist.name, m).await;
                }
                _ => debug!("Track {} has no finished download, nothing to copy", track_id),
            }
        }
        Ok(outcome)
    }

    pub async fn remove_track(
        &self,
        playlist_id: i64,
        track_id: &str,
    ) -> Result<RemoveMembershipOutcome> {
        let outcome = self.store.remove_membership(playlist_id, track_id)?;
        if let RemoveMembershipOutcome::Removed {
            playlist,
            matched: Some(m),
        } = &outcome
        {
            remove_file(&self.paths.playlist_copy_path(&playlist.name, m)).await;
        }
        Ok(outcome)
    }

    /// Delete the track's match along with every file it owns: the canonical
    /// download and each playlist copy.
    pub async fn delete_match(&self, track_id: &str) -> Result<MatchRemoval> {
        let Some(teardown) = self.store.delete_match(track_id)? else {
            return Ok(MatchRemoval::TrackNotFound);
        };
        let Some(matched) = teardown.matched else {
            return Ok(MatchRemoval::NoMatch);
        };

        remove_file(&self.paths.canonical_path(&matched)).await;
        for name in &teardown.playlist_names {
            remove_file(&self.paths.playlist_copy_path(name, &matched)).await;
        }
        info!(
            "Deleted match {} of track {} ({} playlists)",
            matched.external_id,
            track_id,
            teardown.playlist_names.len()
        );
        Ok(MatchRemoval::Removed)
    }

    async fn copy_into(&self, playlist_name: &str, matched: &MatchedTrack) -> bool {
        let source = self.paths.canonical_path(matched);
        let target = self.paths.playlist_copy_path(playlist_name, matched);
        copy_file(&source, &target).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track_store::{
        DownloadUpdate, NewMatch, NewPrimaryTrack, SaveMatchOutcome, SqliteTrackStore,
    };
    use std::path::PathBuf;
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
        store: Arc<dyn TrackStore>,
        reconciler: PlaylistReconciler,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let store: Arc<dyn TrackStore> = Arc::new(SqliteTrackStore::in_memory().unwrap());
        let reconciler = PlaylistReconciler::new(store.clone(), LibraryPaths::new(dir.path()));
        Fixture {
            dir,
            store,
            reconciler,
        }
    }

    impl Fixture {
        fn primary(&self, id: &str) {
            self.store
                .upsert_primary(NewPrimaryTrack {
                    external_id: id.to_string(),
                    title: format!("Song {}", id),
                    artist: "Artist".to_string(),
                    artwork_url: None,
                    added_at: 1,
                })
                .unwrap();
        }

        /// Save a match and, when `downloaded`, fake a finished download on disk.
        async fn matched(&self, id: &str, downloaded: bool) -> PathBuf {
            self.primary(id);
            let saved = self
                .store
                .save_match(
                    id,
                    NewMatch {
                        external_id: format!("sc-{}", id),
                        title: format!("Song {}", id),
                        artist: "Artist".to_string(),
                        artwork_url: None,
                        duration_ms: 1000,
                        url: format!("https://soundcloud.example/{}", id),
                        stream_url: None,
                    },
                )
                .unwrap();
            let SaveMatchOutcome::Saved(m) = saved else {
                panic!("match not saved");
            };
            let path = self.reconciler.paths().derived_canonical_path(&m);
            if downloaded {
                tokio::fs::write(&path, b"mp3").await.unwrap();
                let update = DownloadUpdate::status(DownloadStatus::Completed)
                    .with_progress(100)
                    .with_file_path(path.to_string_lossy());
                assert!(self
                    .store
                    .update_download(m.id, m.job_generation, update)
                    .unwrap());
            }
            path
        }

        async fn playlist(&self, name: &str) -> i64 {
            match self.reconciler.create_playlist(name, None).await.unwrap() {
                CreatePlaylistOutcome::Created(p) => p.id,
                other => panic!("unexpected {:?}", other),
            }
        }

        fn copy_path(&self, playlist: &str, id: &str) -> PathBuf {
            self.dir
                .path()
                .join(playlist)
                .join(format!("Artist - Song {}.mp3", id))
        }
    }

    #[tokio::test]
    async fn test_create_playlist_makes_directory() {
        let f = fixture();

        f.playlist("Peak Time").await;

        assert!(f.dir.path().join("Peak Time").is_dir());
        assert_eq!(
            f.reconciler.create_playlist("Peak Time", None).await.unwrap(),
            CreatePlaylistOutcome::NameTaken
        );
    }

    #[tokio::test]
    async fn test_add_copies_completed_download() {
        let f = fixture();
        f.matched("a", true).await;
        let playlist = f.playlist("Warmup").await;

        let outcome = f.reconciler.add_track(playlist, "a").await.unwrap();

        assert!(matches!(outcome, AddMembershipOutcome::Added { position: 0, .. }));
        assert_eq!(
            tokio::fs::read(f.copy_path("Warmup", "a")).await.unwrap(),
            b"mp3"
        );
    }

    #[tokio::test]
    async fn test_add_without_download_records_membership_only() {
        let f = fixture();
        f.matched("a", false).await;
        f.primary("b");
        let playlist = f.playlist("Warmup").await;

        assert!(matches!(
            f.reconciler.add_track(playlist, "a").await.unwrap(),
            AddMembershipOutcome::Added { position: 0, .. }
        ));
        assert!(matches!(
            f.reconciler.add_track(playlist, "b").await.unwrap(),
            AddMembershipOutcome::Added { position: 1, .. }
        ));
        assert!(!f.copy_path("Warmup", "a").exists());
    }

    #[tokio::test]
    async fn test_track_cannot_join_second_playlist() {
        let f = fixture();
        f.matched("a", true).await;
        let first = f.playlist("First").await;
        let second = f.playlist("Second").await;
        f.reconciler.add_track(first, "a").await.unwrap();

        let outcome = f.reconciler.add_track(second, "a").await.unwrap();

        assert_eq!(outcome, AddMembershipOutcome::AlreadyInPlaylist);
        assert!(!f.copy_path("Second", "a").exists());
        assert!(f.store.list_playlist_entries(second).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remove_deletes_copy_and_renumbers() {
        let f = fixture();
        for id in ["a", "b", "c"] {
            f.matched(id, true).await;
        }
        let playlist = f.playlist("Set").await;
        for id in ["a", "b", "c"] {
            f.reconciler.add_track(playlist, id).await.unwrap();
        }

        let outcome = f.reconciler.remove_track(playlist, "b").await.unwrap();

        assert!(matches!(outcome, RemoveMembershipOutcome::Removed { .. }));
        assert!(!f.copy_path("Set", "b").exists());
        assert!(f.copy_path("Set", "c").exists());
        let entries: Vec<(usize, String)> = f
            .store
            .list_playlist_entries(playlist)
            .unwrap()
            .into_iter()
            .map(|e| (e.position, e.track.external_id))
            .collect();
        assert_eq!(
            entries,
            vec![(0, "a".to_string()), (1, "c".to_string())]
        );
        assert!(!f.store.get_primary("b").unwrap().unwrap().in_playlist);
    }

    #[tokio::test]
    async fn test_remove_non_member() {
        let f = fixture();
        f.primary("a");
        let playlist = f.playlist("Set").await;

        assert_eq!(
            f.reconciler.remove_track(playlist, "a").await.unwrap(),
            RemoveMembershipOutcome::NotMember
        );
    }

    #[tokio::test]
    async fn test_delete_match_removes_every_copy() {
        let f = fixture();
        let canonical = f.matched("a", true).await;
        let playlist = f.playlist("Set").await;
        f.reconciler.add_track(playlist, "a").await.unwrap();
        assert!(f.copy_path("Set", "a").exists());

        assert_eq!(
            f.reconciler.delete_match("a").await.unwrap(),
            MatchRemoval::Removed
        );

        assert!(!canonical.exists());
        assert!(!f.copy_path("Set", "a").exists());
        let primary = f.store.get_primary("a").unwrap().unwrap();
        assert!(!primary.is_saved);
        assert!(!primary.in_playlist);
        assert!(f.store.list_playlist_entries(playlist).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_match_without_match() {
        let f = fixture();
        f.primary("a");

        assert_eq!(
            f.reconciler.delete_match("a").await.unwrap(),
            MatchRemoval::NoMatch
        );
        assert_eq!(
            f.reconciler.delete_match("missing").await.unwrap(),
            MatchRemoval::TrackNotFound
        );
    }

    #[tokio::test]
    async fn test_delete_match_without_match_keeps_memberships() {
        let f = fixture();
        f.primary("a");
        let playlist = f.playlist("Set").await;
        f.reconciler.add_track(playlist, "a").await.unwrap();

        assert_eq!(
            f.reconciler.delete_match("a").await.unwrap(),
            MatchRemoval::NoMatch
        );

        assert_eq!(f.store.list_playlist_entries(playlist).unwrap().len(), 1);
        assert!(f.store.get_primary("a").unwrap().unwrap().in_playlist);
    }

    #[tokio::test]
    async fn test_colliding_folder_name_leaves_existing_playlist_alone() {
        let f = fixture();
        f.matched("a", true).await;
        let playlist = f.playlist("A_B").await;
        f.reconciler.add_track(playlist, "a").await.unwrap();

        assert_eq!(
            f.reconciler.create_playlist("A/B", None).await.unwrap(),
            CreatePlaylistOutcome::FolderTaken("A_B".to_string())
        );

        assert_eq!(f.store.list_playlists().unwrap().len(), 1);
        assert!(f.copy_path("A_B", "a").exists());
        assert_eq!(f.store.list_playlist_entries(playlist).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_playlist_frees_members_and_directory() {
        let f = fixture();
        f.matched("a", true).await;
        let playlist = f.playlist("Set").await;
        f.reconciler.add_track(playlist, "a").await.unwrap();

        let teardown = f.reconciler.delete_playlist(playlist).await.unwrap().unwrap();

        assert_eq!(teardown.playlist.name, "Set");
        assert!(!f.dir.path().join("Set").exists());
        assert!(!f.store.get_primary("a").unwrap().unwrap().in_playlist);
        assert!(f.reconciler.delete_playlist(playlist).await.unwrap().is_none());
    }
}

use super::{
    CatalogError, CatalogSource, DISCOVERY_BATCH_SIZE, DISCOVERY_RESULT_SIZE, PRESENCE_MAX_OFFSET,
    PRESENCE_PAGE_SIZE,
};
use crate::track_store::{NewPrimaryTrack, PrimaryTrack, TrackStore};
use anyhow::Result;
use serde::Serialize;
use tracing::{debug, info};

/// Walk the source playlist from its newest end, recording tracks not seen
/// before, and return the newest untriaged tracks.
///
/// The walk stops at the first track that is already known and still untriaged:
/// everything older than it was recorded by a previous walk.
pub async fn discover_new_tracks(
    catalog: &dyn CatalogSource,
    store: &dyn TrackStore,
    playlist_id: &str,
) -> Result<Vec<PrimaryTrack>> {
    let total = catalog.fetch_playlist_tracks(playlist_id, 0, 1).await?.total;
    let mut processed = 0;
    let mut inserted = 0;

    'walk: while processed < total {
        let offset = total.saturating_sub(processed + DISCOVERY_BATCH_SIZE);
        let limit = DISCOVERY_BATCH_SIZE.min(total - processed);
        let page = catalog
            .fetch_playlist_tracks(playlist_id, offset, limit)
            .await?;

        for item in page.items.into_iter().rev() {
            let Some(track) = item.track else {
                continue;
            };
            if store.is_untriaged(&track.id)? {
                debug!("Reached already known track {}, stopping walk", track.id);
                break 'walk;
            }
            if store.get_primary(&track.id)?.is_none() {
                store.upsert_primary(NewPrimaryTrack {
                    external_id: track.id,
                    title: track.title,
                    artist: track.artist,
                    artwork_url: track.artwork_url,
                    added_at: item
                        .added_at
                        .unwrap_or_else(|| chrono::Utc::now().timestamp()),
                })?;
                inserted += 1;
            }
        }

        processed += limit;
    }

    if inserted > 0 {
        info!("Discovered {} new track(s) in playlist {}", inserted, playlist_id);
    }
    store.list_untriaged(DISCOVERY_RESULT_SIZE)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PresenceCheck {
    pub exists: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub deleted: bool,
}

/// Look for `track_id` in the source playlist. A track that is no longer there
/// is deleted from the store along with its match and memberships.
///
/// Returns `None` when the track is not in the store.
pub async fn check_track_presence(
    catalog: &dyn CatalogSource,
    store: &dyn TrackStore,
    playlist_id: &str,
    track_id: &str,
) -> Result<Option<PresenceCheck>> {
    if store.get_primary(track_id)?.is_none() {
        return Ok(None);
    }

    let mut offset = 0;
    let mut found = false;
    loop {
        let page = catalog
            .fetch_playlist_tracks(playlist_id, offset, PRESENCE_PAGE_SIZE)
            .await?;
        if page.items.is_empty() {
            break;
        }
        found = page
            .items
            .iter()
            .filter_map(|item| item.track.as_ref())
            .any(|track| track.id == track_id);
        if found {
            break;
        }
        offset += PRESENCE_PAGE_SIZE;
        if offset > PRESENCE_MAX_OFFSET {
            break;
        }
    }

    if found {
        return Ok(Some(PresenceCheck {
            exists: true,
            deleted: false,
        }));
    }

    info!(
        "Track {} is no longer in playlist {}, deleting it",
        track_id, playlist_id
    );
    let deleted = store.delete_primary(track_id)?;
    Ok(Some(PresenceCheck {
        exists: false,
        deleted,
    }))
}

/// Convenience guard used by handlers when no source playlist is configured.
pub(crate) fn require_playlist(playlist_id: Option<&str>) -> Result<&str, CatalogError> {
    playlist_id.ok_or(CatalogError::MissingPlaylist)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CatalogTrack, PlaylistItem, PlaylistPage};
    use crate::track_store::{NewMatch, SqliteTrackStore};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Playlist held oldest first, like the real service.
    struct FakeCatalog {
        tracks: Vec<(String, i64)>,
        requests: Mutex<Vec<(usize, usize)>>,
    }

    impl FakeCatalog {
        fn with_tracks(count: usize) -> Self {
            Self {
                tracks: (0..count)
                    .map(|i| (format!("t{}", i), 1_000 + i as i64))
                    .collect(),
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl CatalogSource for FakeCatalog {
        async fn fetch_access_token(&self) -> Result<String, CatalogError> {
            Ok("token".to_string())
        }

        async fn fetch_playlist_tracks(
            &self,
            _playlist_id: &str,
            offset: usize,
            limit: usize,
        ) -> Result<PlaylistPage, CatalogError> {
            self.requests.lock().unwrap().push((offset, limit));
            let items = self
                .tracks
                .iter()
                .skip(offset)
                .take(limit)
                .map(|(id, added_at)| PlaylistItem {
                    track: Some(CatalogTrack {
                        id: id.clone(),
                        title: format!("Title {}", id),
                        artist: "Artist".to_string(),
                        artwork_url: None,
                        preview_url: None,
                        duration_ms: None,
                        album_name: None,
                        release_date: None,
                    }),
                    added_at: Some(*added_at),
                })
                .collect();
            Ok(PlaylistPage {
                items,
                total: self.tracks.len(),
            })
        }

        async fn fetch_track(&self, track_id: &str) -> Result<CatalogTrack, CatalogError> {
            Err(CatalogError::NotFound(track_id.to_string()))
        }
    }

    fn new_match(id: &str) -> NewMatch {
        NewMatch {
            external_id: id.to_string(),
            title: "Song".to_string(),
            artist: "Artist".to_string(),
            artwork_url: None,
            duration_ms: 1000,
            url: "https://example.com/song".to_string(),
            stream_url: None,
        }
    }

    #[tokio::test]
    async fn test_first_walk_records_everything_and_returns_newest() {
        let catalog = FakeCatalog::with_tracks(120);
        let store = SqliteTrackStore::in_memory().unwrap();

        let tracks = discover_new_tracks(&catalog, &store, "pl").await.unwrap();

        assert_eq!(tracks.len(), DISCOVERY_RESULT_SIZE);
        assert_eq!(tracks[0].external_id, "t119");
        assert_eq!(tracks[14].external_id, "t105");
        assert!(store.get_primary("t0").unwrap().is_some());
        let requests = catalog.requests.lock().unwrap().clone();
        assert_eq!(requests, vec![(0, 1), (70, 50), (20, 50), (0, 20)]);
    }

    #[tokio::test]
    async fn test_walk_stops_at_known_untriaged_track() {
        let catalog = FakeCatalog::with_tracks(120);
        let store = SqliteTrackStore::in_memory().unwrap();
        discover_new_tracks(&catalog, &store, "pl").await.unwrap();
        catalog.requests.lock().unwrap().clear();

        discover_new_tracks(&catalog, &store, "pl").await.unwrap();

        let requests = catalog.requests.lock().unwrap().clone();
        assert_eq!(requests, vec![(0, 1), (70, 50)]);
    }

    #[tokio::test]
    async fn test_walk_skips_saved_tracks() {
        let catalog = FakeCatalog::with_tracks(3);
        let store = SqliteTrackStore::in_memory().unwrap();
        discover_new_tracks(&catalog, &store, "pl").await.unwrap();
        store.save_match("t2", new_match("m2")).unwrap();

        let tracks = discover_new_tracks(&catalog, &store, "pl").await.unwrap();

        let ids: Vec<_> = tracks.iter().map(|t| t.external_id.as_str()).collect();
        assert_eq!(ids, vec!["t1", "t0"]);
    }

    #[tokio::test]
    async fn test_empty_playlist() {
        let catalog = FakeCatalog::with_tracks(0);
        let store = SqliteTrackStore::in_memory().unwrap();
        assert!(discover_new_tracks(&catalog, &store, "pl")
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_presence_of_listed_track() {
        let catalog = FakeCatalog::with_tracks(250);
        let store = SqliteTrackStore::in_memory().unwrap();
        discover_new_tracks(&catalog, &store, "pl").await.unwrap();

        let check = check_track_presence(&catalog, &store, "pl", "t200")
            .await
            .unwrap()
            .unwrap();

        assert_eq!(
            check,
            PresenceCheck {
                exists: true,
                deleted: false
            }
        );
        let requests = catalog.requests.lock().unwrap().clone();
        assert_eq!(requests.last(), Some(&(200, PRESENCE_PAGE_SIZE)));
    }

    #[tokio::test]
    async fn test_absent_track_is_deleted() {
        let catalog = FakeCatalog::with_tracks(5);
        let store = SqliteTrackStore::in_memory().unwrap();
        store
            .upsert_primary(NewPrimaryTrack {
                external_id: "gone".to_string(),
                title: "Gone".to_string(),
                artist: "Artist".to_string(),
                artwork_url: None,
                added_at: 1,
            })
            .unwrap();

        let check = check_track_presence(&catalog, &store, "pl", "gone")
            .await
            .unwrap()
            .unwrap();

        assert_eq!(
            check,
            PresenceCheck {
                exists: false,
                deleted: true
            }
        );
        assert!(store.get_primary("gone").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_presence_of_unknown_track() {
        let catalog = FakeCatalog::with_tracks(5);
        let store = SqliteTrackStore::in_memory().unwrap();
        assert!(check_track_presence(&catalog, &store, "pl", "nope")
            .await
            .unwrap()
            .is_none());
        assert!(catalog.requests.lock().unwrap().is_empty());
    }

    #[test]
    fn test_require_playlist() {
        assert_eq!(require_playlist(Some("pl")).unwrap(), "pl");
        assert!(matches!(
            require_playlist(None),
            Err(CatalogError::MissingPlaylist)
        ));
    }
}

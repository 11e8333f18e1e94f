//! High-water-mark bookkeeping: the resumption markers that make restarts
//! duplicate-safe. The follower marker lives in the channel's marker slot;
//! the message boundary is derived from the downstream message service's
//! last delivered external id, so only the follower side is persisted here.

use std::sync::Arc;

use crate::services::MarkerStore;

/// The last-processed-follower marker for one channel.
///
/// `None` is semantically distinct from `Some(0)`: `None` means the channel
/// was never initialized (a new channel skips follower backfill and seeds
/// the marker instead), while `Some(0)` means initialized with no followers
/// seen yet.
pub struct FollowerMarker {
    store: Arc<dyn MarkerStore>,
    channel_id: i64,
}

impl FollowerMarker {
    pub fn new(store: Arc<dyn MarkerStore>, channel_id: i64) -> Self {
        Self { store, channel_id }
    }

    /// Reads the marker. Unparseable stored values are treated as absent.
    pub async fn last_follower_id(&self) -> anyhow::Result<Option<i64>> {
        let raw = self.store.channel_marker(self.channel_id).await?;
        Ok(raw.and_then(|value| value.parse::<i64>().ok()))
    }

    /// Advances the marker to the given follower id.
    ///
    /// Callers must invoke this strictly after the corresponding event was
    /// handled downstream; a crash between the two re-delivers at most that
    /// one event on restart, which downstream handlers tolerate by external
    /// id. A persistence failure is returned rather than swallowed; the
    /// in-memory marker is still valid within this process lifetime.
    pub async fn advance(&self, follower_id: i64) -> anyhow::Result<()> {
        self.store
            .update_channel_marker(self.channel_id, &follower_id.to_string())
            .await
    }
}

/// Parses the downstream message service's last external id into the
/// since-id boundary for message backfill.
pub fn parse_external_id(raw: Option<String>) -> Option<i64> {
    raw.and_then(|value| value.parse::<i64>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryMarkerStore {
        markers: Mutex<HashMap<i64, String>>,
    }

    #[async_trait]
    impl MarkerStore for MemoryMarkerStore {
        async fn channel_marker(&self, channel_id: i64) -> anyhow::Result<Option<String>> {
            Ok(self.markers.lock().unwrap().get(&channel_id).cloned())
        }

        async fn update_channel_marker(
            &self,
            channel_id: i64,
            value: &str,
        ) -> anyhow::Result<()> {
            self.markers
                .lock()
                .unwrap()
                .insert(channel_id, value.to_string());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_absent_marker_is_none() {
        let store = Arc::new(MemoryMarkerStore::default());
        let marker = FollowerMarker::new(store, 12);
        assert_eq!(marker.last_follower_id().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_zero_is_distinct_from_absent() {
        let store = Arc::new(MemoryMarkerStore::default());
        let marker = FollowerMarker::new(store, 12);
        marker.advance(0).await.unwrap();
        assert_eq!(marker.last_follower_id().await.unwrap(), Some(0));
    }

    #[tokio::test]
    async fn test_advance_and_read_back() {
        let store = Arc::new(MemoryMarkerStore::default());
        let marker = FollowerMarker::new(store.clone(), 12);
        marker.advance(1001).await.unwrap();
        assert_eq!(marker.last_follower_id().await.unwrap(), Some(1001));

        // markers are keyed by channel
        let other = FollowerMarker::new(store, 13);
        assert_eq!(other.last_follower_id().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_unparseable_marker_is_absent() {
        let store = Arc::new(MemoryMarkerStore::default());
        store.update_channel_marker(12, "not-a-number").await.unwrap();
        let marker = FollowerMarker::new(store, 12);
        assert_eq!(marker.last_follower_id().await.unwrap(), None);
    }

    #[test]
    fn test_parse_external_id() {
        assert_eq!(parse_external_id(None), None);
        assert_eq!(parse_external_id(Some("9001".to_string())), Some(9001));
        assert_eq!(parse_external_id(Some("garbage".to_string())), None);
    }
}

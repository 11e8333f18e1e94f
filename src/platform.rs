//! Event model and the seams to the platform: the historical (paginated)
//! query API and the live push feed. Both are consumed as trait objects so
//! the wire plumbing stays outside this crate.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::FetchError;

/// Cursor value requesting the first page of a cursored listing.
pub const FIRST_CURSOR: i64 = -1;

/// A follower of the channel's account, as reported by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Follower {
    pub id: i64,
    pub screen_name: String,
}

/// An inbound direct message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectMessage {
    /// The platform's message id, used downstream as the external id.
    pub id: i64,
    pub sender_id: i64,
    pub sender_screen_name: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// Which of the two sources an event was observed through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOrigin {
    Stream,
    Backfill,
}

impl EventOrigin {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stream => "streamed",
            Self::Backfill => "back-filled",
        }
    }
}

/// A follow observed on either source. Ephemeral: consumed once by the
/// coordinator, never stored here. Downstream services own persistence.
#[derive(Debug, Clone)]
pub struct FollowEvent {
    pub follower: Follower,
    pub origin: EventOrigin,
}

/// An inbound direct message observed on either source. Same lifecycle as
/// [`FollowEvent`].
#[derive(Debug, Clone)]
pub struct MessageEvent {
    pub message: DirectMessage,
    pub origin: EventOrigin,
}

/// One page of the cursored follower listing.
#[derive(Debug, Clone, Default)]
pub struct FollowerPage {
    pub entries: Vec<Follower>,
    pub next_cursor: Option<i64>,
}

impl FollowerPage {
    pub fn has_next(&self) -> bool {
        self.next_cursor.is_some()
    }
}

/// Paging parameters for the direct-message listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessagePaging {
    pub page_size: usize,
    /// Only messages with an id above this are returned.
    pub since_id: Option<i64>,
    /// Only messages with an id at or below this are returned.
    pub max_id: Option<i64>,
}

/// Historical query interface onto the platform's REST API.
///
/// Listings are returned newest-first. For followers that ordering is an
/// observed behavior of the platform, not a documented contract; the
/// backfill walkers own the stop conditions that depend on it.
#[async_trait]
pub trait QueryClient: Send + Sync {
    /// One page of the account's followers; pass [`FIRST_CURSOR`] to start.
    async fn list_followers(&self, cursor: i64) -> Result<FollowerPage, FetchError>;

    async fn list_direct_messages(
        &self,
        paging: MessagePaging,
    ) -> Result<Vec<DirectMessage>, FetchError>;

    /// Follows the given account back.
    async fn create_friendship(&self, user_id: i64) -> Result<(), FetchError>;
}

/// The live push connection. Assumed to deliver events at-least-once with
/// single-threaded callback dispatch once started.
#[async_trait]
pub trait LiveFeed: Send + Sync {
    async fn start(&self, sink: Arc<dyn EventSink>) -> anyhow::Result<()>;

    async fn stop(&self);
}

/// Handler interface the live feed dispatches into. The coordinator
/// implements this itself rather than subclassing any adapter the feed
/// provides.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn on_direct_message(&self, message: DirectMessage);

    /// A follow observed on the feed. The feed may report follow activity
    /// for accounts other than the channel's own, hence `followed_id`.
    async fn on_follow(&self, follower: Follower, followed_id: i64);
}

//! Downstream collaborator interfaces: contact resolution, message
//! ingestion, follow notifications and the per-channel marker slot. All are
//! owned by the hosting process; the coordinator only dispatches into them.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// A platform-scheme contact address, e.g. `twitter:jane`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContactUrn {
    scheme: &'static str,
    path: String,
}

impl ContactUrn {
    pub fn twitter(screen_name: &str) -> Self {
        Self {
            scheme: "twitter",
            path: screen_name.to_string(),
        }
    }

    pub fn scheme(&self) -> &str {
        self.scheme
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl fmt::Display for ContactUrn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.scheme, self.path)
    }
}

/// A resolved contact identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContactRef {
    pub contact_id: i64,
    pub contact_urn_id: i64,
    /// Whether resolution created the contact rather than finding it.
    pub is_new: bool,
}

/// Ambient context attached to an incoming message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IncomingContext {
    pub channel_id: i64,
    pub org_id: i64,
}

#[async_trait]
pub trait ContactService: Send + Sync {
    async fn get_or_create_contact(
        &self,
        org_id: i64,
        urn: &ContactUrn,
        channel_id: i64,
        display_name: &str,
    ) -> anyhow::Result<ContactRef>;
}

#[async_trait]
pub trait MessageService: Send + Sync {
    /// Persists an inbound message, returning the saved message id.
    async fn create_incoming(
        &self,
        context: &IncomingContext,
        from: &ContactUrn,
        body: &str,
        created_at: DateTime<Utc>,
        external_id: &str,
        display_name: &str,
    ) -> anyhow::Result<i64>;

    /// External id of the most recent inbound message already delivered on
    /// this channel. Message backfill resumes from here; there is no
    /// separate message marker.
    async fn last_external_id(&self, channel_id: i64) -> anyhow::Result<Option<String>>;
}

#[async_trait]
pub trait NotificationQueue: Send + Sync {
    /// Enqueues a notification that the channel's account was followed.
    async fn queue_follow_notification(
        &self,
        channel_id: i64,
        contact_urn_id: i64,
        is_new_contact: bool,
    ) -> anyhow::Result<()>;
}

/// The string-valued per-channel marker slot owned by the channel-management
/// subsystem. `None` means the slot was never written.
#[async_trait]
pub trait MarkerStore: Send + Sync {
    async fn channel_marker(&self, channel_id: i64) -> anyhow::Result<Option<String>>;

    async fn update_channel_marker(&self, channel_id: i64, value: &str) -> anyhow::Result<()>;
}

//! Top-level per-channel state machine: bounded historical catch-up first,
//! then gated transition to live push delivery.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{self, ChannelConfig, ChannelContext};
use crate::error::ConfigError;
use crate::follower_backfill::FollowerBackfillWalker;
use crate::marker::{self, FollowerMarker};
use crate::message_backfill::MessageBackfillWalker;
use crate::platform::{
    DirectMessage, EventOrigin, EventSink, FollowEvent, Follower, LiveFeed, MessageEvent,
    QueryClient,
};
use crate::retry::RateLimitedWalker;
use crate::services::{
    ContactService, ContactUrn, IncomingContext, MarkerStore, MessageService, NotificationQueue,
};

/// Lifecycle of a coordinator. `Stopped` is terminal and reachable from any
/// state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    NotStarted,
    Backfilling,
    Streaming,
    Stopped,
}

/// Tunables for the backfill walks.
#[derive(Debug, Clone)]
pub struct BackfillSettings {
    /// Messages requested per page of the historical listing.
    pub message_page_size: usize,
    /// Messages older than this are never backfilled, bounding worst-case
    /// catch-up cost after long downtime.
    pub max_message_age: Duration,
}

impl Default for BackfillSettings {
    fn default() -> Self {
        Self {
            message_page_size: 200,
            max_message_age: Duration::hours(1),
        }
    }
}

/// The downstream collaborators the coordinator dispatches into.
#[derive(Clone)]
pub struct Downstream {
    pub contacts: Arc<dyn ContactService>,
    pub messages: Arc<dyn MessageService>,
    pub notifications: Arc<dyn NotificationQueue>,
    pub markers: Arc<dyn MarkerStore>,
}

/// Coordinates ingestion for a single channel: reads the persisted
/// high-water-mark, catches up missed followers and direct messages through
/// the paginated query API, and only then opens the live feed with itself
/// registered as the event sink. Events from either source pass through the
/// same two handlers, so downstream dedup and notification behave
/// identically regardless of origin.
pub struct IngestionCoordinator {
    channel: ChannelContext,
    handle_id: i64,
    auto_follow: AtomicBool,
    settings: BackfillSettings,
    client: Arc<dyn QueryClient>,
    feed: Arc<dyn LiveFeed>,
    downstream: Downstream,
    marker: FollowerMarker,
    state: Mutex<CoordinatorState>,
    backfill_complete: AtomicBool,
    cancel: CancellationToken,
}

impl IngestionCoordinator {
    /// Validates the channel configuration and builds a coordinator.
    /// A channel without configuration or oauth credentials cannot start.
    pub fn new(
        channel: ChannelContext,
        channel_config: Option<&Value>,
        client: Arc<dyn QueryClient>,
        feed: Arc<dyn LiveFeed>,
        downstream: Downstream,
        settings: BackfillSettings,
    ) -> Result<Arc<Self>, ConfigError> {
        let parsed = ChannelConfig::from_value(channel.channel_id, channel_config)?;
        let marker = FollowerMarker::new(downstream.markers.clone(), channel.channel_id);

        Ok(Arc::new(Self {
            channel,
            handle_id: parsed.handle_id,
            auto_follow: AtomicBool::new(parsed.auto_follow),
            settings,
            client,
            feed,
            downstream,
            marker,
            state: Mutex::new(CoordinatorState::NotStarted),
            backfill_complete: AtomicBool::new(false),
            cancel: CancellationToken::new(),
        }))
    }

    /// Runs the two-phase startup: both backfill walks strictly in sequence
    /// (followers, then messages), and only after both complete the live
    /// feed is opened. Sequential walks keep the rate-limit budget
    /// predictable and the ordering guarantee simple.
    ///
    /// Hosting processes running many channels should submit this future to
    /// a bounded worker queue so backfills are serialized against the
    /// platform-wide rate limit shared by all channels.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        if let Err(state) = self.transition(CoordinatorState::Backfilling) {
            bail!(
                "channel #{channel} coordinator cannot start from {state:?}",
                channel = self.channel.channel_id
            );
        }

        // a read failure here must not masquerade as a fresh channel, or we
        // would re-bootstrap and lose the backfill boundary
        let last_follower_id = self.marker.last_follower_id().await.with_context(|| {
            format!(
                "failed to read follower marker for channel #{channel}",
                channel = self.channel.channel_id
            )
        })?;

        info!(
            "Starting back-fill for channel #{channel} (last_follower={last_follower_id:?})",
            channel = self.channel.channel_id
        );

        let retry = RateLimitedWalker::new(self.cancel.clone());
        self.backfill_followers(last_follower_id, &retry).await;
        self.backfill_messages(&retry).await;
        self.backfill_complete.store(true, Ordering::Relaxed);

        info!(
            "Finished back-fill for channel #{channel}",
            channel = self.channel.channel_id
        );

        // to preserve message order, streaming only ever starts after
        // back-filling is done; a stop during backfill means it never does
        if self.transition(CoordinatorState::Streaming).is_err() {
            return Ok(());
        }
        self.feed
            .start(Arc::clone(self) as Arc<dyn EventSink>)
            .await
            .with_context(|| {
                format!(
                    "failed to open live feed for channel #{channel}",
                    channel = self.channel.channel_id
                )
            })
    }

    /// Closes the live feed and stops accepting events. Safe to call in any
    /// state, including mid-backfill: walks observe the signal at their next
    /// page fetch, backoff sleep or inter-event check, while an event
    /// already being dispatched completes normally.
    pub async fn stop(&self) {
        self.cancel.cancel();
        self.feed.stop().await;

        let previous = {
            let mut state = self.state_guard();
            let previous = *state;
            *state = CoordinatorState::Stopped;
            previous
        };
        info!(
            "Stopped ingestion for channel #{channel} (was {previous:?})",
            channel = self.channel.channel_id
        );
    }

    /// Re-reads hot-reloadable flags from an updated channel config.
    pub fn update_from_config(&self, channel_config: &Value) {
        self.auto_follow
            .store(config::auto_follow_from(channel_config), Ordering::Relaxed);
    }

    pub fn state(&self) -> CoordinatorState {
        *self.state_guard()
    }

    pub fn channel(&self) -> ChannelContext {
        self.channel
    }

    pub fn handle_id(&self) -> i64 {
        self.handle_id
    }

    pub fn is_auto_follow(&self) -> bool {
        self.auto_follow.load(Ordering::Relaxed)
    }

    pub fn is_backfill_complete(&self) -> bool {
        self.backfill_complete.load(Ordering::Relaxed)
    }

    fn state_guard(&self) -> MutexGuard<'_, CoordinatorState> {
        self.state.lock().expect("coordinator state lock poisoned")
    }

    fn transition(&self, to: CoordinatorState) -> Result<(), CoordinatorState> {
        use CoordinatorState::*;
        let mut state = self.state_guard();
        let allowed = matches!(
            (*state, to),
            (NotStarted, Backfilling) | (Backfilling, Streaming)
        );
        if !allowed {
            return Err(*state);
        }
        *state = to;
        Ok(())
    }

    /// Follower catch-up, or the zero-history bootstrap for a channel whose
    /// marker was never initialized.
    async fn backfill_followers(
        &self,
        last_follower_id: Option<i64>,
        retry: &RateLimitedWalker,
    ) {
        let walker = FollowerBackfillWalker::new(self.client.as_ref(), retry);

        match last_follower_id {
            Some(since_id) => {
                let new_followers = walker.collect_new_followers(since_id).await;
                info!(
                    "Back-filling {count} followers on channel #{channel}",
                    count = new_followers.len(),
                    channel = self.channel.channel_id
                );

                for follower in new_followers {
                    if self.cancel.is_cancelled() {
                        break;
                    }
                    // a failed dispatch ends the walk with the marker at its
                    // last good value, so a restart re-delivers from there
                    if !self
                        .dispatch_follow(FollowEvent {
                            follower,
                            origin: EventOrigin::Backfill,
                        })
                        .await
                    {
                        break;
                    }
                }
            }
            None => {
                // new channel: seed the marker from the newest follower so
                // the next run has a boundary, without notifying for any of
                // the pre-existing followers
                let seed = walker.most_recent_follower_id().await;
                debug!(
                    "Seeding follower marker {seed} for new channel #{channel}",
                    channel = self.channel.channel_id
                );
                if let Err(err) = self.marker.advance(seed).await {
                    warn!(
                        "Failed to seed follower marker for channel #{channel}: {err:#}",
                        channel = self.channel.channel_id
                    );
                }
            }
        }
    }

    /// Message catch-up, bounded by the max-age window rather than by the
    /// presence of a prior message. The since-id boundary comes from the
    /// downstream message service's last delivered external id.
    async fn backfill_messages(&self, retry: &RateLimitedWalker) {
        let since_id = match self
            .downstream
            .messages
            .last_external_id(self.channel.channel_id)
            .await
        {
            Ok(raw) => marker::parse_external_id(raw),
            Err(err) => {
                warn!(
                    "Failed to read last message external id for channel #{channel}, \
                     back-filling by age alone: {err:#}",
                    channel = self.channel.channel_id
                );
                None
            }
        };

        let walker = MessageBackfillWalker::new(
            self.client.as_ref(),
            retry,
            self.settings.message_page_size,
            self.settings.max_message_age,
        );
        let messages = walker.collect_recent_messages(since_id, Utc::now()).await;
        info!(
            "Back-filling {count} direct messages on channel #{channel}",
            count = messages.len(),
            channel = self.channel.channel_id
        );

        for message in messages {
            if self.cancel.is_cancelled() {
                break;
            }
            // the since-id boundary is downstream's last saved message, so
            // skipping past a failed save would lose that message for good
            if !self
                .dispatch_message(MessageEvent {
                    message,
                    origin: EventOrigin::Backfill,
                })
                .await
            {
                break;
            }
        }
    }

    /// Dispatch wrapper: a failed handler is logged and reported to the
    /// caller. The backfill loops stop on failure so the resumption
    /// boundaries never move past an undelivered event; the live path
    /// only logs, keeping the connection alive.
    async fn dispatch_message(&self, event: MessageEvent) -> bool {
        if let Err(err) = self.handle_message_received(&event).await {
            error!(
                "Unable to handle {origin} message {id} on channel #{channel}: {err:#}",
                origin = event.origin.as_str(),
                id = event.message.id,
                channel = self.channel.channel_id
            );
            return false;
        }
        true
    }

    async fn dispatch_follow(&self, event: FollowEvent) -> bool {
        if let Err(err) = self.handle_new_follower(&event).await {
            error!(
                "Unable to handle {origin} follow from '{name}' on channel #{channel}: {err:#}",
                origin = event.origin.as_str(),
                name = event.follower.screen_name,
                channel = self.channel.channel_id
            );
            return false;
        }
        true
    }

    /// Handles an inbound direct message from either source. Returns the
    /// saved message id (diagnostics only), or `None` when the message was
    /// filtered out.
    async fn handle_message_received(&self, event: &MessageEvent) -> Result<Option<i64>> {
        let message = &event.message;

        // the channel's own outgoing messages re-appear on its feed
        if message.sender_id == self.handle_id {
            debug!(
                "Ignoring self-sent message {id} on channel #{channel}",
                id = message.id,
                channel = self.channel.channel_id
            );
            return Ok(None);
        }

        let context = IncomingContext {
            channel_id: self.channel.channel_id,
            org_id: self.channel.org_id,
        };
        let from = ContactUrn::twitter(&message.sender_screen_name);

        let saved_id = self
            .downstream
            .messages
            .create_incoming(
                &context,
                &from,
                &message.text,
                message.created_at,
                &message.id.to_string(),
                &message.sender_screen_name,
            )
            .await
            .with_context(|| format!("failed to save direct message {id}", id = message.id))?;

        info!(
            "Direct message {id} {origin} on channel #{channel} and saved as msg #{saved_id}",
            id = message.id,
            origin = event.origin.as_str(),
            channel = self.channel.channel_id
        );

        Ok(Some(saved_id))
    }

    /// Handles a new follower from either source: resolve the contact,
    /// follow back if enabled, notify the routing layer, then advance the
    /// marker. The marker advances even when the follow-back failed; the
    /// social follow and resumption bookkeeping are independent concerns.
    async fn handle_new_follower(&self, event: &FollowEvent) -> Result<()> {
        let follower = &event.follower;
        let urn = ContactUrn::twitter(&follower.screen_name);

        let contact = self
            .downstream
            .contacts
            .get_or_create_contact(
                self.channel.org_id,
                &urn,
                self.channel.channel_id,
                &follower.screen_name,
            )
            .await
            .with_context(|| {
                format!(
                    "failed to resolve contact for follower '{name}'",
                    name = follower.screen_name
                )
            })?;

        if contact.is_new {
            info!(
                "New follower '{name}' {origin} on channel #{channel} and saved as contact #{contact_id}",
                name = follower.screen_name,
                origin = event.origin.as_str(),
                channel = self.channel.channel_id,
                contact_id = contact.contact_id
            );
        }

        // follow back is best effort: failure never blocks the notification
        // or marker advancement below
        if self.is_auto_follow() {
            match self.client.create_friendship(follower.id).await {
                Ok(()) => debug!(
                    "Auto-followed '{name}' on channel #{channel}",
                    name = follower.screen_name,
                    channel = self.channel.channel_id
                ),
                Err(err) => error!(
                    "Unable to auto-follow '{name}' on channel #{channel}: {err}",
                    name = follower.screen_name,
                    channel = self.channel.channel_id
                ),
            }
        }

        self.downstream
            .notifications
            .queue_follow_notification(self.channel.channel_id, contact.contact_urn_id, contact.is_new)
            .await
            .context("failed to queue follow notification")?;

        if let Err(err) = self.marker.advance(follower.id).await {
            // only risks a redundant backfill after restart; downstream
            // handlers are idempotent by follower id
            warn!(
                "Failed to persist follower marker {id} for channel #{channel}: {err:#}",
                id = follower.id,
                channel = self.channel.channel_id
            );
        }

        Ok(())
    }
}

#[async_trait]
impl EventSink for IngestionCoordinator {
    async fn on_direct_message(&self, message: DirectMessage) {
        if self.state() == CoordinatorState::Stopped {
            return;
        }
        self.dispatch_message(MessageEvent {
            message,
            origin: EventOrigin::Stream,
        })
        .await;
    }

    async fn on_follow(&self, follower: Follower, followed_id: i64) {
        if self.state() == CoordinatorState::Stopped {
            return;
        }
        // the feed reports follow activity for other accounts too
        if followed_id != self.handle_id {
            return;
        }
        self.dispatch_follow(FollowEvent {
            follower,
            origin: EventOrigin::Stream,
        })
        .await;
    }
}

//! Per-channel ingestion coordinator for a social platform account.
//!
//! Reconciles two event sources, a bounded historical query API and an
//! unbounded live push feed, into a single ordered stream of direct-message
//! and new-follower events for a downstream routing service. Startup is
//! two-phase: paginated catch-up walks first (rate-limit aware, resumable
//! from persisted high-water-marks), and only once both walks complete does
//! the live feed open. Restarts are duplicate-safe to within one event,
//! which downstream handlers tolerate by external id.
//!
//! This is a library component: the hosting process owns credentials,
//! builds the platform clients and downstream services behind the trait
//! seams in [`platform`] and [`services`], and drives each channel's
//! [`coordinator::IngestionCoordinator`] from its own worker queue.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod follower_backfill;
pub mod marker;
pub mod message_backfill;
pub mod platform;
pub mod retry;
pub mod services;

pub use config::{ChannelConfig, ChannelContext};
pub use coordinator::{BackfillSettings, CoordinatorState, Downstream, IngestionCoordinator};
pub use error::{ConfigError, FetchError};
pub use platform::{
    DirectMessage, EventOrigin, EventSink, FollowEvent, Follower, FollowerPage, LiveFeed,
    MessageEvent, MessagePaging, QueryClient,
};
pub use services::{
    ContactRef, ContactService, ContactUrn, IncomingContext, MarkerStore, MessageService,
    NotificationQueue,
};

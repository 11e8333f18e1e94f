//! Catch-up walk over the follower listing.

use tracing::debug;

use crate::platform::{Follower, QueryClient, FIRST_CURSOR};
use crate::retry::{RateLimitedWalker, WalkStep};

/// Walks the cursored follower listing from the newest entry back to a
/// known marker, collecting everything missed while the live feed was down.
///
/// The stop condition relies on the listing being ordered most recent
/// follower first; that ordering is an observed behavior of the platform
/// rather than a documented contract, which is why it lives here and
/// nowhere else.
pub struct FollowerBackfillWalker<'a> {
    client: &'a dyn QueryClient,
    retry: &'a RateLimitedWalker,
}

impl<'a> FollowerBackfillWalker<'a> {
    pub fn new(client: &'a dyn QueryClient, retry: &'a RateLimitedWalker) -> Self {
        Self { client, retry }
    }

    /// Collects followers newer than `since_id`, returned oldest first so
    /// dispatch preserves chronological order. The marker entry itself and
    /// everything after it are discarded. A failed or interrupted page fetch
    /// ends the walk with the entries accumulated so far.
    pub async fn collect_new_followers(&self, since_id: i64) -> Vec<Follower> {
        let mut cursor = FIRST_CURSOR;
        let mut new_followers = Vec::new();

        'pages: loop {
            let step = self
                .retry
                .fetch("followers", || self.client.list_followers(cursor))
                .await;
            let page = match step {
                WalkStep::Page(page) => page,
                WalkStep::Stop => break,
            };

            for follower in page.entries {
                if follower.id == since_id {
                    break 'pages;
                }
                new_followers.push(follower);
            }

            match page.next_cursor {
                Some(next) => cursor = next,
                None => break,
            }
        }

        debug!(
            "Collected {count} new followers since #{since_id}",
            count = new_followers.len()
        );

        // pages arrive newest-first; dispatch wants oldest-first
        new_followers.reverse();
        new_followers
    }

    /// Zero-history bootstrap: the id of the single most recent follower,
    /// or 0 when the account has no followers or the fetch failed. No
    /// follow events are emitted for pre-existing followers; the returned
    /// id only seeds the marker for future walks.
    pub async fn most_recent_follower_id(&self) -> i64 {
        let step = self
            .retry
            .fetch("followers", || self.client.list_followers(FIRST_CURSOR))
            .await;
        match step {
            WalkStep::Page(page) => page.entries.first().map(|follower| follower.id).unwrap_or(0),
            WalkStep::Stop => 0,
        }
    }
}

//! Catch-up walk over the direct-message listing.

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::platform::{DirectMessage, MessagePaging, QueryClient};
use crate::retry::{RateLimitedWalker, WalkStep};

/// Walks the direct-message listing from the newest entry back to a
/// time/id boundary.
///
/// Pages are requested with the caller's since-id filter plus a max-id
/// upper bound that is lowered after each page to one below the smallest id
/// seen on that page. Lowering the bound keeps messages arriving mid-walk
/// from shifting page boundaries underneath us, and keeps already-seen
/// entries out of the next page.
pub struct MessageBackfillWalker<'a> {
    client: &'a dyn QueryClient,
    retry: &'a RateLimitedWalker,
    page_size: usize,
    max_age: Duration,
}

impl<'a> MessageBackfillWalker<'a> {
    pub fn new(
        client: &'a dyn QueryClient,
        retry: &'a RateLimitedWalker,
        page_size: usize,
        max_age: Duration,
    ) -> Self {
        Self {
            client,
            retry,
            page_size,
            max_age,
        }
    }

    /// Collects messages newer than both `since_id` and the max-age window,
    /// returned oldest first. One entry past the window ends the whole walk:
    /// pages are newest-first, so everything after it is at least as old.
    /// Dropping that old back-pressure outright bounds catch-up cost after
    /// long downtime.
    pub async fn collect_recent_messages(
        &self,
        since_id: Option<i64>,
        now: DateTime<Utc>,
    ) -> Vec<DirectMessage> {
        let mut paging = MessagePaging {
            page_size: self.page_size,
            since_id,
            max_id: None,
        };
        let mut collected = Vec::new();

        'pages: loop {
            let step = self
                .retry
                .fetch("direct messages", || {
                    self.client.list_direct_messages(paging.clone())
                })
                .await;
            let messages = match step {
                WalkStep::Page(messages) => messages,
                WalkStep::Stop => break,
            };

            let fetched = messages.len();
            // smallest id within this page only; it becomes the next upper bound
            let mut min_page_id: Option<i64> = None;

            for message in messages {
                if now.signed_duration_since(message.created_at) > self.max_age {
                    break 'pages;
                }

                min_page_id = Some(match min_page_id {
                    Some(min) => min.min(message.id),
                    None => message.id,
                });
                collected.push(message);
            }

            if fetched < self.page_size {
                break; // short page: listing exhausted
            }

            paging.max_id = min_page_id.map(|min| min - 1);
        }

        debug!(
            "Collected {count} direct messages (since_id={since_id:?})",
            count = collected.len()
        );

        // pages arrive newest-first; dispatch wants oldest-first
        collected.reverse();
        collected
    }
}

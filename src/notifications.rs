//! Ephemeral notification feed
//!
//! Every terminal task transition raises a notification. Notifications expire on
//! their own after [`NotificationConfig::ttl`] or can be dismissed earlier; both
//! emit [`Event::NotificationDismissed`]. Nothing in the pipeline depends on the
//! feed, it only reports.

use crate::config::NotificationConfig;
use crate::types::{Event, Notification, NotificationId, NotificationKind, TaskId};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::{RwLock, broadcast};
use tracing::debug;

struct FeedInner {
    config: NotificationConfig,
    entries: RwLock<VecDeque<Notification>>,
    next_id: AtomicU64,
    event_tx: broadcast::Sender<Event>,
}

impl FeedInner {
    async fn remove(&self, id: NotificationId) -> bool {
        let removed = {
            let mut entries = self.entries.write().await;
            match entries.iter().position(|n| n.id == id) {
                Some(index) => entries.remove(index).is_some(),
                None => false,
            }
        };
        if removed {
            self.event_tx.send(Event::NotificationDismissed { id }).ok();
        }
        removed
    }
}

/// Self-expiring log of task outcomes
///
/// Cloning is cheap; clones share the same feed.
#[derive(Clone)]
pub struct NotificationFeed {
    inner: Arc<FeedInner>,
}

impl std::fmt::Debug for NotificationFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationFeed")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl NotificationFeed {
    /// Create a feed that broadcasts on `event_tx`
    pub fn new(config: NotificationConfig, event_tx: broadcast::Sender<Event>) -> Self {
        Self {
            inner: Arc::new(FeedInner {
                config,
                entries: RwLock::new(VecDeque::new()),
                next_id: AtomicU64::new(1),
                event_tx,
            }),
        }
    }

    /// Append a notification and schedule its expiry
    ///
    /// When the feed is full the oldest notification is dropped.
    pub async fn push(
        &self,
        kind: NotificationKind,
        title: impl Into<String>,
        message: impl Into<String>,
        task_id: Option<TaskId>,
    ) -> Notification {
        let notification = Notification {
            id: NotificationId(self.inner.next_id.fetch_add(1, Ordering::Relaxed)),
            kind,
            title: title.into(),
            message: message.into(),
            created_at: chrono::Utc::now(),
            task_id,
        };

        let evicted = {
            let mut entries = self.inner.entries.write().await;
            entries.push_back(notification.clone());
            let mut evicted = Vec::new();
            while entries.len() > self.inner.config.capacity {
                if let Some(oldest) = entries.pop_front() {
                    evicted.push(oldest.id);
                }
            }
            evicted
        };

        for id in evicted {
            self.inner
                .event_tx
                .send(Event::NotificationDismissed { id })
                .ok();
        }

        self.inner
            .event_tx
            .send(Event::Notified {
                notification: notification.clone(),
            })
            .ok();

        debug!(
            notification_id = notification.id.0,
            ?kind,
            task_id = task_id.map(|id| id.0),
            "notification raised"
        );

        // the timer must not keep a dropped feed alive
        let feed: Weak<FeedInner> = Arc::downgrade(&self.inner);
        let id = notification.id;
        let ttl = self.inner.config.ttl;
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            if let Some(feed) = feed.upgrade() && feed.remove(id).await {
                debug!(notification_id = id.0, "notification expired");
            }
        });

        notification
    }

    /// Remove a notification before it expires
    ///
    /// Returns `false` if it was already gone.
    pub async fn dismiss(&self, id: NotificationId) -> bool {
        self.inner.remove(id).await
    }

    /// Current notifications, oldest first
    pub async fn list(&self) -> Vec<Notification> {
        self.inner.entries.read().await.iter().cloned().collect()
    }

    /// Remove every notification
    pub async fn clear(&self) {
        let drained: Vec<NotificationId> = {
            let mut entries = self.inner.entries.write().await;
            entries.drain(..).map(|n| n.id).collect()
        };
        for id in drained {
            self.inner
                .event_tx
                .send(Event::NotificationDismissed { id })
                .ok();
        }
    }
}

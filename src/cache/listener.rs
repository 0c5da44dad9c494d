//! Notification listener task
//!
//! One task per cache. It owns the single multiplexed store subscription
//! and talks to the cache only through the command channel and a weak
//! reference, so dropping the last cache handle stops it.

use std::sync::{Arc, Weak};

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use super::CacheInner;
use crate::observability::{log_event_with_fields, Event};
use crate::store::{ConfigStore, KeyspaceNotification, NotificationReceiver};

/// Commands accepted by the listener
#[derive(Debug)]
pub(crate) enum ListenerCommand {
    /// Replace the subscription with one covering these channels. `done`
    /// fires once the new subscription is live (or has failed).
    Resubscribe {
        channels: Vec<String>,
        done: Option<oneshot::Sender<()>>,
    },
    Shutdown,
}

pub(crate) async fn run(
    cache: Weak<CacheInner>,
    store: Arc<dyn ConfigStore>,
    mut commands: mpsc::UnboundedReceiver<ListenerCommand>,
) {
    let mut subscription: Option<NotificationReceiver> = None;

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(ListenerCommand::Resubscribe { channels, done }) => {
                    // Old subscription is torn down before the new one exists
                    subscription = None;
                    if !channels.is_empty() {
                        match store.subscribe(&channels).await {
                            Ok(rx) => {
                                let count = channels.len().to_string();
                                log_event_with_fields(Event::ListenerResubscribed, &[("channels", count.as_str())]);
                                subscription = Some(rx);
                            }
                            Err(e) => {
                                warn!(error = %e, "keyspace subscription failed");
                            }
                        }
                    }
                    if let Some(done) = done {
                        let _ = done.send(());
                    }
                }
                Some(ListenerCommand::Shutdown) | None => break,
            },
            notification = next_notification(&mut subscription) => match notification {
                Some(notification) => {
                    let Some(cache) = cache.upgrade() else {
                        break;
                    };
                    handle(&cache, &notification).await;
                }
                None => {
                    warn!("keyspace subscription closed by store");
                    subscription = None;
                }
            },
        }
    }

    log_event_with_fields(Event::ListenerStopped, &[]);
}

async fn next_notification(subscription: &mut Option<NotificationReceiver>) -> Option<KeyspaceNotification> {
    match subscription {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn handle(cache: &CacheInner, notification: &KeyspaceNotification) {
    match cache.apply_notification(notification).await {
        Ok(true) => {}
        Ok(false) => debug!(channel = %notification.channel, "notification ignored"),
        Err(e) => {
            let code = e.code().code();
            log_event_with_fields(
                Event::NotificationFailed,
                &[("channel", notification.channel.as_str()), ("code", code), ("error", e.message())],
            );
            // Entry is rebuilt from the store on next read
            if let Some(key) = notification.key() {
                cache.invalidate_key(key).await;
            }
        }
    }
}

//! Topic router
//!
//! Owns the ordered collection of (filter, callback) routes and dispatches
//! decoded PUBLISH packets to every matching subscription.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::RwLock;
use smallvec::SmallVec;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, error};

use crate::message::Message;
use crate::protocol::{Packet, Publish};
use crate::store::Store;
use crate::topic::{filter_matches_topic, parse_shared_subscription};

/// Callback invoked for every message matching a subscription.
pub type MessageHandler = Arc<dyn Fn(Message) + Send + Sync>;

struct Route {
    /// The filter exactly as subscribed, `$share` prefix included.
    filter: String,
    /// Share group qualifier, kept as metadata; matching ignores it.
    #[allow(dead_code)]
    share_group: Option<Arc<str>>,
    handler: MessageHandler,
}

impl Route {
    fn matches(&self, topic: &str) -> bool {
        self.filter.as_str() == topic || filter_matches_topic(&self.filter, topic)
    }
}

/// Ordered, lock-protected route table plus the dispatch loop.
pub struct Router {
    routes: RwLock<Vec<Route>>,
    default_handler: RwLock<Option<MessageHandler>>,
}

impl Router {
    pub fn new() -> Self {
        Self {
            routes: RwLock::new(Vec::new()),
            default_handler: RwLock::new(None),
        }
    }

    /// Register a callback for a topic filter.
    ///
    /// A filter string that is already registered has its callback replaced
    /// in place; equality is syntactic, so overlapping wildcard filters stay
    /// distinct routes.
    pub fn add_route(&self, filter: impl Into<String>, handler: MessageHandler) {
        let filter = filter.into();
        let mut routes = self.routes.write();
        if let Some(existing) = routes.iter_mut().find(|r| r.filter == filter) {
            existing.handler = handler;
            return;
        }
        let share_group = parse_shared_subscription(&filter).map(|(group, _)| Arc::from(group));
        routes.push(Route {
            filter,
            share_group,
            handler,
        });
    }

    /// Remove the route whose filter string is exactly `filter`.
    pub fn delete_route(&self, filter: &str) {
        self.routes.write().retain(|r| r.filter != filter);
    }

    /// Callback for messages that match no registered route.
    pub fn set_default_handler(&self, handler: MessageHandler) {
        *self.default_handler.write() = Some(handler);
    }

    pub fn route_count(&self) -> usize {
        self.routes.read().len()
    }

    /// Receive decoded PUBLISH packets and invoke the callback of every
    /// route whose filter matches, acknowledging each message once its
    /// callbacks have run.
    ///
    /// With `order` set, deliveries are issued inline in arrival order so a
    /// subscription never observes reordering; otherwise each callback runs
    /// on its own task. The loop ends when `messages` closes or `stop`
    /// fires, after draining any callback tasks still running. A panicking
    /// callback is contained and logged; it never takes the loop down.
    pub async fn match_and_dispatch(
        self: Arc<Self>,
        mut messages: mpsc::Receiver<Publish>,
        order: bool,
        outbound: mpsc::UnboundedSender<Packet>,
        store: Arc<dyn Store>,
        mut stop: watch::Receiver<bool>,
    ) {
        debug!("router starting");
        let mut callbacks = JoinSet::new();

        loop {
            let publish = tokio::select! {
                _ = stop.changed() => break,
                received = messages.recv() => match received {
                    Some(publish) => publish,
                    None => break,
                },
            };

            // Reap callback tasks finished since the last message.
            while callbacks.try_join_next().is_some() {}

            // Snapshot matching handlers under the read lock, then release
            // it before invoking anything: a callback is allowed to call
            // add_route without deadlocking the router.
            let mut handlers: SmallVec<[MessageHandler; 4]> = {
                let routes = self.routes.read();
                routes
                    .iter()
                    .filter(|route| route.matches(&publish.topic))
                    .map(|route| route.handler.clone())
                    .collect()
            };

            if handlers.is_empty() {
                match self.default_handler.read().clone() {
                    Some(handler) => handlers.push(handler),
                    None => {
                        debug!(topic = %publish.topic, "message received but nothing to handle");
                        continue;
                    }
                }
            }

            let message = Message::from_publish(&publish, outbound.clone(), store.clone());

            if order {
                for handler in handlers {
                    invoke(&handler, message.clone());
                    message.ack();
                }
            } else {
                for handler in handlers {
                    let message = message.clone();
                    callbacks.spawn(async move {
                        invoke(&handler, message.clone());
                        message.ack();
                    });
                }
            }
        }

        while callbacks.join_next().await.is_some() {}
        debug!("router stopped");
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

/// A subscriber panic must not tear down dispatch for everyone else.
fn invoke(handler: &MessageHandler, message: Message) {
    let topic = message.topic().to_owned();
    if catch_unwind(AssertUnwindSafe(|| handler(message))).is_err() {
        error!(topic, "subscriber callback panicked");
    }
}

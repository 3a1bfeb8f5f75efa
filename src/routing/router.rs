//! Topic router: pattern subscriptions and message dispatch
//!
//! The router owns the consumer-side subscription table: each entry maps a
//! wildcard pattern to an ordered list of callbacks. On every drained
//! inbound message the router walks all subscriptions, applies the
//! matcher, and invokes each callback of every matching pattern with
//! `(topic, payload)`.
//!
//! Dispatch guarantees:
//!
//! - callbacks run in `subscribe()` insertion order, patterns first, then
//!   callbacks within a pattern;
//! - a panicking callback is caught and logged, and never prevents the
//!   remaining callbacks (or subsequent messages) from running;
//! - per-topic FIFO order is inherited from the single inbound queue and
//!   single-threaded drain; there is no cross-topic ordering guarantee.

use crate::routing::matcher::topic_matches;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Consumer callback invoked with `(topic, payload)`
pub type TopicCallback = Box<dyn FnMut(&str, &[u8]) + Send>;

/// Handle identifying a registered subscription
///
/// Returned by [`TopicRouter::subscribe`]; callers hold it to identify
/// their registration (e.g. for a future unsubscribe surface).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionHandle {
    pattern_index: usize,
    callback_index: usize,
}

/// A pattern with its ordered callbacks
struct Subscription {
    pattern: String,
    callbacks: Vec<TopicCallback>,
}

/// Maps subscription patterns to ordered consumer callbacks
#[derive(Default)]
pub struct TopicRouter {
    subscriptions: Vec<Subscription>,
}

impl TopicRouter {
    /// Create an empty router
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback for a pattern
    ///
    /// Subscribing the same pattern again appends to its callback list; a
    /// subscription's callback list is never empty once created.
    pub fn subscribe(
        &mut self,
        pattern: impl Into<String>,
        callback: TopicCallback,
    ) -> SubscriptionHandle {
        let pattern = pattern.into();
        if let Some(index) = self
            .subscriptions
            .iter()
            .position(|s| s.pattern == pattern)
        {
            self.subscriptions[index].callbacks.push(callback);
            SubscriptionHandle {
                pattern_index: index,
                callback_index: self.subscriptions[index].callbacks.len() - 1,
            }
        } else {
            self.subscriptions.push(Subscription {
                pattern,
                callbacks: vec![callback],
            });
            SubscriptionHandle {
                pattern_index: self.subscriptions.len() - 1,
                callback_index: 0,
            }
        }
    }

    /// Registered patterns, in subscription order
    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.subscriptions.iter().map(|s| s.pattern.as_str())
    }

    /// Number of registered patterns
    pub fn pattern_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Dispatch one message to every matching subscription
    ///
    /// Returns the number of callbacks invoked.
    pub fn dispatch(&mut self, topic: &str, payload: &[u8]) -> usize {
        let mut invoked = 0;
        for subscription in &mut self.subscriptions {
            if !topic_matches(topic, &subscription.pattern) {
                continue;
            }
            for callback in &mut subscription.callbacks {
                let outcome = catch_unwind(AssertUnwindSafe(|| callback(topic, payload)));
                if outcome.is_err() {
                    tracing::error!(
                        pattern = %subscription.pattern,
                        topic,
                        "subscription callback panicked; continuing dispatch"
                    );
                }
                invoked += 1;
            }
        }
        invoked
    }
}

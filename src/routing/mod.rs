//! Subscription-pattern matching and message routing

mod matcher;
mod router;

pub use matcher::topic_matches;
pub use router::{SubscriptionHandle, TopicCallback, TopicRouter};

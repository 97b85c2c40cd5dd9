pub mod arcticshift;
pub mod cache;
pub mod models;
mod produce;
pub mod reddit;
mod user_agents;

pub use arcticshift::ArcticShiftPoller;
pub use cache::SubscriptionCache;
pub use reddit::RedditPoller;

// Upstream errors can embed whole response bodies; cap what reaches the logs.
pub(crate) fn truncate_error(err: &anyhow::Error) -> String {
    let msg = err.to_string();
    if msg.chars().count() > 300 {
        let truncated: String = msg.chars().take(300).collect();
        format!("{}...", truncated)
    } else {
        msg
    }
}

use crate::entities::{Match, NewMatch, SubscriptionRow, User};
use anyhow::Result;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Persistence operations for matches. Implementations must be safe to
/// call from any number of producers and the single notifier consumer.
#[async_trait::async_trait]
pub trait MatchStore: Send + Sync {
    /// Persist a batch of matches in one statement. Rows whose hash
    /// already exists are silently discarded.
    async fn create_matches(&self, matches: &[NewMatch]) -> Result<()>;

    /// All matches with `notified_at IS NULL`, oldest first.
    async fn unnotified_matches(&self) -> Result<Vec<Match>>;

    /// Stamp `notified_at` for the given ids. Idempotent; rows already
    /// notified keep their original timestamp.
    async fn mark_notified(&self, ids: &[i64], notified_at: DateTime<Utc>) -> Result<()>;
}

/// Read side of the keyword subscriptions consumed by the pollers.
#[async_trait::async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Active keywords joined with their owner's email.
    async fn active_subscriptions_with_email(&self) -> Result<Vec<SubscriptionRow>>;
}

/// User lookups needed by the notifier.
#[async_trait::async_trait]
pub trait UserStore: Send + Sync {
    async fn users_by_ids(&self, ids: &[Uuid]) -> Result<Vec<User>>;
}

use anyhow::Result;
use feedgrep_datastore::Match;

/// Outbound mail seam. Implementations own rendering and transport; the
/// notifier only decides what to send and to whom.
#[async_trait::async_trait]
pub trait Mailer: Send + Sync {
    /// Send a single-match notification.
    async fn send_match(&self, user_email: &str, m: &Match) -> Result<()>;

    /// Send a digest combining several matches for one user.
    async fn send_digest(&self, user_email: &str, matches: &[Match]) -> Result<()>;
}

use crate::mailer::Mailer;
use anyhow::{Context, Result};
use chrono::Utc;
use feedgrep_datastore::{Match, MatchStore, User, UserStore};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info};

const NOTIFY_INTERVAL: Duration = Duration::from_secs(60);

/// Drains unnotified matches on a fixed cadence and delivers them per
/// user, one email per user per cycle: a single-match email for exactly
/// one hit, a digest for two or more. Matches are marked notified only
/// after a successful send, so every failure is retried next cycle.
pub struct Notifier {
    matches: Arc<dyn MatchStore>,
    users: Arc<dyn UserStore>,
    mailer: Arc<dyn Mailer>,
}

impl Notifier {
    pub fn new(
        matches: Arc<dyn MatchStore>,
        users: Arc<dyn UserStore>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        Self {
            matches,
            users,
            mailer,
        }
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        if let Err(e) = self.notify_users().await {
            error!(error = %e, "notify users");
        }

        let mut ticker = tokio::time::interval(NOTIFY_INTERVAL);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!("stopping notifier");
                    return;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.notify_users().await {
                        error!(error = %e, "notify users");
                    }
                }
            }
        }
    }

    /// One notification cycle. Per-user failures are logged and leave
    /// the affected matches unnotified; the cycle continues.
    pub async fn notify_users(&self) -> Result<()> {
        let unnotified = self
            .matches
            .unnotified_matches()
            .await
            .context("get unnotified matches")?;
        if unnotified.is_empty() {
            return Ok(());
        }

        let (user_matches, user_order) = group_by_user(unnotified);
        let users = self
            .users
            .users_by_ids(&user_order)
            .await
            .context("get users by ids")?;
        let users: HashMap<_, _> = users.into_iter().map(|u| (u.id, u)).collect();

        for user_id in user_order {
            let matches = &user_matches[&user_id];
            let user = match users.get(&user_id) {
                Some(user) => user,
                None => {
                    error!(user_id = %user_id, "notify users: user not found");
                    continue;
                }
            };

            self.notify_one_user(user, matches).await;
        }

        Ok(())
    }

    async fn notify_one_user(&self, user: &User, matches: &[Match]) {
        if matches.len() == 1 {
            let m = &matches[0];
            if let Err(e) = self.mailer.send_match(&user.email, m).await {
                error!(user_id = %user.id, error = %e, "notify users: send match notification");
                return;
            }
            if let Err(e) = self.matches.mark_notified(&[m.id], Utc::now()).await {
                error!(user_id = %user.id, error = %e, "notify users: mark match as notified");
            }
            return;
        }

        if let Err(e) = self.mailer.send_digest(&user.email, matches).await {
            error!(user_id = %user.id, error = %e, "notify users: send digest notification");
            return;
        }

        let ids: Vec<i64> = matches.iter().map(|m| m.id).collect();
        if let Err(e) = self.matches.mark_notified(&ids, Utc::now()).await {
            error!(user_id = %user.id, error = %e, "failed to mark matches as notified");
        }
    }
}

// Groups matches per user, keeping users in first-seen (oldest match)
// order and each user's matches in store order.
fn group_by_user(matches: Vec<Match>) -> (HashMap<uuid::Uuid, Vec<Match>>, Vec<uuid::Uuid>) {
    let mut by_user: HashMap<uuid::Uuid, Vec<Match>> = HashMap::new();
    let mut order = Vec::new();

    for m in matches {
        let entry = by_user.entry(m.user_id).or_default();
        if entry.is_empty() {
            order.push(m.user_id);
        }
        entry.push(m);
    }

    (by_user, order)
}

use feedgrep_datastore::SubscriptionStore;
use feedgrep_matcher::{KeywordFilters, MatchMode, Subscription};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Read-mostly snapshot of effective subscriptions, refreshed from the
/// store on a fixed cadence. Readers clone the current `Arc` and never
/// block the refresher; each refresh is an unconditional replace.
pub struct SubscriptionCache {
    store: Arc<dyn SubscriptionStore>,
    snapshot: RwLock<Arc<Vec<Subscription>>>,
}

impl SubscriptionCache {
    pub fn new(store: Arc<dyn SubscriptionStore>) -> Self {
        Self {
            store,
            snapshot: RwLock::new(Arc::new(Vec::new())),
        }
    }

    /// The most recent snapshot.
    pub fn current(&self) -> Arc<Vec<Subscription>> {
        self.snapshot.read().unwrap().clone()
    }

    /// Reload from the store. Rows with an empty keyword or email after
    /// trimming are dropped; keyword text is stored lower-cased. Errors
    /// keep the previous snapshot.
    pub async fn refresh(&self) {
        let rows = match self.store.active_subscriptions_with_email().await {
            Ok(rows) => rows,
            Err(e) => {
                error!(error = %e, "failed to refresh subscriptions");
                return;
            }
        };

        let mut active = Vec::with_capacity(rows.len());
        for row in rows {
            let keyword = row.keyword.trim().to_lowercase();
            let email = row.email.trim();
            if keyword.is_empty() || email.is_empty() {
                continue;
            }

            let filters = if row.filters.is_null() {
                None
            } else {
                match serde_json::from_value::<KeywordFilters>(row.filters) {
                    Ok(filters) => filters.reddit,
                    Err(e) => {
                        warn!(keyword_id = row.id, error = %e, "skipping keyword with undecodable filters");
                        continue;
                    }
                }
            };

            active.push(Subscription {
                id: row.id,
                user_id: row.user_id,
                keyword,
                match_mode: MatchMode::parse(&row.match_mode),
                filters,
            });
        }

        let count = active.len();
        *self.snapshot.write().unwrap() = Arc::new(active);
        info!(count, "refreshed subscriptions");
    }

    /// Refresher loop. The startup refresh happens before this is
    /// spawned, so the first tick is consumed up front.
    pub async fn run(
        self: Arc<Self>,
        refresh_interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut ticker = tokio::time::interval(refresh_interval);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!("stopping subscription refresher");
                    return;
                }
                _ = ticker.tick() => self.refresh().await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use feedgrep_datastore::SubscriptionRow;
    use uuid::Uuid;

    struct StaticSubscriptionStore {
        rows: Vec<SubscriptionRow>,
        fail: bool,
    }

    #[async_trait::async_trait]
    impl SubscriptionStore for StaticSubscriptionStore {
        async fn active_subscriptions_with_email(&self) -> Result<Vec<SubscriptionRow>> {
            if self.fail {
                anyhow::bail!("store unavailable");
            }
            Ok(self.rows.clone())
        }
    }

    fn row(id: i64, keyword: &str, email: &str, filters: serde_json::Value) -> SubscriptionRow {
        SubscriptionRow {
            id,
            user_id: Uuid::new_v4(),
            keyword: keyword.to_string(),
            match_mode: "broad".to_string(),
            filters,
            email: email.to_string(),
        }
    }

    #[tokio::test]
    async fn refresh_normalises_keywords_and_drops_empty_rows() {
        let store = Arc::new(StaticSubscriptionStore {
            rows: vec![
                row(1, "  GoLang  ", "user@example.com", serde_json::json!({})),
                row(2, "   ", "user@example.com", serde_json::json!({})),
                row(3, "rust", "   ", serde_json::json!({})),
            ],
            fail: false,
        });
        let cache = SubscriptionCache::new(store);

        cache.refresh().await;

        let snapshot = cache.current();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].keyword, "golang");
        assert_eq!(snapshot[0].match_mode, MatchMode::Broad);
    }

    #[tokio::test]
    async fn refresh_decodes_reddit_filters() {
        let filters = serde_json::json!({"reddit": {"subreddits": ["programming"]}});
        let store = Arc::new(StaticSubscriptionStore {
            rows: vec![
                row(1, "golang", "user@example.com", filters),
                row(2, "rust", "user@example.com", serde_json::Value::Null),
            ],
            fail: false,
        });
        let cache = SubscriptionCache::new(store);

        cache.refresh().await;

        let snapshot = cache.current();
        assert_eq!(snapshot.len(), 2);
        let reddit = snapshot[0].filters.as_ref().unwrap();
        assert_eq!(reddit.subreddits, vec!["programming"]);
        assert!(snapshot[1].filters.is_none());
    }

    #[tokio::test]
    async fn failed_refresh_keeps_previous_snapshot() {
        let good = Arc::new(StaticSubscriptionStore {
            rows: vec![row(1, "golang", "user@example.com", serde_json::json!({}))],
            fail: false,
        });
        let cache = SubscriptionCache::new(good);
        cache.refresh().await;
        assert_eq!(cache.current().len(), 1);

        let failing = SubscriptionCache {
            store: Arc::new(StaticSubscriptionStore {
                rows: vec![],
                fail: true,
            }),
            snapshot: RwLock::new(Arc::new(cache.current().as_ref().clone())),
        };
        failing.refresh().await;
        assert_eq!(failing.current().len(), 1);
    }
}

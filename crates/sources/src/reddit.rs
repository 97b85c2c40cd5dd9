use crate::cache::SubscriptionCache;
use crate::models::{RedditItem, RedditListing};
use crate::produce::collect_matches;
use crate::truncate_error;
use crate::user_agents::random_user_agent;
use anyhow::{anyhow, Result};
use chrono::Utc;
use feedgrep_datastore::{MatchPayload, MatchStore, NewMatch, Source};
use feedgrep_egress_pool::EgressPool;
use feedgrep_matcher::Subscription;
use reqwest::{header, Client, StatusCode};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::atomic::{self, AtomicI64};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, error, info};

const POSTS_URL: &str = "https://www.reddit.com/r/all/new/.json?limit=100";
const COMMENTS_URL: &str = "https://www.reddit.com/r/all/comments/.json?limit=100";
const RETRY_DELAY: Duration = Duration::from_millis(100);
const STATS_INTERVAL: Duration = Duration::from_secs(60);

struct ThroughputStats {
    posts_new: AtomicI64,
    comments_new: AtomicI64,
    post_polls: AtomicI64,
    comment_polls: AtomicI64,
    last_reset: Mutex<Instant>,
}

/// Polls Reddit's live new-posts and new-comments listings through the
/// egress pool, deduplicates items by id, evaluates every item against
/// the current subscriptions, and persists match batches.
pub struct RedditPoller {
    egress: Arc<EgressPool>,
    matches: Arc<dyn MatchStore>,
    subscriptions: Arc<SubscriptionCache>,
    post_interval: Duration,
    comment_interval: Duration,
    seen_posts: Mutex<HashSet<String>>,
    seen_comments: Mutex<HashSet<String>>,
    // Newest post fullname from the previous poll, used with "before"
    // (posts only, the comments listing has no pagination).
    last_newest_post: Mutex<Option<String>>,
    stats: ThroughputStats,
}

impl RedditPoller {
    pub fn new(
        egress: Arc<EgressPool>,
        matches: Arc<dyn MatchStore>,
        subscriptions: Arc<SubscriptionCache>,
        post_interval: Duration,
        comment_interval: Duration,
    ) -> Self {
        Self {
            egress,
            matches,
            subscriptions,
            post_interval,
            comment_interval,
            seen_posts: Mutex::new(HashSet::new()),
            seen_comments: Mutex::new(HashSet::new()),
            last_newest_post: Mutex::new(None),
            stats: ThroughputStats {
                posts_new: AtomicI64::new(0),
                comments_new: AtomicI64::new(0),
                post_polls: AtomicI64::new(0),
                comment_polls: AtomicI64::new(0),
                last_reset: Mutex::new(Instant::now()),
            },
        }
    }

    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!(
            subscriptions = self.subscriptions.current().len(),
            post_interval_ms = self.post_interval.as_millis() as u64,
            comment_interval_ms = self.comment_interval.as_millis() as u64,
            "starting reddit polling"
        );

        let mut post_ticker = tokio::time::interval(self.post_interval);
        let mut comment_ticker = tokio::time::interval(self.comment_interval);
        let mut stats_ticker = tokio::time::interval(STATS_INTERVAL);
        stats_ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!("stopping reddit polling");
                    return;
                }
                _ = post_ticker.tick() => {
                    // Each cycle runs on its own task so a slow upstream
                    // does not serialize subsequent ticks.
                    let poller = self.clone();
                    tokio::spawn(async move {
                        if !poller.poll_posts().await {
                            tokio::time::sleep(RETRY_DELAY).await;
                            poller.poll_posts().await;
                        }
                    });
                }
                _ = comment_ticker.tick() => {
                    let poller = self.clone();
                    tokio::spawn(async move {
                        if !poller.poll_comments().await {
                            tokio::time::sleep(RETRY_DELAY).await;
                            poller.poll_comments().await;
                        }
                    });
                }
                _ = stats_ticker.tick() => self.log_stats(),
            }
        }
    }

    async fn poll_posts(&self) -> bool {
        let mut url = POSTS_URL.to_string();
        if let Some(before) = self.last_newest_post.lock().unwrap().clone() {
            url.push_str("&before=");
            url.push_str(&before);
        }

        let (client, egress_host) = self.egress.next().await;
        let (listing, request_ms) = match self.fetch_reddit(&client, &egress_host, &url).await {
            Ok(result) => result,
            Err(e) => {
                debug!(egress = %egress_host, error = %truncate_error(&e), "poll posts");
                return false;
            }
        };
        let processing_start = Instant::now();

        if listing.data.children.is_empty() {
            return true;
        }

        let newest = listing.data.children[0].data.clone();
        let (matches, new_count) = self.process_posts(&listing);

        if !matches.is_empty() {
            if let Err(e) = self.matches.create_matches(&matches).await {
                error!(error = %e, "failed to store matches");
            }
        }

        *self.last_newest_post.lock().unwrap() = Some(newest.name.clone());

        self.stats
            .posts_new
            .fetch_add(new_count, atomic::Ordering::Relaxed);
        self.stats.post_polls.fetch_add(1, atomic::Ordering::Relaxed);

        let lag_seconds = Utc::now().timestamp() - newest.created_utc as i64;
        debug!(
            egress = %egress_host,
            new = new_count,
            matches = matches.len(),
            lag_seconds,
            request_ms,
            processing_ms = processing_start.elapsed().as_millis() as u64,
            "processed posts"
        );
        true
    }

    async fn poll_comments(&self) -> bool {
        let (client, egress_host) = self.egress.next().await;
        let (listing, request_ms) = match self
            .fetch_reddit(&client, &egress_host, COMMENTS_URL)
            .await
        {
            Ok(result) => result,
            Err(e) => {
                debug!(egress = %egress_host, error = %truncate_error(&e), "poll comments");
                return false;
            }
        };
        let processing_start = Instant::now();

        if listing.data.children.is_empty() {
            return true;
        }

        let newest = listing.data.children[0].data.clone();
        let (matches, new_count) = self.process_comments(&listing);

        if !matches.is_empty() {
            if let Err(e) = self.matches.create_matches(&matches).await {
                error!(error = %e, "failed to store matches");
            }
        }

        self.stats
            .comments_new
            .fetch_add(new_count, atomic::Ordering::Relaxed);
        self.stats
            .comment_polls
            .fetch_add(1, atomic::Ordering::Relaxed);

        if new_count as usize == listing.data.children.len() && new_count >= 100 {
            debug!(egress = %egress_host, new = new_count, "all comments are new, likely missing some");
        }

        let lag_seconds = Utc::now().timestamp() - newest.created_utc as i64;
        debug!(
            egress = %egress_host,
            new = new_count,
            matches = matches.len(),
            lag_seconds,
            request_ms,
            processing_ms = processing_start.elapsed().as_millis() as u64,
            "processed comments"
        );
        true
    }

    /// Runs every unseen post through the subscriptions. Returns the
    /// produced matches and how many items were new.
    fn process_posts(&self, listing: &RedditListing) -> (Vec<NewMatch>, i64) {
        let subscriptions = self.subscriptions.current();
        let mut matches = Vec::with_capacity(32);
        let mut new_count = 0;

        let mut seen = self.seen_posts.lock().unwrap();
        for child in &listing.data.children {
            let post = &child.data;
            if !seen.insert(post.id.clone()) {
                continue;
            }
            new_count += 1;

            let text = format!("{} {}", post.title, post.selftext);
            collect_matches(
                &subscriptions,
                &text,
                &post.subreddit,
                &post.id,
                Source::Reddit,
                |sub| live_payload(sub, post, false),
                &mut matches,
            );
        }

        (matches, new_count)
    }

    fn process_comments(&self, listing: &RedditListing) -> (Vec<NewMatch>, i64) {
        let subscriptions = self.subscriptions.current();
        let mut matches = Vec::with_capacity(32);
        let mut new_count = 0;

        let mut seen = self.seen_comments.lock().unwrap();
        for child in &listing.data.children {
            let comment = &child.data;
            if !seen.insert(comment.id.clone()) {
                continue;
            }
            new_count += 1;

            collect_matches(
                &subscriptions,
                &comment.body,
                &comment.subreddit,
                &comment.id,
                Source::Reddit,
                |sub| live_payload(sub, comment, true),
                &mut matches,
            );
        }

        (matches, new_count)
    }

    async fn fetch_reddit(
        &self,
        client: &Client,
        egress_host: &str,
        url: &str,
    ) -> Result<(RedditListing, u64)> {
        // Browser-like headers to avoid listing blocks.
        let request = client
            .get(url)
            .header(header::USER_AGENT, random_user_agent())
            .header(
                header::ACCEPT,
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            )
            .header(header::ACCEPT_LANGUAGE, "en-US,en;q=0.9")
            .header("DNT", "1")
            .header(header::CONNECTION, "keep-alive")
            .header("Upgrade-Insecure-Requests", "1");

        let start = Instant::now();
        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                let request_ms = start.elapsed().as_millis() as u64;
                self.egress.mark_failure(egress_host);
                return Err(anyhow!("({}ms) {}", request_ms, e));
            }
        };
        let request_ms = start.elapsed().as_millis() as u64;

        let status = response.status();
        if !status.is_success() {
            self.egress.mark_failure(egress_host);
            if status == StatusCode::TOO_MANY_REQUESTS {
                self.egress.mark_rate_limited(egress_host);
            }
            return Err(anyhow!("status {}", status.as_u16()));
        }

        let listing = match response.json::<RedditListing>().await {
            Ok(listing) => listing,
            Err(e) => {
                self.egress.mark_failure(egress_host);
                return Err(e.into());
            }
        };

        self.egress.mark_success(egress_host);
        Ok((listing, request_ms))
    }

    fn log_stats(&self) {
        let elapsed = {
            let mut last_reset = self.stats.last_reset.lock().unwrap();
            let elapsed = last_reset.elapsed();
            *last_reset = Instant::now();
            elapsed
        };

        let posts_new = self.stats.posts_new.swap(0, atomic::Ordering::Relaxed);
        let comments_new = self.stats.comments_new.swap(0, atomic::Ordering::Relaxed);
        let post_polls = self.stats.post_polls.swap(0, atomic::Ordering::Relaxed);
        let comment_polls = self.stats.comment_polls.swap(0, atomic::Ordering::Relaxed);

        let elapsed_sec = elapsed.as_secs_f64().max(f64::EPSILON);
        info!(
            elapsed_sec = format!("{:.1}", elapsed_sec),
            posts_new,
            posts_per_min = format!("{:.1}", posts_new as f64 / elapsed_sec * 60.0),
            post_polls,
            comments_new,
            comments_per_min = format!("{:.1}", comments_new as f64 / elapsed_sec * 60.0),
            comment_polls,
            seen_posts_total = self.seen_posts.lock().unwrap().len(),
            seen_comments_total = self.seen_comments.lock().unwrap().len(),
            "throughput stats"
        );

        let stats = self.egress.stats();
        if stats.is_empty() {
            return;
        }

        let mut sorted: Vec<(String, u64, u64, f64)> = stats
            .into_iter()
            .map(|(host, s)| {
                let total = s.successes + s.failures;
                let rate = if total > 0 {
                    s.successes as f64 / total as f64 * 100.0
                } else {
                    0.0
                };
                (host, s.successes, s.failures, rate)
            })
            .collect();
        sorted.sort_by(|a, b| b.3.partial_cmp(&a.3).unwrap_or(Ordering::Equal));

        info!("egress stats - top performers");
        for (host, successes, failures, rate) in sorted.iter().take(5) {
            info!(host = %host, successes, failures, rate = format!("{:.1}%", rate), "egress");
        }

        if sorted.len() > 5 {
            info!("egress stats - worst performers");
            let worst_from = sorted.len().saturating_sub(5).max(5);
            for (host, successes, failures, rate) in &sorted[worst_from..] {
                info!(host = %host, successes, failures, rate = format!("{:.1}%", rate), "egress");
            }
        }
    }
}

fn live_payload(sub: &Subscription, item: &RedditItem, is_comment: bool) -> MatchPayload {
    MatchPayload {
        keyword: sub.keyword.clone(),
        subreddit: item.subreddit.clone(),
        author: item.author.clone(),
        title: if is_comment {
            String::new()
        } else {
            item.title.clone()
        },
        body: if is_comment {
            item.body.clone()
        } else {
            item.selftext.clone()
        },
        permalink: item.permalink.clone(),
        is_comment,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RedditChild, RedditListingData};
    use anyhow::Result;
    use chrono::{DateTime, Utc};
    use feedgrep_datastore::{Match, SubscriptionRow, SubscriptionStore};
    use uuid::Uuid;

    struct RecordingMatchStore {
        created: Mutex<Vec<NewMatch>>,
    }

    #[async_trait::async_trait]
    impl MatchStore for RecordingMatchStore {
        async fn create_matches(&self, matches: &[NewMatch]) -> Result<()> {
            self.created.lock().unwrap().extend_from_slice(matches);
            Ok(())
        }

        async fn unnotified_matches(&self) -> Result<Vec<Match>> {
            Ok(Vec::new())
        }

        async fn mark_notified(&self, _ids: &[i64], _at: DateTime<Utc>) -> Result<()> {
            Ok(())
        }
    }

    struct StaticSubscriptionStore {
        rows: Vec<SubscriptionRow>,
    }

    #[async_trait::async_trait]
    impl SubscriptionStore for StaticSubscriptionStore {
        async fn active_subscriptions_with_email(&self) -> Result<Vec<SubscriptionRow>> {
            Ok(self.rows.clone())
        }
    }

    fn listing(items: Vec<RedditItem>) -> RedditListing {
        RedditListing {
            data: RedditListingData {
                children: items
                    .into_iter()
                    .map(|data| RedditChild { data })
                    .collect(),
            },
        }
    }

    fn post(id: &str, title: &str, subreddit: &str) -> RedditItem {
        RedditItem {
            id: id.to_string(),
            name: format!("t3_{}", id),
            title: title.to_string(),
            subreddit: subreddit.to_string(),
            permalink: format!("/r/{}/comments/{}", subreddit, id),
            ..Default::default()
        }
    }

    async fn poller_with_keyword(keyword: &str) -> (Arc<RedditPoller>, Arc<RecordingMatchStore>) {
        let store = Arc::new(RecordingMatchStore {
            created: Mutex::new(Vec::new()),
        });
        let subscriptions = Arc::new(SubscriptionCache::new(Arc::new(StaticSubscriptionStore {
            rows: vec![SubscriptionRow {
                id: 1,
                user_id: Uuid::new_v4(),
                keyword: keyword.to_string(),
                match_mode: "broad".to_string(),
                filters: serde_json::json!({}),
                email: "user@example.com".to_string(),
            }],
        })));
        subscriptions.refresh().await;

        let egress = Arc::new(EgressPool::new(&[String::new()]).unwrap());
        let poller = Arc::new(RedditPoller::new(
            egress,
            store.clone(),
            subscriptions,
            Duration::from_secs(2),
            Duration::from_secs(2),
        ));
        (poller, store)
    }

    #[tokio::test]
    async fn posts_are_deduplicated_across_polls() {
        let (poller, _) = poller_with_keyword("golang").await;

        let first = listing(vec![
            post("p1", "i love Golang", "programming"),
            post("p2", "unrelated", "pics"),
        ]);
        let (matches, new_count) = poller.process_posts(&first);
        assert_eq!(new_count, 2);
        assert_eq!(matches.len(), 1);

        // Same page again: nothing new, nothing matched.
        let (matches, new_count) = poller.process_posts(&first);
        assert_eq!(new_count, 0);
        assert!(matches.is_empty());
    }

    #[tokio::test]
    async fn post_match_payload_captures_the_item() {
        let (poller, _) = poller_with_keyword("golang").await;

        let (matches, _) = poller.process_posts(&listing(vec![post(
            "p1",
            "i love Golang",
            "programming",
        )]));

        assert_eq!(matches.len(), 1);
        let payload: MatchPayload = serde_json::from_value(matches[0].data.clone()).unwrap();
        assert_eq!(payload.keyword, "golang");
        assert_eq!(payload.permalink, "/r/programming/comments/p1");
        assert!(!payload.is_comment);
        assert_eq!(matches[0].match_hash.len(), 64);
    }

    #[tokio::test]
    async fn comment_matches_use_the_body_and_flag() {
        let (poller, _) = poller_with_keyword("golang").await;

        let comment = RedditItem {
            id: "c1".to_string(),
            name: "t1_c1".to_string(),
            body: "try golang for this".to_string(),
            subreddit: "programming".to_string(),
            permalink: "/r/programming/comments/p1/_/c1".to_string(),
            ..Default::default()
        };
        let (matches, new_count) = poller.process_comments(&listing(vec![comment]));

        assert_eq!(new_count, 1);
        assert_eq!(matches.len(), 1);
        let payload: MatchPayload = serde_json::from_value(matches[0].data.clone()).unwrap();
        assert!(payload.is_comment);
        assert_eq!(payload.body, "try golang for this");
        assert!(payload.title.is_empty());
    }

    #[tokio::test]
    async fn posts_and_comments_have_independent_seen_sets() {
        let (poller, _) = poller_with_keyword("golang").await;

        let item = post("x1", "golang news", "programming");
        let (_, new_posts) = poller.process_posts(&listing(vec![item.clone()]));
        let (_, new_comments) = poller.process_comments(&listing(vec![item]));

        assert_eq!(new_posts, 1);
        assert_eq!(new_comments, 1);
    }
}

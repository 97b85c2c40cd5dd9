use crate::cache::SubscriptionCache;
use crate::models::{ArcticShiftComment, ArcticShiftPost, ArcticShiftSearchResponse};
use crate::produce::collect_matches;
use crate::truncate_error;
use anyhow::{anyhow, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use feedgrep_datastore::{MatchPayload, MatchStore, NewMatch, Source};
use feedgrep_matcher::Subscription;
use reqwest::{header, Client};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, error, info};

const BASE_URL: &str = "https://arctic-shift.photon-reddit.com/api";
const POSTS_FIELDS: &str = "id,subreddit,author,title,selftext,created_utc";
const COMMENTS_FIELDS: &str = "id,subreddit,author,body,link_id,parent_id,created_utc";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const RETRY_DELAY: Duration = Duration::from_millis(100);
const STATS_INTERVAL: Duration = Duration::from_secs(60);

/// Polls the ArcticShift archive search API with an advancing
/// `created_utc` cursor for posts and comments. Restart deduplication
/// relies entirely on the match-hash uniqueness constraint, so there is
/// no in-memory seen-set.
pub struct ArcticShiftPoller {
    client: Client,
    matches: Arc<dyn MatchStore>,
    subscriptions: Arc<SubscriptionCache>,
    poll_interval: Duration,
    last_post_created: i64,
    last_comment_created: i64,
    posts_total: i64,
    comments_total: i64,
    posts_window: i64,
    comments_window: i64,
    window_start: Instant,
}

impl ArcticShiftPoller {
    pub fn new(
        matches: Arc<dyn MatchStore>,
        subscriptions: Arc<SubscriptionCache>,
        poll_interval: Duration,
    ) -> Result<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        Ok(Self {
            client,
            matches,
            subscriptions,
            poll_interval,
            last_post_created: 0,
            last_comment_created: 0,
            posts_total: 0,
            comments_total: 0,
            posts_window: 0,
            comments_window: 0,
            window_start: Instant::now(),
        })
    }

    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            "starting arcticshift polling"
        );

        let mut ticker = tokio::time::interval(self.poll_interval);
        let mut stats_ticker = tokio::time::interval(STATS_INTERVAL);
        stats_ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!("stopping arcticshift polling");
                    return;
                }
                // Posts then comments run in-line: the cursor advance
                // must not race a second tick.
                _ = ticker.tick() => {
                    if !self.poll_posts().await {
                        tokio::time::sleep(RETRY_DELAY).await;
                        self.poll_posts().await;
                    }
                    if !self.poll_comments().await {
                        tokio::time::sleep(RETRY_DELAY).await;
                        self.poll_comments().await;
                    }
                }
                _ = stats_ticker.tick() => self.log_throughput(),
            }
        }
    }

    async fn poll_posts(&mut self) -> bool {
        let url = format!("{}/posts/search", BASE_URL);
        let query = search_query(self.last_post_created, POSTS_FIELDS);

        let (response, request_ms) = match self
            .fetch::<ArcticShiftPost>(&url, &query)
            .await
        {
            Ok(result) => result,
            Err(e) => {
                debug!(error = %truncate_error(&e), "poll posts");
                return false;
            }
        };
        let processing_start = Instant::now();

        if response.data.is_empty() {
            return true;
        }

        let subscriptions = self.subscriptions.current();
        let mut matches = Vec::with_capacity(32);
        let mut newest = 0i64;
        let mut processed = 0i64;

        for post in &response.data {
            if post.id.is_empty() {
                continue;
            }
            processed += 1;
            newest = newest.max(post.created_utc);

            let permalink = build_post_permalink(&post.subreddit, &post.id);
            if permalink.is_empty() {
                // Without a permalink the hash would be degenerate.
                continue;
            }

            let text = format!("{} {}", post.title, post.selftext);
            collect_matches(
                &subscriptions,
                &text,
                &post.subreddit,
                &post.id,
                Source::ArcticShift,
                |sub| archive_post_payload(sub, post, &permalink),
                &mut matches,
            );
        }

        self.persist(&matches).await;

        if newest > self.last_post_created {
            self.last_post_created = newest;
        }
        self.posts_total += processed;
        self.posts_window += processed;

        let lag_seconds = if newest > 0 {
            Utc::now().timestamp() - newest
        } else {
            0
        };
        info!(
            count = processed,
            matches = matches.len(),
            request_ms,
            processing_ms = processing_start.elapsed().as_millis() as u64,
            lag_seconds,
            "processed posts"
        );
        true
    }

    async fn poll_comments(&mut self) -> bool {
        let url = format!("{}/comments/search", BASE_URL);
        let query = search_query(self.last_comment_created, COMMENTS_FIELDS);

        let (response, request_ms) = match self
            .fetch::<ArcticShiftComment>(&url, &query)
            .await
        {
            Ok(result) => result,
            Err(e) => {
                debug!(error = %truncate_error(&e), "poll comments");
                return false;
            }
        };
        let processing_start = Instant::now();

        if response.data.is_empty() {
            return true;
        }

        let subscriptions = self.subscriptions.current();
        let mut matches = Vec::with_capacity(32);
        let mut newest = 0i64;
        let mut processed = 0i64;

        for comment in &response.data {
            if comment.id.is_empty() {
                continue;
            }
            processed += 1;
            newest = newest.max(comment.created_utc);

            let permalink =
                build_comment_permalink(&comment.subreddit, &comment.link_id, &comment.id);
            if permalink.is_empty() {
                continue;
            }

            collect_matches(
                &subscriptions,
                &comment.body,
                &comment.subreddit,
                &comment.id,
                Source::ArcticShift,
                |sub| archive_comment_payload(sub, comment, &permalink),
                &mut matches,
            );
        }

        self.persist(&matches).await;

        if newest > self.last_comment_created {
            self.last_comment_created = newest;
        }
        self.comments_total += processed;
        self.comments_window += processed;

        let lag_seconds = if newest > 0 {
            Utc::now().timestamp() - newest
        } else {
            0
        };
        info!(
            count = processed,
            matches = matches.len(),
            request_ms,
            processing_ms = processing_start.elapsed().as_millis() as u64,
            lag_seconds,
            "processed comments"
        );
        true
    }

    async fn persist(&self, matches: &[NewMatch]) {
        if matches.is_empty() {
            return;
        }
        if let Err(e) = self.matches.create_matches(matches).await {
            error!(error = %e, "failed to store matches");
        }
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<(ArcticShiftSearchResponse<T>, u64)> {
        let start = Instant::now();
        let response = self
            .client
            .get(url)
            .query(query)
            .header(header::USER_AGENT, "feedgrep")
            .send()
            .await
            .map_err(|e| anyhow!("({}ms) {}", start.elapsed().as_millis() as u64, e))?;
        let request_ms = start.elapsed().as_millis() as u64;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("status {}", status.as_u16()));
        }

        let parsed = response.json::<ArcticShiftSearchResponse<T>>().await?;
        Ok((parsed, request_ms))
    }

    fn log_throughput(&mut self) {
        let elapsed_min = self.window_start.elapsed().as_secs_f64() / 60.0;
        if elapsed_min <= 0.0 {
            return;
        }

        info!(
            posts_total = self.posts_total,
            comments_total = self.comments_total,
            posts_per_min = format!("{:.1}", self.posts_window as f64 / elapsed_min),
            comments_per_min = format!("{:.1}", self.comments_window as f64 / elapsed_min),
            "arcticshift throughput"
        );

        self.posts_window = 0;
        self.comments_window = 0;
        self.window_start = Instant::now();
    }
}

/// First request seeds from the newest items; once a cursor exists, ask
/// for strictly newer items in ascending order.
fn search_query(cursor: i64, fields: &str) -> Vec<(&'static str, String)> {
    if cursor > 0 {
        vec![
            ("limit", "auto".to_string()),
            ("sort", "asc".to_string()),
            ("after", cursor_rfc3339(cursor)),
            ("fields", fields.to_string()),
        ]
    } else {
        vec![
            ("limit", "auto".to_string()),
            ("sort", "desc".to_string()),
            ("fields", fields.to_string()),
        ]
    }
}

fn cursor_rfc3339(cursor: i64) -> String {
    DateTime::<Utc>::from_timestamp(cursor, 0)
        .unwrap_or_default()
        .to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn archive_post_payload(sub: &Subscription, post: &ArcticShiftPost, permalink: &str) -> MatchPayload {
    MatchPayload {
        keyword: sub.keyword.clone(),
        subreddit: post.subreddit.clone(),
        author: post.author.clone(),
        title: post.title.clone(),
        body: post.selftext.clone(),
        permalink: permalink.to_string(),
        is_comment: false,
    }
}

fn archive_comment_payload(
    sub: &Subscription,
    comment: &ArcticShiftComment,
    permalink: &str,
) -> MatchPayload {
    MatchPayload {
        keyword: sub.keyword.clone(),
        subreddit: comment.subreddit.clone(),
        author: comment.author.clone(),
        title: String::new(),
        body: comment.body.clone(),
        permalink: permalink.to_string(),
        is_comment: true,
    }
}

fn build_post_permalink(subreddit: &str, post_id: &str) -> String {
    if subreddit.is_empty() || post_id.is_empty() {
        return String::new();
    }
    format!("/r/{}/comments/{}", subreddit, post_id)
}

// The archive API carries no permalink; the post id comes from link_id
// with its "t3_" fullname prefix stripped.
fn build_comment_permalink(subreddit: &str, link_id: &str, comment_id: &str) -> String {
    if subreddit.is_empty() || comment_id.is_empty() {
        return String::new();
    }
    let post_id = link_id.strip_prefix("t3_").unwrap_or(link_id);
    if post_id.is_empty() {
        return String::new();
    }
    format!("/r/{}/comments/{}/_/{}", subreddit, post_id, comment_id)
}

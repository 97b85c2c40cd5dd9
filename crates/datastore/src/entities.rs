use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::FromRow;
use std::fmt;
use uuid::Uuid;

/// A registered user. Rows are created by the external account surface;
/// the pipeline only reads `id` and `email`.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub display_name: String,
    pub email: String,
    pub avatar: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A keyword subscription row as stored. `filters` is the raw JSONB
/// column; the subscription cache decodes it.
#[derive(Debug, Clone, FromRow)]
pub struct Keyword {
    pub id: i64,
    pub user_id: Uuid,
    pub keyword: String,
    pub active: bool,
    pub match_mode: String,
    pub filters: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Projection used by the subscription cache: active keywords joined with
/// the owning user's email.
#[derive(Debug, Clone, FromRow)]
pub struct SubscriptionRow {
    pub id: i64,
    pub user_id: Uuid,
    pub keyword: String,
    pub match_mode: String,
    pub filters: serde_json::Value,
    pub email: String,
}

/// Which upstream feed produced a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Reddit,
    ArcticShift,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Reddit => "reddit",
            Source::ArcticShift => "arcticshift",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted keyword hit. Immutable except for the one-shot
/// `notified_at` transition applied by the notifier.
#[derive(Debug, Clone, FromRow)]
pub struct Match {
    pub id: i64,
    pub user_id: Uuid,
    pub keyword_id: Option<i64>,
    pub source: String,
    pub match_hash: String,
    pub data: serde_json::Value,
    pub notified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Match {
    /// Decodes the stored JSON payload.
    pub fn payload(&self) -> Result<MatchPayload> {
        serde_json::from_value(self.data.clone()).context("decode match payload")
    }
}

/// A match ready for insertion. `created_at` is stamped by the database.
#[derive(Debug, Clone)]
pub struct NewMatch {
    pub user_id: Uuid,
    pub keyword_id: Option<i64>,
    pub source: Source,
    pub match_hash: String,
    pub data: serde_json::Value,
}

impl NewMatch {
    pub fn new(
        user_id: Uuid,
        keyword_id: i64,
        source: Source,
        payload: MatchPayload,
    ) -> Result<Self> {
        let match_hash = build_match_hash(user_id, keyword_id, source, &payload.permalink);
        let data = serde_json::to_value(&payload).context("encode match payload")?;

        Ok(Self {
            user_id,
            keyword_id: Some(keyword_id),
            source,
            match_hash,
            data,
        })
    }
}

/// The JSON payload stored on a Reddit match.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchPayload {
    pub keyword: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub subreddit: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub author: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub title: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub body: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub permalink: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_comment: bool,
}

/// The Match uniqueness key: SHA-256 of
/// `{user_id}:{keyword_id}:{source}:{permalink}`, lower-case hex.
pub fn build_match_hash(user_id: Uuid, keyword_id: i64, source: Source, permalink: &str) -> String {
    let input = format!("{}:{}:{}:{}", user_id, keyword_id, source, permalink);
    let digest = Sha256::digest(input.as_bytes());
    hex::encode(digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn match_hash_is_64_lowercase_hex_chars() {
        let hash = build_match_hash(
            Uuid::new_v4(),
            7,
            Source::Reddit,
            "/r/programming/comments/p1",
        );
        assert_eq!(hash.len(), 64);
        assert!(hash
            .chars()
            .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn match_hash_is_deterministic() {
        let user_id = Uuid::new_v4();
        let a = build_match_hash(user_id, 7, Source::Reddit, "/r/a/comments/x");
        let b = build_match_hash(user_id, 7, Source::Reddit, "/r/a/comments/x");
        assert_eq!(a, b);
    }

    #[test]
    fn match_hash_separates_sources() {
        let user_id = Uuid::new_v4();
        let live = build_match_hash(user_id, 7, Source::Reddit, "/r/a/comments/x");
        let archive = build_match_hash(user_id, 7, Source::ArcticShift, "/r/a/comments/x");
        assert_ne!(live, archive);
    }

    #[test]
    fn match_hash_matches_known_digest() {
        // sha256("00000000-0000-0000-0000-000000000000:1:reddit:/r/a/comments/x")
        let hash = build_match_hash(Uuid::nil(), 1, Source::Reddit, "/r/a/comments/x");
        let input = "00000000-0000-0000-0000-000000000000:1:reddit:/r/a/comments/x";
        assert_eq!(hash, hex::encode(Sha256::digest(input.as_bytes())));
    }

    #[test]
    fn payload_round_trips_through_json() {
        let payload = MatchPayload {
            keyword: "golang".to_string(),
            subreddit: "programming".to_string(),
            author: "someone".to_string(),
            title: "i love Golang".to_string(),
            body: "body text".to_string(),
            permalink: "/r/programming/comments/p1".to_string(),
            is_comment: false,
        };

        let new_match = NewMatch::new(Uuid::new_v4(), 1, Source::Reddit, payload.clone()).unwrap();
        let decoded: MatchPayload = serde_json::from_value(new_match.data).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn payload_omits_empty_fields_on_encode() {
        let payload = MatchPayload {
            keyword: "golang".to_string(),
            body: "just a comment".to_string(),
            permalink: "/r/a/comments/x/_/c".to_string(),
            is_comment: true,
            ..Default::default()
        };

        let value = serde_json::to_value(&payload).unwrap();
        let object = value.as_object().unwrap();
        assert!(!object.contains_key("title"));
        assert!(!object.contains_key("subreddit"));
        assert!(object.contains_key("is_comment"));
    }
}

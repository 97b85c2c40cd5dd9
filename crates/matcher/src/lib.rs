pub mod filters;
pub mod mode;
pub mod text;

pub use filters::{matches_subreddit, KeywordFilters, RedditFilters};
pub use mode::MatchMode;
pub use text::{matches_partially, matches_whole_word};

use std::fmt;
use uuid::Uuid;

/// Errors produced while evaluating a subscription against an item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatcherError {
    /// The subscription carries a match mode the matcher does not know.
    InvalidMode { mode: String },
    /// Both include and exclude subreddit lists are populated.
    ConflictingFilters,
}

impl fmt::Display for MatcherError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatcherError::InvalidMode { mode } => write!(f, "invalid match mode: {}", mode),
            MatcherError::ConflictingFilters => {
                write!(f, "cannot have both include and exclude subreddit filters")
            }
        }
    }
}

impl std::error::Error for MatcherError {}

/// An effective keyword subscription: active, owned by a user with a
/// deliverable email, keyword already trimmed and lower-cased.
#[derive(Debug, Clone)]
pub struct Subscription {
    pub id: i64,
    pub user_id: Uuid,
    pub keyword: String,
    pub match_mode: MatchMode,
    pub filters: Option<RedditFilters>,
}

impl Subscription {
    /// Evaluates this subscription against an item's text and subreddit.
    ///
    /// The text is compared lower-cased; the subreddit is compared
    /// case-insensitively against the filter lists.
    pub fn matches(&self, text: &str, subreddit: &str) -> Result<bool, MatcherError> {
        let text_lower = text.to_lowercase();

        match self.match_mode {
            MatchMode::Invalid => {
                return Err(MatcherError::InvalidMode {
                    mode: self.match_mode.to_string(),
                })
            }
            MatchMode::Exact => {
                if !matches_whole_word(&text_lower, &self.keyword) {
                    return Ok(false);
                }
            }
            MatchMode::Broad => {
                if !matches_partially(&text_lower, &self.keyword) {
                    return Ok(false);
                }
            }
        }

        if let Some(filters) = &self.filters {
            if !matches_subreddit(filters, subreddit)? {
                return Ok(false);
            }
        }

        Ok(true)
    }
}

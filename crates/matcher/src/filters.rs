use crate::MatcherError;
use serde::{Deserialize, Serialize};

/// Source-specific filter container stored on a keyword row.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeywordFilters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reddit: Option<RedditFilters>,
}

/// Include/exclude subreddit lists for the Reddit source. Both may be
/// empty; both populated at once is rejected at match time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RedditFilters {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subreddits: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude_subreddits: Vec<String>,
}

/// Tests a subreddit against the include/exclude lists, case-insensitively.
///
/// An empty include list with a populated exclude list means "allow all
/// except excluded".
pub fn matches_subreddit(filters: &RedditFilters, subreddit: &str) -> Result<bool, MatcherError> {
    if !filters.subreddits.is_empty() && !filters.exclude_subreddits.is_empty() {
        return Err(MatcherError::ConflictingFilters);
    }

    if !filters.exclude_subreddits.is_empty() {
        let excluded = filters
            .exclude_subreddits
            .iter()
            .any(|s| s.eq_ignore_ascii_case(subreddit));
        return Ok(!excluded);
    }

    if !filters.subreddits.is_empty() {
        let included = filters
            .subreddits
            .iter()
            .any(|s| s.eq_ignore_ascii_case(subreddit));
        return Ok(included);
    }

    Ok(true)
}

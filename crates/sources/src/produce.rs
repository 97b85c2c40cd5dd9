use feedgrep_datastore::{MatchPayload, NewMatch, Source};
use feedgrep_matcher::Subscription;
use tracing::error;

/// Shared match-production core for both source pollers: evaluates one
/// item's text against every subscription and appends a `NewMatch` per
/// hit. `payload_for` supplies the source-specific payload (and through
/// it the permalink the hash is built from). Matcher and construction
/// errors skip the subscription and keep the batch going.
pub(crate) fn collect_matches<F>(
    subscriptions: &[Subscription],
    text: &str,
    subreddit: &str,
    item_id: &str,
    source: Source,
    payload_for: F,
    out: &mut Vec<NewMatch>,
) where
    F: Fn(&Subscription) -> MatchPayload,
{
    for sub in subscriptions {
        match sub.matches(text, subreddit) {
            Ok(true) => {}
            Ok(false) => continue,
            Err(e) => {
                error!(error = %e, item_id = %item_id, keyword_id = sub.id, "failed to check match");
                continue;
            }
        }

        match NewMatch::new(sub.user_id, sub.id, source, payload_for(sub)) {
            Ok(new_match) => out.push(new_match),
            Err(e) => {
                error!(error = %e, item_id = %item_id, keyword_id = sub.id, "failed to make match");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use feedgrep_matcher::{MatchMode, RedditFilters};
    use uuid::Uuid;

    fn subscription(keyword: &str, mode: MatchMode, filters: Option<RedditFilters>) -> Subscription {
        Subscription {
            id: 1,
            user_id: Uuid::new_v4(),
            keyword: keyword.to_string(),
            match_mode: mode,
            filters,
        }
    }

    fn payload(sub: &Subscription) -> MatchPayload {
        MatchPayload {
            keyword: sub.keyword.clone(),
            subreddit: "programming".to_string(),
            permalink: "/r/programming/comments/p1".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn produces_one_match_per_hitting_subscription() {
        let subs = vec![
            subscription("golang", MatchMode::Broad, None),
            subscription("rust", MatchMode::Broad, None),
        ];
        let mut out = Vec::new();

        collect_matches(
            &subs,
            "i love Golang",
            "programming",
            "p1",
            Source::Reddit,
            payload,
            &mut out,
        );

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].keyword_id, Some(1));
    }

    #[test]
    fn conflicting_filters_skip_the_subscription_not_the_item() {
        let conflicted = RedditFilters {
            subreddits: vec!["programming".to_string()],
            exclude_subreddits: vec!["programming".to_string()],
        };
        let subs = vec![
            subscription("golang", MatchMode::Broad, Some(conflicted)),
            subscription("golang", MatchMode::Broad, None),
        ];
        let mut out = Vec::new();

        collect_matches(
            &subs,
            "golang tips",
            "programming",
            "p1",
            Source::Reddit,
            payload,
            &mut out,
        );

        assert_eq!(out.len(), 1);
    }
}

use crate::mailer::Mailer;
use anyhow::{anyhow, Context, Result};
use feedgrep_datastore::{Match, MatchPayload};
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::info;

const SUBJECT: &str = "feedgrep: new mentions";
const DIGEST_MAX_ITEMS: usize = 10;
const SINGLE_BODY_LIMIT: usize = 500;
const DIGEST_BODY_LIMIT: usize = 300;

/// SMTP-backed mailer. Owns the HTML rendering of single-match and
/// digest emails.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    app_base: String,
}

impl SmtpMailer {
    pub fn new(host: &str, port: u16, from: &str, password: &str, app_base: &str) -> Result<Self> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(host)
            .context("build smtp transport")?
            .port(port)
            .credentials(Credentials::new(from.to_string(), password.to_string()))
            .build();

        let from = format!("feedgrep <{}>", from)
            .parse()
            .context("parse smtp from address")?;

        Ok(Self {
            transport,
            from,
            app_base: app_base.trim_end_matches('/').to_string(),
        })
    }

    async fn send(&self, to: &str, body: String) -> Result<()> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(to.parse().context("parse recipient address")?)
            .subject(SUBJECT)
            .header(ContentType::TEXT_HTML)
            .body(body)
            .context("build email")?;

        self.transport.send(message).await.context("send email")?;
        info!(recipient = %to, subject = SUBJECT, "email sent");
        Ok(())
    }

    fn keyword_config_url(&self, keyword_id: Option<i64>) -> String {
        match keyword_id {
            Some(id) if !self.app_base.is_empty() && id > 0 => {
                format!("{}/keywords/{}/edit", self.app_base, id)
            }
            _ => String::new(),
        }
    }

    fn render_match(&self, m: &Match) -> Result<String> {
        let payload = m.payload()?;
        Ok(render_match_body(
            &payload,
            &self.keyword_config_url(m.keyword_id),
        ))
    }

    /// Renders up to the first ten decodable matches plus a remainder
    /// count. Fails only when no match decodes at all.
    fn render_digest(&self, matches: &[Match]) -> Result<String> {
        let mut items = Vec::with_capacity(DIGEST_MAX_ITEMS);
        let mut total = 0;

        for m in matches {
            let payload = match m.payload() {
                Ok(payload) => payload,
                Err(_) => continue,
            };
            total += 1;
            if items.len() >= DIGEST_MAX_ITEMS {
                continue;
            }
            items.push((payload, self.keyword_config_url(m.keyword_id)));
        }

        if total == 0 {
            return Err(anyhow!("no valid matches"));
        }

        let remaining = total - items.len();
        Ok(render_digest_body(&items, remaining))
    }
}

#[async_trait::async_trait]
impl Mailer for SmtpMailer {
    async fn send_match(&self, user_email: &str, m: &Match) -> Result<()> {
        let body = self.render_match(m)?;
        self.send(user_email, body).await
    }

    async fn send_digest(&self, user_email: &str, matches: &[Match]) -> Result<()> {
        let body = self.render_digest(matches)?;
        self.send(user_email, body).await
    }
}

fn match_type(payload: &MatchPayload) -> &'static str {
    if payload.is_comment {
        "Comment"
    } else {
        "Post"
    }
}

fn item_url(permalink: &str) -> String {
    if permalink.starts_with("http") {
        permalink.to_string()
    } else {
        format!("https://reddit.com{}", permalink)
    }
}

fn format_body(body: &str, limit: usize) -> String {
    let trimmed = body.trim();
    let truncated = if trimmed.chars().count() > limit {
        let cut: String = trimmed.chars().take(limit).collect();
        format!("{}...", cut)
    } else {
        trimmed.to_string()
    };
    truncated.replace('\n', "<br>")
}

fn render_match_body(payload: &MatchPayload, keyword_config_url: &str) -> String {
    let mut html = format!(
        "<h2>New mention of \"{keyword}\"</h2>\
         <p><strong>{match_type}</strong> in r/{subreddit} by u/{author}</p>",
        keyword = payload.keyword,
        match_type = match_type(payload),
        subreddit = payload.subreddit,
        author = payload.author,
    );
    if !payload.title.is_empty() {
        html.push_str(&format!("<h3>{}</h3>", payload.title));
    }
    let body = format_body(&payload.body, SINGLE_BODY_LIMIT);
    if !body.is_empty() {
        html.push_str(&format!("<p>{}</p>", body));
    }
    html.push_str(&format!(
        "<p><a href=\"{}\">View on Reddit</a></p>",
        item_url(&payload.permalink)
    ));
    if !keyword_config_url.is_empty() {
        html.push_str(&format!(
            "<p><a href=\"{}\">Manage this keyword</a></p>",
            keyword_config_url
        ));
    }
    html
}

fn render_digest_body(items: &[(MatchPayload, String)], remaining: usize) -> String {
    let mut html = String::from("<h2>New mentions</h2>");

    for (payload, keyword_config_url) in items {
        html.push_str(&format!(
            "<hr><p><strong>{match_type}</strong> matching \"{keyword}\" in r/{subreddit} by u/{author}</p>",
            match_type = match_type(payload),
            keyword = payload.keyword,
            subreddit = payload.subreddit,
            author = payload.author,
        ));
        let title = payload.title.trim();
        if !title.is_empty() {
            html.push_str(&format!("<h3>{}</h3>", title));
        }
        let body = format_body(&payload.body, DIGEST_BODY_LIMIT);
        if !body.is_empty() {
            html.push_str(&format!("<p>{}</p>", body));
        }
        html.push_str(&format!(
            "<p><a href=\"{}\">View on Reddit</a></p>",
            item_url(&payload.permalink)
        ));
        if !keyword_config_url.is_empty() {
            html.push_str(&format!(
                "<p><a href=\"{}\">Manage this keyword</a></p>",
                keyword_config_url
            ));
        }
    }

    if remaining > 0 {
        html.push_str(&format!("<hr><p>...and {} more mentions</p>", remaining));
    }

    html
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn mailer() -> SmtpMailer {
        SmtpMailer::new(
            "smtp.example.com",
            587,
            "feedgrep@example.com",
            "password",
            "https://app.example.com/",
        )
        .unwrap()
    }

    fn stored_match(id: i64, payload: &MatchPayload) -> Match {
        Match {
            id,
            user_id: Uuid::new_v4(),
            keyword_id: Some(7),
            source: "reddit".to_string(),
            match_hash: format!("{:064x}", id),
            data: serde_json::to_value(payload).unwrap(),
            notified_at: None,
            created_at: Utc::now(),
        }
    }

    fn payload(keyword: &str, body: &str) -> MatchPayload {
        MatchPayload {
            keyword: keyword.to_string(),
            subreddit: "programming".to_string(),
            author: "someone".to_string(),
            title: "a title".to_string(),
            body: body.to_string(),
            permalink: "/r/programming/comments/p1".to_string(),
            is_comment: false,
        }
    }

    #[test]
    fn match_email_links_to_reddit_and_keyword_settings() {
        let m = stored_match(1, &payload("golang", "some body"));
        let html = mailer().render_match(&m).unwrap();

        assert!(html.contains("https://reddit.com/r/programming/comments/p1"));
        assert!(html.contains("https://app.example.com/keywords/7/edit"));
        assert!(html.contains("golang"));
        assert!(html.contains("<strong>Post</strong>"));
    }

    #[test]
    fn comment_matches_are_labelled_as_comments() {
        let mut p = payload("golang", "a comment");
        p.is_comment = true;
        p.title = String::new();
        let html = mailer().render_match(&stored_match(1, &p)).unwrap();
        assert!(html.contains("<strong>Comment</strong>"));
    }

    #[test]
    fn long_bodies_are_truncated_with_ellipsis() {
        let long_body = "x".repeat(600);
        let html = mailer()
            .render_match(&stored_match(1, &payload("golang", &long_body)))
            .unwrap();
        assert!(html.contains(&format!("{}...", "x".repeat(500))));
        assert!(!html.contains(&"x".repeat(501)));
    }

    #[test]
    fn newlines_become_breaks() {
        let html = mailer()
            .render_match(&stored_match(1, &payload("golang", "line one\nline two")))
            .unwrap();
        assert!(html.contains("line one<br>line two"));
    }

    #[test]
    fn digest_caps_items_and_counts_the_rest() {
        let matches: Vec<Match> = (0..13)
            .map(|i| stored_match(i, &payload("golang", "body")))
            .collect();
        let html = mailer().render_digest(&matches).unwrap();
        assert!(html.contains("...and 3 more mentions"));
    }

    #[test]
    fn digest_skips_undecodable_payloads() {
        let mut bad = stored_match(1, &payload("golang", "body"));
        bad.data = serde_json::json!([1, 2, 3]);
        let good = stored_match(2, &payload("rust", "body"));

        let html = mailer().render_digest(&[bad, good]).unwrap();
        assert!(html.contains("rust"));
        assert!(!html.contains("...and"));
    }

    #[test]
    fn digest_with_no_valid_matches_is_an_error() {
        let mut bad = stored_match(1, &payload("golang", "body"));
        bad.data = serde_json::json!("not an object");
        assert!(mailer().render_digest(&[bad]).is_err());
    }

    #[test]
    fn keyword_config_url_needs_an_app_base() {
        let bare = SmtpMailer::new(
            "smtp.example.com",
            587,
            "feedgrep@example.com",
            "password",
            "",
        )
        .unwrap();
        assert_eq!(bare.keyword_config_url(Some(7)), "");
        assert_eq!(mailer().keyword_config_url(None), "");
        assert_eq!(
            mailer().keyword_config_url(Some(7)),
            "https://app.example.com/keywords/7/edit"
        );
    }
}

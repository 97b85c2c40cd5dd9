use serde::Deserialize;

/// A Reddit listing page as returned by `/r/all/new` and `/r/all/comments`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RedditListing {
    #[serde(default)]
    pub data: RedditListingData,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RedditListingData {
    #[serde(default)]
    pub children: Vec<RedditChild>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RedditChild {
    #[serde(default)]
    pub data: RedditItem,
}

/// One listing child. Posts populate `title`/`selftext`, comments
/// populate `body`; `name` is the provider fullname ("t3_..."/"t1_...").
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RedditItem {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub selftext: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub subreddit: String,
    #[serde(default)]
    pub permalink: String,
    #[serde(default)]
    pub created_utc: f64,
    #[serde(default)]
    pub link_id: String,
}

/// Envelope of the ArcticShift search endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct ArcticShiftSearchResponse<T> {
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ArcticShiftPost {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub subreddit: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub selftext: String,
    #[serde(default)]
    pub created_utc: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ArcticShiftComment {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub subreddit: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub link_id: String,
    #[serde(default)]
    pub parent_id: String,
    #[serde(default)]
    pub created_utc: i64,
}

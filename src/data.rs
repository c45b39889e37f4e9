use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::lemmy;

pub type PostId = i64;
pub type CommentId = i64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostSummary {
    pub id: PostId,
    pub title: String,
    pub url: String,
    /// Empty when the post has no inline body.
    pub body: String,
    pub community: String,
    pub author: String,
    pub score: i64,
    pub comments: i64,
    pub published: Option<DateTime<Utc>>,
}

impl PostSummary {
    pub fn has_body(&self) -> bool {
        !self.body.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentRecord {
    pub id: CommentId,
    pub parent: Option<CommentId>,
    pub post_id: PostId,
    pub author: String,
    pub content: String,
    pub score: i64,
}

/// Every way a fetch can fail. The session only distinguishes success from
/// failure; the variants exist for logs and the optional error banner.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Transport(String),
    #[error("server responded with status {0}")]
    Status(u16),
    #[error("could not decode response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            FetchError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            FetchError::Status(status.as_u16())
        } else {
            FetchError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(err: serde_json::Error) -> Self {
        FetchError::Decode(err.to_string())
    }
}

pub type FetchResult<T> = std::result::Result<T, FetchError>;

pub trait FeedService: Send + Sync {
    /// Loads one page of posts. An empty `community` means the instance-wide feed.
    fn load_posts(&self, community: &str, page: u32) -> FetchResult<Vec<PostSummary>>;
}

pub trait CommentService: Send + Sync {
    fn load_comments(&self, post_id: PostId) -> FetchResult<Vec<CommentRecord>>;
}

pub struct LemmyFeedService {
    client: Arc<lemmy::Client>,
}

impl LemmyFeedService {
    pub fn new(client: Arc<lemmy::Client>) -> Self {
        Self { client }
    }
}

impl FeedService for LemmyFeedService {
    fn load_posts(&self, community: &str, page: u32) -> FetchResult<Vec<PostSummary>> {
        let views = self.client.posts(community, page)?;
        Ok(views.into_iter().map(lemmy::PostView::into_summary).collect())
    }
}

pub struct LemmyCommentService {
    client: Arc<lemmy::Client>,
}

impl LemmyCommentService {
    pub fn new(client: Arc<lemmy::Client>) -> Self {
        Self { client }
    }
}

impl CommentService for LemmyCommentService {
    fn load_comments(&self, post_id: PostId) -> FetchResult<Vec<CommentRecord>> {
        let views = self.client.comments(post_id)?;
        Ok(views.into_iter().map(lemmy::CommentView::into_record).collect())
    }
}

/// Serves a fixed set of pages without touching the network.
#[derive(Default)]
pub struct MockFeedService {
    pub pages: Vec<Vec<PostSummary>>,
}

impl MockFeedService {
    pub fn with_pages(pages: Vec<Vec<PostSummary>>) -> Self {
        Self { pages }
    }
}

impl FeedService for MockFeedService {
    fn load_posts(&self, community: &str, page: u32) -> FetchResult<Vec<PostSummary>> {
        if self.pages.is_empty() {
            return Ok(vec![mock_post(1, &format!("Sample posts for {}", community), "")]);
        }
        let index = page.saturating_sub(1) as usize;
        Ok(self.pages.get(index).cloned().unwrap_or_default())
    }
}

#[derive(Default)]
pub struct MockCommentService {
    pub comments: Vec<CommentRecord>,
    pub fail: bool,
}

impl CommentService for MockCommentService {
    fn load_comments(&self, post_id: PostId) -> FetchResult<Vec<CommentRecord>> {
        if self.fail {
            return Err(FetchError::Transport("mock transport failure".into()));
        }
        Ok(self
            .comments
            .iter()
            .filter(|comment| comment.post_id == post_id)
            .cloned()
            .collect())
    }
}

pub fn mock_post(id: PostId, title: &str, body: &str) -> PostSummary {
    PostSummary {
        id,
        title: title.into(),
        url: format!("https://example.org/post/{id}"),
        body: body.into(),
        community: "ltv".into(),
        author: "ltv".into(),
        score: 1,
        comments: 0,
        published: None,
    }
}

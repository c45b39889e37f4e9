use std::time::Duration;

use anyhow::{bail, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::blocking::Client as HttpClient;
use reqwest::header::USER_AGENT;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use url::Url;

use crate::data::{CommentId, CommentRecord, FetchError, FetchResult, PostId, PostSummary};

pub const DEFAULT_INSTANCE: &str = "https://lemmy.ml";
const API_PREFIX: &str = "api/v3/";
const COMMENT_MAX_DEPTH: u32 = 8;
const COMMENT_LIMIT: u32 = 300;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub instance: String,
    pub user_agent: String,
    pub timeout: Duration,
    pub page_size: u32,
    pub http_client: Option<HttpClient>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            instance: DEFAULT_INSTANCE.to_string(),
            user_agent: format!("ltv/{}", crate::VERSION),
            timeout: Duration::from_secs(20),
            page_size: 20,
            http_client: None,
        }
    }
}

pub struct Client {
    http: HttpClient,
    user_agent: String,
    base_url: Url,
    page_size: u32,
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self> {
        if config.user_agent.trim().is_empty() {
            bail!("lemmy client user agent required");
        }
        let base_url = instance_url(&config.instance)?;

        let http = match config.http_client {
            Some(client) => client,
            None => HttpClient::builder().timeout(config.timeout).build()?,
        };

        Ok(Client {
            http,
            user_agent: config.user_agent,
            base_url,
            page_size: config.page_size,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn posts(&self, community: &str, page: u32) -> FetchResult<Vec<PostView>> {
        let url = self.posts_url(community, page)?;
        let out: GetPostsResponse = self.get(url)?;
        Ok(out.posts)
    }

    pub fn comments(&self, post_id: PostId) -> FetchResult<Vec<CommentView>> {
        let url = self.comments_url(post_id)?;
        let out: GetCommentsResponse = self.get(url)?;
        Ok(out.comments)
    }

    fn posts_url(&self, community: &str, page: u32) -> FetchResult<Url> {
        let mut url = self.endpoint("post/list")?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("page", &page.max(1).to_string());
            if self.page_size > 0 {
                pairs.append_pair("limit", &self.page_size.to_string());
            }
            let community = community.trim();
            if !community.is_empty() {
                pairs.append_pair("community_name", community);
            }
        }
        Ok(url)
    }

    fn comments_url(&self, post_id: PostId) -> FetchResult<Url> {
        let mut url = self.endpoint("comment/list")?;
        url.query_pairs_mut()
            .append_pair("post_id", &post_id.to_string())
            .append_pair("max_depth", &COMMENT_MAX_DEPTH.to_string())
            .append_pair("limit", &COMMENT_LIMIT.to_string())
            .append_pair("type_", "All");
        Ok(url)
    }

    fn endpoint(&self, path: &str) -> FetchResult<Url> {
        self.base_url
            .join(API_PREFIX)
            .and_then(|api| api.join(path))
            .map_err(|err| FetchError::Transport(format!("invalid endpoint {path}: {err}")))
    }

    fn get<T: DeserializeOwned>(&self, url: Url) -> FetchResult<T> {
        let resp = self
            .http
            .get(url)
            .header(USER_AGENT, &self.user_agent)
            .send()?;
        let status = resp.status();
        if status.is_client_error() || status.is_server_error() {
            return Err(FetchError::Status(status.as_u16()));
        }
        let bytes = resp.bytes()?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Normalises a user-supplied host into an instance base URL. Bare hosts get
/// an `https://` scheme and the path always ends with `/` so joins append.
pub fn instance_url(raw: &str) -> Result<Url> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        bail!("lemmy instance required");
    }
    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };
    let mut url = Url::parse(&with_scheme)?;
    if url.cannot_be_a_base() {
        bail!("lemmy instance {trimmed} is not a base url");
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

#[derive(Debug, Clone, Deserialize)]
pub struct GetPostsResponse {
    #[serde(default)]
    pub posts: Vec<PostView>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GetCommentsResponse {
    #[serde(default)]
    pub comments: Vec<CommentView>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PostView {
    pub post: Post,
    #[serde(default)]
    pub creator: Person,
    #[serde(default)]
    pub community: Community,
    #[serde(default)]
    pub counts: PostAggregates,
}

impl PostView {
    pub fn into_summary(self) -> PostSummary {
        PostSummary {
            id: self.post.id,
            title: self.post.name,
            url: self.post.url.unwrap_or_default(),
            body: self.post.body.unwrap_or_default(),
            community: self.community.name,
            author: self.creator.name,
            score: self.counts.score,
            comments: self.counts.comments,
            published: self.post.published.as_deref().and_then(parse_timestamp),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Post {
    pub id: PostId,
    pub name: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub published: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Person {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Community {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PostAggregates {
    #[serde(default)]
    pub comments: i64,
    #[serde(default)]
    pub score: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommentView {
    pub comment: Comment,
    #[serde(default)]
    pub creator: Person,
    #[serde(default)]
    pub counts: CommentAggregates,
}

impl CommentView {
    pub fn into_record(self) -> CommentRecord {
        let parent = self
            .comment
            .parent_id
            .or_else(|| parent_from_path(&self.comment.path, self.comment.id));
        CommentRecord {
            id: self.comment.id,
            parent,
            post_id: self.comment.post_id,
            author: self.creator.name,
            content: self.comment.content,
            score: self.counts.score,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    pub post_id: PostId,
    #[serde(default)]
    pub parent_id: Option<CommentId>,
    /// Materialised ancestry, `0.<root>.<...>.<id>`.
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommentAggregates {
    #[serde(default)]
    pub score: i64,
}

fn parent_from_path(path: &str, id: CommentId) -> Option<CommentId> {
    let mut segments: Vec<CommentId> = path
        .split('.')
        .filter_map(|segment| segment.parse().ok())
        .collect();
    if segments.last() == Some(&id) {
        segments.pop();
    }
    segments.last().copied().filter(|parent| *parent != 0)
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    // Older instances omit the offset.
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

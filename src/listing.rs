use chrono::{DateTime, Utc};

use crate::data::{PostId, PostSummary};

/// One row of the post list as the renderer shows it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListItem {
    pub id: PostId,
    pub title: String,
    pub secondary: String,
    pub has_body: bool,
}

impl ListItem {
    fn from_post(position: usize, post: &PostSummary, now: DateTime<Utc>) -> Self {
        Self {
            id: post.id,
            title: format!("[{}] {}", position + 1, post.title),
            secondary: secondary_line(post, now),
            has_body: post.has_body(),
        }
    }
}

pub fn secondary_line(post: &PostSummary, now: DateTime<Utc>) -> String {
    let mut parts = Vec::new();
    if !post.url.is_empty() {
        parts.push(post.url.clone());
    }
    if !post.community.is_empty() {
        parts.push(format!("c/{}", post.community));
    }
    parts.push(format!("▲ {}", post.score));
    parts.push(format!("{} comments", post.comments));
    if !post.author.is_empty() {
        parts.push(format!("by {}", post.author));
    }
    if let Some(published) = post.published {
        parts.push(age_label(now.signed_duration_since(published)));
    }
    parts.join(" · ")
}

fn age_label(age: chrono::Duration) -> String {
    let minutes = age.num_minutes().max(0);
    match minutes {
        0 => "just now".to_string(),
        1..=59 => format!("{minutes}m ago"),
        60..=1439 => format!("{}h ago", minutes / 60),
        _ => format!("{}d ago", minutes / 1440),
    }
}

/// The accumulated post listing plus a single selection index that stays
/// within `[0, len)` whenever the listing is non-empty.
#[derive(Debug, Default)]
pub struct Listing {
    posts: Vec<PostSummary>,
    items: Vec<ListItem>,
    selected: usize,
}

impl Listing {
    pub fn len(&self) -> usize {
        self.posts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }

    pub fn posts(&self) -> &[PostSummary] {
        &self.posts
    }

    pub fn items(&self) -> &[ListItem] {
        &self.items
    }

    pub fn selected_index(&self) -> usize {
        self.selected
    }

    pub fn selected(&self) -> Option<&PostSummary> {
        self.posts.get(self.selected)
    }

    pub fn clear(&mut self) {
        self.posts.clear();
        self.items.clear();
        self.selected = 0;
    }

    pub fn replace(&mut self, posts: Vec<PostSummary>) {
        self.clear();
        self.extend(posts);
    }

    /// Appends without touching existing entries or the selection.
    pub fn extend(&mut self, posts: Vec<PostSummary>) {
        let now = Utc::now();
        let offset = self.posts.len();
        self.items.extend(
            posts
                .iter()
                .enumerate()
                .map(|(i, post)| ListItem::from_post(offset + i, post, now)),
        );
        self.posts.extend(posts);
        self.clamp();
    }

    pub fn select(&mut self, index: usize) {
        self.selected = index;
        self.clamp();
    }

    pub fn select_next(&mut self) -> bool {
        if self.selected + 1 < self.len() {
            self.selected += 1;
            true
        } else {
            false
        }
    }

    pub fn select_previous(&mut self) {
        self.selected = self.selected.saturating_sub(1);
    }

    pub fn select_last(&mut self) {
        self.select(self.len().saturating_sub(1));
    }

    fn clamp(&mut self) {
        self.selected = self.selected.min(self.len().saturating_sub(1));
    }
}

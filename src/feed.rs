use std::fmt;

/// The (filter, page) pair identifying the page a listing fetch targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor {
    pub filter: String,
    pub page: u32,
}

impl Default for Cursor {
    fn default() -> Self {
        Self {
            filter: String::new(),
            page: 1,
        }
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.filter.is_empty() {
            write!(f, "all communities, page {}", self.page)
        } else {
            write!(f, "c/{}, page {}", self.filter, self.page)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    /// Result replaces the listing.
    Replace,
    /// Result is appended to the listing.
    Append,
}

/// Monotonically increasing request identifier.
pub type Token = u64;

/// Everything a listing fetch needs, decided at request time. The result is
/// applied with this ticket's mode no matter when it arrives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    pub token: Token,
    pub cursor: Cursor,
    pub mode: LoadMode,
}

/// Owns the pagination cursor and decides replace-vs-append for listing
/// fetches. Also hands out tokens for comment fetches so staleness can be
/// judged in one place.
#[derive(Debug)]
pub struct Orchestrator {
    cursor: Cursor,
    next_token: Token,
    latest_fresh: Token,
    latest_comments: Token,
    discard_stale: bool,
}

impl Orchestrator {
    pub fn new(discard_stale: bool) -> Self {
        Self {
            cursor: Cursor::default(),
            next_token: 1,
            latest_fresh: 0,
            latest_comments: 0,
            discard_stale,
        }
    }

    pub fn cursor(&self) -> &Cursor {
        &self.cursor
    }

    /// Resets the cursor to page 1 of `filter`; the result replaces the listing.
    pub fn submit_filter(&mut self, filter: &str) -> FetchTicket {
        self.cursor = Cursor {
            filter: filter.trim().to_string(),
            page: 1,
        };
        let token = self.issue();
        self.latest_fresh = token;
        FetchTicket {
            token,
            cursor: self.cursor.clone(),
            mode: LoadMode::Replace,
        }
    }

    /// Advances to the next page of the current filter. Returns `None` and
    /// leaves the cursor untouched while there is no listing to extend.
    pub fn request_next_page(&mut self, has_listing: bool) -> Option<FetchTicket> {
        if !has_listing {
            return None;
        }
        self.cursor.page = self.cursor.page.saturating_add(1);
        Some(FetchTicket {
            token: self.issue(),
            cursor: self.cursor.clone(),
            mode: LoadMode::Append,
        })
    }

    pub fn comment_token(&mut self) -> Token {
        let token = self.issue();
        self.latest_comments = token;
        token
    }

    /// Whether a listing result for `ticket` should still be applied.
    pub fn accepts(&self, ticket: &FetchTicket) -> bool {
        if !self.discard_stale {
            return true;
        }
        match ticket.mode {
            LoadMode::Replace => ticket.token == self.latest_fresh,
            LoadMode::Append => ticket.token > self.latest_fresh,
        }
    }

    pub fn accepts_comments(&self, token: Token) -> bool {
        !self.discard_stale || token == self.latest_comments
    }

    fn issue(&mut self) -> Token {
        let token = self.next_token;
        self.next_token += 1;
        token
    }
}

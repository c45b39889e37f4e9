use crate::comments::CommentForest;
use crate::data::{
    CommentRecord, CommentService, FeedService, FetchError, FetchResult, PostId, PostSummary,
};
use crate::feed::{Cursor, FetchTicket, LoadMode, Orchestrator, Token};
use crate::listing::{ListItem, Listing};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Listing,
    PostDetail,
    CommentThread,
}

/// What the user asked for, already decoded from raw key events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    SubmitFilter(String),
    RequestNextPage,
    OpenSelected,
    GoBack,
    SelectNext,
    SelectPrevious,
    SelectFirst,
    SelectLast,
}

/// Work the session wants done off the event loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    FetchPosts(FetchTicket),
    FetchComments { token: Token, post_id: PostId },
}

impl Command {
    /// Runs the fetch against the data source. Blocking; callers run it on a
    /// worker and feed the returned event back through [`Session::handle_data`].
    pub fn run(self, feed: &dyn FeedService, comments: &dyn CommentService) -> DataEvent {
        match self {
            Command::FetchPosts(ticket) => {
                let result = feed.load_posts(&ticket.cursor.filter, ticket.cursor.page);
                DataEvent::Posts { ticket, result }
            }
            Command::FetchComments { token, post_id } => DataEvent::Comments {
                token,
                post_id,
                result: comments.load_comments(post_id),
            },
        }
    }
}

/// Completion of a [`Command`].
#[derive(Debug)]
pub enum DataEvent {
    Posts {
        ticket: FetchTicket,
        result: FetchResult<Vec<PostSummary>>,
    },
    Comments {
        token: Token,
        post_id: PostId,
        result: FetchResult<Vec<CommentRecord>>,
    },
}

#[derive(Debug)]
pub struct Thread {
    pub post: PostSummary,
    pub forest: CommentForest,
}

#[derive(Debug)]
struct PendingThread {
    token: Token,
    post: PostSummary,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Options {
    pub discard_stale_results: bool,
    pub show_fetch_errors: bool,
}

/// Everything the renderer needs to draw the current screen.
#[derive(Debug)]
pub enum ScreenState<'a> {
    Listing {
        items: &'a [ListItem],
        selected: usize,
        cursor: &'a Cursor,
    },
    PostDetail {
        post: &'a PostSummary,
    },
    CommentThread {
        post: &'a PostSummary,
        forest: &'a CommentForest,
    },
}

/// The feed session: current screen, listing, selection and cursor. Mutated
/// only through [`Session::handle_intent`] and [`Session::handle_data`].
#[derive(Debug)]
pub struct Session {
    screen: Screen,
    listing: Listing,
    orchestrator: Orchestrator,
    detail: Option<PostSummary>,
    thread: Option<Thread>,
    pending_thread: Option<PendingThread>,
    outstanding_listing: usize,
    last_error: Option<String>,
    show_errors: bool,
}

impl Session {
    /// Creates the session on the Listing screen together with the fetch for
    /// page 1 of the instance-wide feed.
    pub fn new(options: Options) -> (Self, Command) {
        let mut session = Session {
            screen: Screen::Listing,
            listing: Listing::default(),
            orchestrator: Orchestrator::new(options.discard_stale_results),
            detail: None,
            thread: None,
            pending_thread: None,
            outstanding_listing: 0,
            last_error: None,
            show_errors: options.show_fetch_errors,
        };
        let ticket = session.orchestrator.submit_filter("");
        let command = session.fetch_posts(ticket);
        (session, command)
    }

    pub fn screen(&self) -> Screen {
        self.screen
    }

    pub fn listing(&self) -> &Listing {
        &self.listing
    }

    pub fn cursor(&self) -> &Cursor {
        self.orchestrator.cursor()
    }

    pub fn is_loading(&self) -> bool {
        self.outstanding_listing > 0 || self.pending_thread.is_some()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// The post the current screen is about.
    pub fn focused_post(&self) -> Option<&PostSummary> {
        match self.screen {
            Screen::Listing => self.listing.selected(),
            Screen::PostDetail => self.detail.as_ref(),
            Screen::CommentThread => self.thread.as_ref().map(|thread| &thread.post),
        }
    }

    pub fn view(&self) -> ScreenState<'_> {
        match (self.screen, self.detail.as_ref(), self.thread.as_ref()) {
            (Screen::PostDetail, Some(post), _) => ScreenState::PostDetail { post },
            (Screen::CommentThread, _, Some(thread)) => ScreenState::CommentThread {
                post: &thread.post,
                forest: &thread.forest,
            },
            _ => ScreenState::Listing {
                items: self.listing.items(),
                selected: self.listing.selected_index(),
                cursor: self.orchestrator.cursor(),
            },
        }
    }

    pub fn handle_intent(&mut self, intent: Intent) -> Option<Command> {
        tracing::debug!(?intent, screen = ?self.screen, "intent");
        self.last_error = None;
        match (self.screen, intent) {
            (Screen::Listing, Intent::SubmitFilter(text)) => {
                self.listing.clear();
                self.pending_thread = None;
                let ticket = self.orchestrator.submit_filter(&text);
                Some(self.fetch_posts(ticket))
            }
            (Screen::Listing, Intent::RequestNextPage) => {
                let ticket = self
                    .orchestrator
                    .request_next_page(!self.listing.is_empty())?;
                Some(self.fetch_posts(ticket))
            }
            (Screen::Listing, Intent::OpenSelected) => {
                let post = self.listing.selected()?.clone();
                if post.has_body() {
                    self.pending_thread = None;
                    self.detail = Some(post);
                    self.screen = Screen::PostDetail;
                    None
                } else {
                    Some(self.fetch_comments(post))
                }
            }
            (Screen::PostDetail, Intent::OpenSelected) => {
                let post = self.detail.clone()?;
                Some(self.fetch_comments(post))
            }
            (Screen::PostDetail, Intent::GoBack) => {
                self.pending_thread = None;
                self.detail = None;
                self.screen = Screen::Listing;
                None
            }
            (Screen::CommentThread, Intent::GoBack) => {
                let thread = self.thread.take()?;
                if thread.post.has_body() {
                    self.detail = Some(thread.post);
                    self.screen = Screen::PostDetail;
                } else {
                    self.screen = Screen::Listing;
                }
                None
            }
            (Screen::Listing, Intent::SelectNext) => {
                self.listing.select_next();
                None
            }
            (Screen::Listing, Intent::SelectPrevious) => {
                self.listing.select_previous();
                None
            }
            (Screen::Listing, Intent::SelectFirst) => {
                self.listing.select(0);
                None
            }
            (Screen::Listing, Intent::SelectLast) => {
                self.listing.select_last();
                None
            }
            _ => None,
        }
    }

    pub fn handle_data(&mut self, event: DataEvent) {
        match event {
            DataEvent::Posts { ticket, result } => {
                self.outstanding_listing = self.outstanding_listing.saturating_sub(1);
                if !self.orchestrator.accepts(&ticket) {
                    tracing::warn!(token = ticket.token, cursor = %ticket.cursor, "discarding stale listing result");
                    return;
                }
                match result {
                    Ok(posts) => {
                        tracing::debug!(
                            token = ticket.token,
                            mode = ?ticket.mode,
                            count = posts.len(),
                            "posts arrived"
                        );
                        match ticket.mode {
                            LoadMode::Replace => self.listing.replace(posts),
                            LoadMode::Append => self.listing.extend(posts),
                        }
                        self.last_error = None;
                    }
                    Err(err) => self.fetch_failed("posts", &err),
                }
            }
            DataEvent::Comments {
                token,
                post_id,
                result,
            } => {
                let matches = self.pending_thread.as_ref().is_some_and(|pending| {
                    pending.post.id == post_id && self.orchestrator.accepts_comments(token)
                });
                if !matches {
                    tracing::warn!(token, post_id, "discarding stale comment result");
                    return;
                }
                let Some(pending) = self.pending_thread.take() else {
                    return;
                };
                match result {
                    Ok(records) => {
                        tracing::debug!(token, post_id, count = records.len(), "comments arrived");
                        let forest = CommentForest::build(&records);
                        self.thread = Some(Thread {
                            post: pending.post,
                            forest,
                        });
                        self.detail = None;
                        self.screen = Screen::CommentThread;
                        self.last_error = None;
                    }
                    Err(err) => self.fetch_failed("comments", &err),
                }
            }
        }
    }

    fn fetch_posts(&mut self, ticket: FetchTicket) -> Command {
        tracing::debug!(token = ticket.token, cursor = %ticket.cursor, mode = ?ticket.mode, "fetch posts");
        self.outstanding_listing += 1;
        Command::FetchPosts(ticket)
    }

    fn fetch_comments(&mut self, post: PostSummary) -> Command {
        let token = self.orchestrator.comment_token();
        let post_id = post.id;
        tracing::debug!(token, post_id, "fetch comments");
        self.pending_thread = Some(PendingThread { token, post });
        Command::FetchComments { token, post_id }
    }

    fn fetch_failed(&mut self, what: &str, err: &FetchError) {
        tracing::warn!(error = %err, "failed to load {what}");
        if self.show_errors {
            self.last_error = Some(format!("Failed to load {what}: {err}"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{mock_post, MockCommentService, MockFeedService};

    fn options() -> Options {
        Options {
            discard_stale_results: true,
            show_fetch_errors: false,
        }
    }

    fn loaded(posts: Vec<PostSummary>) -> Session {
        let (mut session, command) = Session::new(options());
        let Command::FetchPosts(ticket) = command else {
            panic!("initial command must fetch posts");
        };
        session.handle_data(DataEvent::Posts {
            ticket,
            result: Ok(posts),
        });
        session
    }

    fn transport_error() -> FetchError {
        FetchError::Transport("connection reset".into())
    }

    #[test]
    fn starts_with_fresh_fetch_for_first_page() {
        let (session, command) = Session::new(options());
        assert_eq!(session.screen(), Screen::Listing);
        assert!(session.is_loading());
        match command {
            Command::FetchPosts(ticket) => {
                assert_eq!(ticket.cursor, Cursor::default());
                assert_eq!(ticket.mode, LoadMode::Replace);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn navigation_before_first_fetch_is_noop() {
        let (mut session, _) = Session::new(options());
        for intent in [
            Intent::OpenSelected,
            Intent::RequestNextPage,
            Intent::SelectNext,
            Intent::SelectLast,
            Intent::GoBack,
        ] {
            assert!(session.handle_intent(intent).is_none());
        }
        assert_eq!(session.screen(), Screen::Listing);
        assert_eq!(session.cursor().page, 1);
    }

    #[test]
    fn submit_filter_clears_listing_and_resets_page() {
        let mut session = loaded(vec![mock_post(1, "a", ""), mock_post(2, "b", "")]);
        session.handle_intent(Intent::RequestNextPage);
        session.handle_intent(Intent::RequestNextPage);
        assert_eq!(session.cursor().page, 3);

        let command = session.handle_intent(Intent::SubmitFilter("rust".into()));
        assert!(session.listing().is_empty());
        assert_eq!(session.cursor().page, 1);
        assert_eq!(session.cursor().filter, "rust");
        assert!(matches!(command, Some(Command::FetchPosts(ref t)) if t.mode == LoadMode::Replace));
    }

    #[test]
    fn comments_for_previous_filter_do_not_open_thread() {
        let mut session = loaded(vec![mock_post(1, "a", ""), mock_post(2, "b", "")]);
        let Some(Command::FetchComments { token, post_id }) =
            session.handle_intent(Intent::OpenSelected)
        else {
            panic!("empty body must fetch comments");
        };

        let Some(Command::FetchPosts(ticket)) =
            session.handle_intent(Intent::SubmitFilter("rust".into()))
        else {
            panic!("filter must fetch posts");
        };
        session.handle_data(DataEvent::Posts {
            ticket,
            result: Ok(vec![mock_post(7, "rust", "")]),
        });
        session.handle_data(DataEvent::Comments {
            token,
            post_id,
            result: Ok(Vec::new()),
        });

        assert_eq!(session.screen(), Screen::Listing);
        assert_eq!(session.listing().len(), 1);
        assert_eq!(session.focused_post().map(|post| post.id), Some(7));
    }

    #[test]
    fn whitespace_body_still_opens_detail() {
        let mut session = loaded(vec![mock_post(1, "a", " \n")]);
        assert!(session.handle_intent(Intent::OpenSelected).is_none());
        assert_eq!(session.screen(), Screen::PostDetail);
    }

    #[test]
    fn next_page_appends_and_keeps_selection() {
        let mut session = loaded(vec![mock_post(1, "a", ""), mock_post(2, "b", "")]);
        session.handle_intent(Intent::SelectNext);
        let before: Vec<PostSummary> = session.listing().posts().to_vec();

        let Some(Command::FetchPosts(ticket)) = session.handle_intent(Intent::RequestNextPage)
        else {
            panic!("next page must fetch");
        };
        assert_eq!(ticket.cursor.page, 2);
        session.handle_data(DataEvent::Posts {
            ticket,
            result: Ok(vec![mock_post(3, "c", "")]),
        });

        assert_eq!(session.listing().len(), 3);
        assert_eq!(&session.listing().posts()[..2], before.as_slice());
        assert_eq!(session.listing().selected_index(), 1);
    }

    #[test]
    fn fresh_result_resets_selection() {
        let mut session = loaded(vec![mock_post(1, "a", ""), mock_post(2, "b", "")]);
        session.handle_intent(Intent::SelectLast);
        let Some(Command::FetchPosts(ticket)) =
            session.handle_intent(Intent::SubmitFilter("linux".into()))
        else {
            panic!("submit must fetch");
        };
        session.handle_data(DataEvent::Posts {
            ticket,
            result: Ok(vec![mock_post(5, "x", ""), mock_post(6, "y", "")]),
        });
        assert_eq!(session.listing().selected_index(), 0);
    }

    #[test]
    fn open_post_with_body_goes_to_detail_without_fetch() {
        let mut session = loaded(vec![mock_post(1, "a", "Hello")]);
        assert!(session.handle_intent(Intent::OpenSelected).is_none());
        assert_eq!(session.screen(), Screen::PostDetail);
        assert!(matches!(
            session.view(),
            ScreenState::PostDetail { post } if post.body == "Hello"
        ));
    }

    #[test]
    fn open_post_without_body_waits_for_comments() {
        let mut session = loaded(vec![mock_post(1, "a", "")]);
        let Some(Command::FetchComments { token, post_id }) =
            session.handle_intent(Intent::OpenSelected)
        else {
            panic!("expected comment fetch");
        };
        assert_eq!(post_id, 1);
        assert_eq!(session.screen(), Screen::Listing);

        session.handle_data(DataEvent::Comments {
            token,
            post_id,
            result: Ok(vec![]),
        });
        assert_eq!(session.screen(), Screen::CommentThread);

        session.handle_intent(Intent::GoBack);
        assert_eq!(session.screen(), Screen::Listing);
    }

    #[test]
    fn comment_fetch_error_leaves_listing_unchanged() {
        let mut session = loaded(vec![mock_post(1, "a", ""), mock_post(2, "b", "")]);
        session.handle_intent(Intent::SelectNext);
        let Some(Command::FetchComments { token, post_id }) =
            session.handle_intent(Intent::OpenSelected)
        else {
            panic!("expected comment fetch");
        };
        session.handle_data(DataEvent::Comments {
            token,
            post_id,
            result: Err(transport_error()),
        });
        assert_eq!(session.screen(), Screen::Listing);
        assert_eq!(session.listing().len(), 2);
        assert_eq!(session.listing().selected_index(), 1);
        assert!(!session.is_loading());
        assert!(session.last_error().is_none());
    }

    #[test]
    fn thread_from_detail_returns_to_detail() {
        let mut session = loaded(vec![mock_post(1, "a", "Hello")]);
        session.handle_intent(Intent::OpenSelected);
        let Some(Command::FetchComments { token, post_id }) =
            session.handle_intent(Intent::OpenSelected)
        else {
            panic!("expected comment fetch");
        };
        session.handle_data(DataEvent::Comments {
            token,
            post_id,
            result: Ok(vec![]),
        });
        assert_eq!(session.screen(), Screen::CommentThread);
        session.handle_intent(Intent::GoBack);
        assert_eq!(session.screen(), Screen::PostDetail);
        session.handle_intent(Intent::GoBack);
        assert_eq!(session.screen(), Screen::Listing);
    }

    #[test]
    fn comments_after_leaving_detail_are_ignored() {
        let mut session = loaded(vec![mock_post(1, "a", "Hello")]);
        session.handle_intent(Intent::OpenSelected);
        let Some(Command::FetchComments { token, post_id }) =
            session.handle_intent(Intent::OpenSelected)
        else {
            panic!("expected comment fetch");
        };
        session.handle_intent(Intent::GoBack);
        session.handle_data(DataEvent::Comments {
            token,
            post_id,
            result: Ok(vec![]),
        });
        assert_eq!(session.screen(), Screen::Listing);
    }

    #[test]
    fn listing_error_is_dropped_and_state_kept() {
        let mut session = loaded(vec![mock_post(1, "a", "")]);
        let Some(Command::FetchPosts(ticket)) = session.handle_intent(Intent::RequestNextPage)
        else {
            panic!("next page must fetch");
        };
        session.handle_data(DataEvent::Posts {
            ticket,
            result: Err(FetchError::Status(502)),
        });
        assert_eq!(session.listing().len(), 1);
        assert_eq!(session.screen(), Screen::Listing);
        assert!(session.last_error().is_none());
    }

    #[test]
    fn error_banner_when_enabled() {
        let (mut session, command) = Session::new(Options {
            discard_stale_results: true,
            show_fetch_errors: true,
        });
        let Command::FetchPosts(ticket) = command else {
            panic!("initial command must fetch posts");
        };
        session.handle_data(DataEvent::Posts {
            ticket,
            result: Err(transport_error()),
        });
        let banner = session.last_error().unwrap();
        assert!(banner.contains("connection reset"), "banner was {banner}");

        session.handle_intent(Intent::SelectNext);
        assert!(session.last_error().is_none());
    }

    #[test]
    fn stale_fresh_result_does_not_clobber_newer_listing() {
        let (mut session, first) = Session::new(options());
        let Command::FetchPosts(old) = first else {
            panic!("initial command must fetch posts");
        };
        let Some(Command::FetchPosts(new)) =
            session.handle_intent(Intent::SubmitFilter("rust".into()))
        else {
            panic!("submit must fetch");
        };
        session.handle_data(DataEvent::Posts {
            ticket: new,
            result: Ok(vec![mock_post(10, "rust", "")]),
        });
        session.handle_data(DataEvent::Posts {
            ticket: old,
            result: Ok(vec![mock_post(1, "old", "")]),
        });
        assert_eq!(session.listing().posts()[0].id, 10);
        assert!(!session.is_loading());
    }

    #[test]
    fn stale_results_are_applied_when_discarding_is_off() {
        let (mut session, first) = Session::new(Options {
            discard_stale_results: false,
            show_fetch_errors: false,
        });
        let Command::FetchPosts(old) = first else {
            panic!("initial command must fetch posts");
        };
        let Some(Command::FetchPosts(new)) =
            session.handle_intent(Intent::SubmitFilter("rust".into()))
        else {
            panic!("submit must fetch");
        };
        session.handle_data(DataEvent::Posts {
            ticket: new,
            result: Ok(vec![mock_post(10, "rust", "")]),
        });
        session.handle_data(DataEvent::Posts {
            ticket: old,
            result: Ok(vec![mock_post(1, "old", "")]),
        });
        assert_eq!(session.listing().posts()[0].id, 1);
    }

    #[test]
    fn command_runs_against_services() {
        let feed = MockFeedService::with_pages(vec![vec![mock_post(1, "a", "")]]);
        let comments = MockCommentService {
            fail: true,
            ..MockCommentService::default()
        };
        let (mut session, command) = Session::new(options());
        session.handle_data(command.run(&feed, &comments));
        assert_eq!(session.listing().len(), 1);

        let command = session.handle_intent(Intent::OpenSelected).unwrap();
        session.handle_data(command.run(&feed, &comments));
        assert_eq!(session.screen(), Screen::Listing);
    }
}

use std::io::{self, Stdout};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::Utc;
use crossbeam_channel::{unbounded, Receiver, Sender};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph};
use ratatui::{Frame, Terminal};
use textwrap::{wrap, Options as WrapOptions};
use unicode_width::UnicodeWidthStr;
use url::Url;

use crate::comments::CommentForest;
use crate::data::{CommentService, FeedService, PostId, PostSummary};
use crate::listing;
use crate::markdown;
use crate::session::{self, Command, DataEvent, Intent, Screen, ScreenState, Session};
use crate::theme::Theme;

const SPINNER_FRAMES: [&str; 8] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧"];
const FILTER_CHAR_LIMIT: usize = 156;

pub struct Options {
    pub feed_service: Arc<dyn FeedService>,
    pub comment_service: Arc<dyn CommentService>,
    pub session: session::Options,
    pub theme: Theme,
    pub instance: Url,
}

struct Spinner {
    index: usize,
    last_tick: Instant,
}

impl Spinner {
    fn new() -> Self {
        Self {
            index: 0,
            last_tick: Instant::now(),
        }
    }

    fn frame(&self) -> &'static str {
        SPINNER_FRAMES[self.index % SPINNER_FRAMES.len()]
    }

    fn advance(&mut self) -> bool {
        let now = Instant::now();
        if now.duration_since(self.last_tick) >= Duration::from_millis(120) {
            self.index = (self.index + 1) % SPINNER_FRAMES.len();
            self.last_tick = now;
            true
        } else {
            false
        }
    }

    fn reset(&mut self) {
        self.index = 0;
        self.last_tick = Instant::now();
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
struct ContentKey {
    screen: Screen,
    post: PostId,
    width: u16,
}

struct ContentCache {
    key: ContentKey,
    lines: Vec<Line<'static>>,
}

pub struct Model {
    session: Session,
    feed_service: Arc<dyn FeedService>,
    comment_service: Arc<dyn CommentService>,
    response_tx: Sender<DataEvent>,
    response_rx: Receiver<DataEvent>,
    theme: Theme,
    markdown: markdown::Renderer,
    instance: Url,
    filter_input: Option<String>,
    list_state: ListState,
    scroll: u16,
    page_height: u16,
    content: Option<ContentCache>,
    status_message: Option<String>,
    spinner: Spinner,
    needs_redraw: bool,
}

impl Model {
    pub fn new(opts: Options) -> Self {
        let (response_tx, response_rx) = unbounded();
        let (session, initial) = Session::new(opts.session);
        let model = Self {
            session,
            feed_service: opts.feed_service,
            comment_service: opts.comment_service,
            response_tx,
            response_rx,
            markdown: markdown::Renderer::new(opts.theme.clone()),
            theme: opts.theme,
            instance: opts.instance,
            filter_input: None,
            list_state: ListState::default(),
            scroll: 0,
            page_height: 0,
            content: None,
            status_message: None,
            spinner: Spinner::new(),
            needs_redraw: true,
        };
        model.spawn(initial);
        model
    }

    pub fn run(&mut self) -> Result<()> {
        let mut stdout = io::stdout();
        enable_raw_mode()?;
        stdout.execute(EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;
        terminal.clear()?;

        let result = self.event_loop(&mut terminal);

        disable_raw_mode()?;
        terminal.backend_mut().execute(LeaveAlternateScreen)?;
        terminal.show_cursor()?;

        result
    }

    fn event_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
        let tick_rate = Duration::from_millis(120);
        let mut last_tick = Instant::now();

        loop {
            if self.poll_async() {
                self.needs_redraw = true;
            }

            if self.needs_redraw {
                terminal.draw(|frame| self.draw(frame))?;
                self.needs_redraw = false;
            }

            let timeout = tick_rate
                .checked_sub(last_tick.elapsed())
                .unwrap_or_else(|| Duration::from_millis(16));

            if event::poll(timeout)? {
                match event::read()? {
                    Event::Key(key) if key.kind == KeyEventKind::Press => {
                        if self.handle_key(key) {
                            break;
                        }
                        self.needs_redraw = true;
                    }
                    Event::Resize(_, _) => self.needs_redraw = true,
                    _ => {}
                }
            }

            if last_tick.elapsed() >= tick_rate {
                last_tick = Instant::now();
                if self.session.is_loading() {
                    if self.spinner.advance() {
                        self.needs_redraw = true;
                    }
                } else {
                    self.spinner.reset();
                }
            }
        }

        Ok(())
    }

    fn poll_async(&mut self) -> bool {
        let mut changed = false;
        while let Ok(event) = self.response_rx.try_recv() {
            self.apply(event);
            changed = true;
        }
        changed
    }

    fn apply(&mut self, event: DataEvent) {
        let before = self.session.screen();
        self.session.handle_data(event);
        self.after_transition(before);
    }

    fn spawn(&self, command: Command) {
        let tx = self.response_tx.clone();
        let feed = self.feed_service.clone();
        let comments = self.comment_service.clone();
        thread::spawn(move || {
            let event = command.run(feed.as_ref(), comments.as_ref());
            if tx.send(event).is_err() {
                tracing::debug!("event loop gone before fetch completed");
            }
        });
    }

    fn dispatch(&mut self, intent: Intent) {
        let before = self.session.screen();
        if let Some(command) = self.session.handle_intent(intent) {
            self.spawn(command);
        }
        self.after_transition(before);
    }

    fn after_transition(&mut self, before: Screen) {
        if self.session.screen() != before {
            self.scroll = 0;
            // Cached lines belong to the screen being left; a reopened thread is a new forest.
            self.content = None;
        }
        let listing = self.session.listing();
        let selected = (!listing.is_empty()).then(|| listing.selected_index());
        self.list_state.select(selected);
    }

    /// Returns `true` when the user asked to quit.
    fn handle_key(&mut self, key: KeyEvent) -> bool {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            return true;
        }
        self.status_message = None;

        if self.filter_input.is_some() {
            self.handle_filter_key(key.code);
            return false;
        }

        match key.code {
            KeyCode::Char('q') => return true,
            KeyCode::Char('o') => self.open_in_browser(),
            _ => match self.session.screen() {
                Screen::Listing => self.handle_listing_key(key.code),
                Screen::PostDetail | Screen::CommentThread => self.handle_reader_key(key.code),
            },
        }
        false
    }

    fn handle_filter_key(&mut self, code: KeyCode) {
        let Some(buffer) = self.filter_input.as_mut() else {
            return;
        };
        match code {
            KeyCode::Enter => {
                let text = buffer.trim_matches('\n').to_string();
                self.filter_input = None;
                self.dispatch(Intent::SubmitFilter(text));
            }
            KeyCode::Esc => self.filter_input = None,
            KeyCode::Backspace => {
                buffer.pop();
            }
            KeyCode::Char(ch) if buffer.chars().count() < FILTER_CHAR_LIMIT => buffer.push(ch),
            _ => {}
        }
    }

    fn handle_listing_key(&mut self, code: KeyCode) {
        match code {
            KeyCode::Enter | KeyCode::Char('/') => self.filter_input = Some(String::new()),
            KeyCode::Char('j') | KeyCode::Down => {
                let listing = self.session.listing();
                let at_end = listing.selected_index() + 1 >= listing.len();
                if at_end && !listing.is_empty() && !self.session.is_loading() {
                    self.dispatch(Intent::RequestNextPage);
                } else {
                    self.dispatch(Intent::SelectNext);
                }
            }
            KeyCode::Char('k') | KeyCode::Up => self.dispatch(Intent::SelectPrevious),
            KeyCode::Char('g') | KeyCode::Home => self.dispatch(Intent::SelectFirst),
            KeyCode::Char('G') | KeyCode::End => self.dispatch(Intent::SelectLast),
            KeyCode::Char('n') => self.dispatch(Intent::RequestNextPage),
            KeyCode::Char('l') | KeyCode::Right => self.dispatch(Intent::OpenSelected),
            _ => {}
        }
    }

    fn handle_reader_key(&mut self, code: KeyCode) {
        let page = self.page_height.max(1);
        match code {
            KeyCode::Char('j') | KeyCode::Down => self.scroll = self.scroll.saturating_add(1),
            KeyCode::Char('k') | KeyCode::Up => self.scroll = self.scroll.saturating_sub(1),
            KeyCode::PageDown | KeyCode::Char(' ') => {
                self.scroll = self.scroll.saturating_add(page)
            }
            KeyCode::PageUp => self.scroll = self.scroll.saturating_sub(page),
            KeyCode::Char('g') | KeyCode::Home => self.scroll = 0,
            KeyCode::Char('l') | KeyCode::Right | KeyCode::Char('c') => {
                self.dispatch(Intent::OpenSelected)
            }
            KeyCode::Char('h') | KeyCode::Left | KeyCode::Backspace | KeyCode::Esc => {
                self.dispatch(Intent::GoBack)
            }
            _ => {}
        }
    }

    fn open_in_browser(&mut self) {
        let Some(post) = self.session.focused_post() else {
            return;
        };
        let target = post_link(&self.instance, post);
        if let Err(err) = webbrowser::open(&target) {
            tracing::warn!(error = %err, url = %target, "failed to open browser");
            self.status_message = Some(format!("Could not open {target}: {err}"));
        } else {
            self.status_message = Some(format!("Opened {target}"));
        }
    }

    fn draw(&mut self, frame: &mut Frame<'_>) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .vertical_margin(self.theme.margin_vertical)
            .horizontal_margin(self.theme.margin_horizontal)
            .constraints([Constraint::Min(1), Constraint::Length(1)])
            .split(frame.size());

        match self.session.screen() {
            Screen::Listing => self.draw_listing(frame, chunks[0]),
            Screen::PostDetail | Screen::CommentThread => self.draw_reader(frame, chunks[0]),
        }
        self.draw_status(frame, chunks[1]);
    }

    fn draw_listing(&mut self, frame: &mut Frame<'_>, area: Rect) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(3), Constraint::Min(1)])
            .split(area);

        let editing = self.filter_input.is_some();
        let input_text = match &self.filter_input {
            Some(buffer) => Line::from(vec![
                Span::styled(buffer.clone(), self.theme.text_primary),
                Span::styled("▏", self.theme.accent),
            ]),
            None if self.session.cursor().filter.is_empty() => {
                Line::styled("Community Name", self.theme.text_secondary)
            }
            None => Line::styled(self.session.cursor().filter.clone(), self.theme.text_primary),
        };
        let input_block = Block::default()
            .borders(Borders::ALL)
            .border_style(if editing {
                self.theme.border
            } else {
                self.theme.text_secondary
            })
            .title(Span::styled(" Community ", self.theme.accent));
        frame.render_widget(Paragraph::new(input_text).block(input_block), chunks[0]);

        let ScreenState::Listing { items, .. } = self.session.view() else {
            return;
        };
        let rows: Vec<ListItem<'static>> = items
            .iter()
            .map(|item| {
                ListItem::new(vec![
                    Line::styled(item.title.clone(), self.theme.text_primary),
                    Line::styled(item.secondary.clone(), self.theme.text_secondary),
                ])
            })
            .collect();
        let title = if items.is_empty() && self.session.is_loading() {
            " Posts (loading) ".to_string()
        } else {
            format!(" Posts ({}) ", items.len())
        };
        let list = List::new(rows)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_style(self.theme.border)
                    .title(Span::styled(title, self.theme.accent)),
            )
            .highlight_style(self.theme.selected)
            .highlight_symbol("▌ ");
        frame.render_stateful_widget(list, chunks[1], &mut self.list_state);
    }

    fn draw_reader(&mut self, frame: &mut Frame<'_>, area: Rect) {
        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(self.theme.border)
            .title(Span::styled(
                match self.session.screen() {
                    Screen::CommentThread => " Comments ",
                    _ => " Post ",
                },
                self.theme.accent,
            ));
        let inner = block.inner(area);
        frame.render_widget(block, area);

        let Some(post) = self.session.focused_post() else {
            return;
        };
        let key = ContentKey {
            screen: self.session.screen(),
            post: post.id,
            width: inner.width,
        };
        let cache = match self.content.take() {
            Some(cache) if cache.key == key => cache,
            _ => ContentCache {
                key,
                lines: content_lines(
                    self.session.view(),
                    &self.markdown,
                    &self.theme,
                    usize::from(inner.width),
                ),
            },
        };

        self.page_height = inner.height;
        let max_scroll = cache.lines.len().saturating_sub(usize::from(inner.height));
        self.scroll = self.scroll.min(u16::try_from(max_scroll).unwrap_or(u16::MAX));
        let paragraph = Paragraph::new(cache.lines.clone()).scroll((self.scroll, 0));
        frame.render_widget(paragraph, inner);
        self.content = Some(cache);
    }

    fn draw_status(&self, frame: &mut Frame<'_>, area: Rect) {
        let line = if let Some(err) = self.session.last_error() {
            Line::styled(err.to_string(), self.theme.error)
        } else if let Some(message) = &self.status_message {
            Line::styled(message.clone(), self.theme.text_secondary)
        } else {
            let mut spans = Vec::new();
            if self.session.is_loading() {
                spans.push(Span::styled(
                    format!("{} ", self.spinner.frame()),
                    self.theme.accent,
                ));
            }
            spans.push(Span::styled(
                format!(
                    "{} · {}  ",
                    self.instance.host_str().unwrap_or_default(),
                    self.session.cursor()
                ),
                self.theme.text_primary,
            ));
            spans.push(Span::styled(
                key_hints(self.session.screen(), self.filter_input.is_some()),
                self.theme.text_secondary,
            ));
            Line::from(spans)
        };
        frame.render_widget(Paragraph::new(line), area);
    }
}

fn key_hints(screen: Screen, editing: bool) -> &'static str {
    if editing {
        return "enter: load community · esc: cancel";
    }
    match screen {
        Screen::Listing => "enter: community · j/k: move · l: open · n: next page · o: browser · q: quit",
        Screen::PostDetail => "j/k: scroll · l: comments · h: back · o: browser · q: quit",
        Screen::CommentThread => "j/k: scroll · h: back · o: browser · q: quit",
    }
}

fn post_link(instance: &Url, post: &PostSummary) -> String {
    if !post.url.is_empty() {
        return post.url.clone();
    }
    instance
        .join(&format!("post/{}", post.id))
        .map(|url| url.to_string())
        .unwrap_or_else(|_| instance.to_string())
}

fn content_lines(
    view: ScreenState<'_>,
    renderer: &markdown::Renderer,
    theme: &Theme,
    width: usize,
) -> Vec<Line<'static>> {
    match view {
        ScreenState::PostDetail { post } => {
            let mut lines = post_header(post, theme, width);
            for line in renderer.render(&post.body).lines {
                lines.extend(wrap_prefixed(&line, Vec::new(), width));
            }
            lines.push(Line::default());
            lines.push(Line::styled(
                format!("{} comments · press l to read them", post.comments),
                theme.text_secondary,
            ));
            lines
        }
        ScreenState::CommentThread { post, forest } => {
            let mut lines = post_header(post, theme, width);
            lines.extend(thread_lines(forest, renderer, theme, width));
            lines
        }
        ScreenState::Listing { .. } => Vec::new(),
    }
}

fn post_header(post: &PostSummary, theme: &Theme, width: usize) -> Vec<Line<'static>> {
    let title_style = theme.accent.add_modifier(Modifier::BOLD);
    let mut lines: Vec<Line<'static>> = wrap(&post.title, width.max(1))
        .into_iter()
        .map(|cow| Line::styled(cow.into_owned(), title_style))
        .collect();
    for cow in wrap(&listing::secondary_line(post, Utc::now()), width.max(1)) {
        lines.push(Line::styled(cow.into_owned(), theme.text_secondary));
    }
    lines.push(Line::default());
    lines
}

fn thread_lines(
    forest: &CommentForest,
    renderer: &markdown::Renderer,
    theme: &Theme,
    width: usize,
) -> Vec<Line<'static>> {
    if forest.is_empty() {
        return vec![Line::styled("No comments yet.", theme.text_secondary)];
    }

    let mut lines = Vec::new();
    for (depth, node) in forest.walk() {
        let prefix = depth_prefix(depth, theme);
        let author = if node.author.trim().is_empty() {
            "[deleted]".to_string()
        } else {
            node.author.clone()
        };
        let mut header = prefix.clone();
        header.push(Span::styled(
            author,
            Style::default()
                .fg(theme.depth_color(depth))
                .add_modifier(Modifier::BOLD),
        ));
        header.push(Span::styled(format!("  ▲ {}", node.score), theme.text_secondary));
        lines.push(Line::from(header));

        for line in renderer.render(&node.content).lines {
            lines.extend(wrap_prefixed(&line, prefix.clone(), width));
        }
        lines.push(Line::from(prefix));
    }
    lines
}

fn depth_prefix(depth: usize, theme: &Theme) -> Vec<Span<'static>> {
    (0..depth)
        .map(|level| Span::styled("│ ", Style::default().fg(theme.depth_color(level))))
        .collect()
}

/// Wraps a rendered markdown line to `width`, repeating `prefix` on every
/// visual line. Lines that already fit keep their original spans.
fn wrap_prefixed(line: &Line<'_>, prefix: Vec<Span<'static>>, width: usize) -> Vec<Line<'static>> {
    let prefix_width: usize = prefix.iter().map(|span| span.content.width()).sum();
    let available = width.saturating_sub(prefix_width).max(8);
    let text: String = line.spans.iter().map(|span| span.content.as_ref()).collect();

    if text.width() <= available {
        let mut spans = prefix;
        spans.extend(
            line.spans
                .iter()
                .map(|span| Span::styled(span.content.to_string(), span.style)),
        );
        return vec![Line::from(spans)];
    }

    let style = line
        .spans
        .iter()
        .rev()
        .find(|span| !span.content.trim().is_empty())
        .map(|span| span.style)
        .unwrap_or(line.style);
    wrap(&text, WrapOptions::new(available).break_words(true))
        .into_iter()
        .map(|cow| {
            let mut spans = prefix.clone();
            spans.push(Span::styled(cow.into_owned(), style));
            Line::from(spans)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{mock_post, CommentRecord, MockCommentService, MockFeedService};

    fn text_of(line: &Line<'_>) -> String {
        line.spans.iter().map(|span| span.content.as_ref()).collect()
    }

    fn record(id: i64, parent: Option<i64>, content: &str) -> CommentRecord {
        CommentRecord {
            id,
            parent,
            post_id: 1,
            author: format!("user{id}"),
            content: content.into(),
            score: id,
        }
    }

    #[test]
    fn thread_lines_indent_replies() {
        let theme = Theme::plain();
        let renderer = markdown::Renderer::new(theme.clone());
        let forest = CommentForest::build(&[
            record(1, None, "A"),
            record(2, Some(1), "B"),
            record(3, Some(2), "D"),
        ]);
        let lines: Vec<String> = thread_lines(&forest, &renderer, &theme, 80)
            .iter()
            .map(text_of)
            .collect();
        assert_eq!(
            lines,
            vec![
                "user1  ▲ 1",
                "A",
                "",
                "│ user2  ▲ 2",
                "│ B",
                "│ ",
                "│ │ user3  ▲ 3",
                "│ │ D",
                "│ │ ",
            ]
        );
    }

    #[test]
    fn empty_thread_says_so() {
        let theme = Theme::plain();
        let renderer = markdown::Renderer::new(theme.clone());
        let lines = thread_lines(&CommentForest::default(), &renderer, &theme, 80);
        assert_eq!(text_of(&lines[0]), "No comments yet.");
    }

    #[test]
    fn long_lines_wrap_under_prefix() {
        let prefix = vec![Span::raw("│ ")];
        let line = Line::raw("alpha beta gamma delta epsilon");
        let wrapped = wrap_prefixed(&line, prefix, 14);
        assert!(wrapped.len() > 1);
        for line in &wrapped {
            let text = text_of(line);
            assert!(text.starts_with("│ "));
            assert!(text.width() <= 14, "{text:?} too wide");
        }
    }

    #[test]
    fn self_posts_link_to_instance() {
        let instance = Url::parse("https://lemmy.ml/").unwrap();
        let mut post = mock_post(42, "t", "body");
        assert_eq!(post_link(&instance, &post), "https://example.org/post/42");
        post.url.clear();
        assert_eq!(post_link(&instance, &post), "https://lemmy.ml/post/42");
    }

    fn recv(model: &Model) -> DataEvent {
        model
            .response_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("worker result")
    }

    #[test]
    fn leaving_a_thread_drops_cached_lines() {
        let mut model = Model::new(Options {
            feed_service: Arc::new(MockFeedService::with_pages(vec![vec![mock_post(1, "a", "")]])),
            comment_service: Arc::new(MockCommentService {
                comments: vec![record(1, None, "first")],
                fail: false,
            }),
            session: session::Options::default(),
            theme: Theme::plain(),
            instance: Url::parse("https://lemmy.ml/").unwrap(),
        });
        let event = recv(&model);
        model.apply(event);

        model.dispatch(Intent::OpenSelected);
        let event = recv(&model);
        model.apply(event);
        assert_eq!(model.session.screen(), Screen::CommentThread);
        model.content = Some(ContentCache {
            key: ContentKey {
                screen: Screen::CommentThread,
                post: 1,
                width: 80,
            },
            lines: vec![Line::raw("first")],
        });

        model.dispatch(Intent::GoBack);
        assert_eq!(model.session.screen(), Screen::Listing);
        assert!(model.content.is_none());
    }
}

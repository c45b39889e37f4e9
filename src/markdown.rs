use pulldown_cmark::{CodeBlockKind, CowStr, Event, HeadingLevel, Options, Parser, Tag, TagEnd};
use ratatui::style::Style;
use ratatui::text::{Line, Span, Text};

use crate::theme::Theme;

/// Turns post and comment markdown into styled terminal lines. Never fails:
/// anything pulldown-cmark cannot make sense of comes through as plain text.
pub struct Renderer {
    theme: Theme,
}

impl Renderer {
    pub fn new(theme: Theme) -> Self {
        Self { theme }
    }

    pub fn render(&self, input: &str) -> Text<'static> {
        let mut opts = Options::empty();
        opts.insert(Options::ENABLE_STRIKETHROUGH);
        opts.insert(Options::ENABLE_TABLES);
        opts.insert(Options::ENABLE_TASKLISTS);

        let mut writer = Writer::default();
        writer.consume(Parser::new_ext(input, opts));
        Text::from(writer.finish(&self.theme))
    }
}

enum Block {
    Text(String),
    Heading(u8, String),
    Bullet {
        indent: usize,
        marker: String,
        text: String,
    },
    Quote(usize, String),
    Code(String),
    Blank,
}

#[derive(Default)]
struct Writer {
    blocks: Vec<Block>,
    buffer: String,
    lists: Vec<Option<u64>>,
    item: Option<(usize, String)>,
    quote_depth: usize,
    heading: Option<u8>,
    code: Option<String>,
    link: Option<String>,
}

impl Writer {
    fn consume<'a>(&mut self, events: impl Iterator<Item = Event<'a>>) {
        for event in events {
            match event {
                Event::Start(tag) => self.start(tag),
                Event::End(tag) => self.end(tag),
                Event::Text(text) => self.text(text),
                Event::Code(code) => self.buffer.push_str(&format!("`{code}`")),
                Event::SoftBreak => self.buffer.push(' '),
                Event::HardBreak => self.flush(),
                Event::Rule => {
                    self.flush();
                    self.blocks.push(Block::Text("―".repeat(20)));
                    self.blocks.push(Block::Blank);
                }
                Event::TaskListMarker(done) => {
                    self.buffer.push_str(if done { "[x] " } else { "[ ] " })
                }
                Event::FootnoteReference(name) => self.buffer.push_str(&format!("[{name}]")),
                Event::Html(_) | Event::InlineHtml(_) => {}
            }
        }
        self.flush();
    }

    fn start(&mut self, tag: Tag<'_>) {
        match tag {
            Tag::Paragraph => self.flush(),
            Tag::Heading { level, .. } => {
                self.flush();
                self.heading = Some(heading_level(level));
            }
            Tag::BlockQuote => {
                self.flush();
                self.quote_depth += 1;
            }
            Tag::CodeBlock(kind) => {
                self.flush();
                let fence = match kind {
                    CodeBlockKind::Fenced(lang) if !lang.is_empty() => format!("```{lang}"),
                    _ => "```".to_string(),
                };
                self.blocks.push(Block::Text(fence));
                self.code = Some(String::new());
            }
            Tag::List(start) => {
                self.flush();
                self.lists.push(start);
            }
            Tag::Item => {
                self.flush();
                let indent = self.lists.len().saturating_sub(1);
                let marker = match self.lists.last() {
                    Some(Some(n)) => format!("{n}."),
                    _ => "•".to_string(),
                };
                self.item = Some((indent, marker));
            }
            Tag::Link { dest_url, .. } => self.link = Some(dest_url.into_string()),
            Tag::Image { .. } => self.buffer.push_str("[image]"),
            Tag::TableCell => self.buffer.push_str("| "),
            _ => {}
        }
    }

    fn end(&mut self, tag: TagEnd) {
        match tag {
            TagEnd::Paragraph | TagEnd::BlockQuote | TagEnd::List(_) => {
                self.flush();
                if matches!(tag, TagEnd::BlockQuote) {
                    self.quote_depth = self.quote_depth.saturating_sub(1);
                }
                if matches!(tag, TagEnd::List(_)) {
                    self.lists.pop();
                }
                if self.item.is_none() {
                    self.blocks.push(Block::Blank);
                }
            }
            TagEnd::Heading(_) => {
                self.flush();
                self.heading = None;
                self.blocks.push(Block::Blank);
            }
            TagEnd::CodeBlock => {
                if let Some(code) = self.code.take() {
                    for line in code.trim_end_matches('\n').split('\n') {
                        self.blocks.push(Block::Code(line.to_string()));
                    }
                }
                self.blocks.push(Block::Text("```".to_string()));
                self.blocks.push(Block::Blank);
            }
            TagEnd::Item => {
                self.flush();
                if let Some(Some(n)) = self.lists.last_mut() {
                    *n += 1;
                }
                self.item = None;
            }
            TagEnd::Link => {
                if let Some(url) = self.link.take() {
                    if !self.buffer.ends_with(url.as_str()) {
                        self.buffer.push_str(&format!(" ({url})"));
                    }
                }
            }
            TagEnd::TableRow | TagEnd::TableHead => self.flush(),
            _ => {}
        }
    }

    fn text(&mut self, text: CowStr<'_>) {
        match self.code.as_mut() {
            Some(code) => code.push_str(&text),
            None => self.buffer.push_str(&text),
        }
    }

    fn flush(&mut self) {
        let text = self.buffer.trim().to_string();
        self.buffer.clear();
        if text.is_empty() {
            return;
        }
        let block = if let Some(level) = self.heading {
            Block::Heading(level, text)
        } else if let Some((indent, marker)) = &self.item {
            Block::Bullet {
                indent: *indent,
                marker: marker.clone(),
                text,
            }
        } else if self.quote_depth > 0 {
            Block::Quote(self.quote_depth, text)
        } else {
            Block::Text(text)
        };
        self.blocks.push(block);
    }

    fn finish(mut self, theme: &Theme) -> Vec<Line<'static>> {
        while matches!(self.blocks.last(), Some(Block::Blank)) {
            self.blocks.pop();
        }
        let mut lines = Vec::with_capacity(self.blocks.len());
        let mut previous_blank = true;
        for block in self.blocks {
            let blank = matches!(block, Block::Blank);
            if blank && previous_blank {
                continue;
            }
            previous_blank = blank;
            lines.push(match block {
                Block::Text(text) => Line::styled(text, theme.text_primary),
                Block::Heading(level, text) => Line::styled(text, theme.heading_style(level)),
                Block::Bullet {
                    indent,
                    marker,
                    text,
                } => Line::from(vec![
                    Span::raw("  ".repeat(indent)),
                    Span::styled(format!("{marker} "), theme.bullet),
                    Span::styled(text, theme.text_primary),
                ]),
                Block::Quote(depth, text) => Line::styled(
                    format!("{} {}", ">".repeat(depth), text),
                    theme.quote,
                ),
                Block::Code(text) => Line::styled(text, theme.code),
                Block::Blank => Line::default(),
            });
        }
        if lines.is_empty() {
            lines.push(Line::styled(String::new(), Style::default()));
        }
        lines
    }
}

fn heading_level(level: HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}

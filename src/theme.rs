use ratatui::style::{Color, Modifier, Style};

use crate::config::UIConfig;

const COMMENT_DEPTH_COLORS: [Color; 6] = [
    Color::Rgb(250, 179, 135),
    Color::Rgb(166, 227, 161),
    Color::Rgb(203, 166, 247),
    Color::Rgb(245, 194, 231),
    Color::Rgb(137, 220, 235),
    Color::Rgb(249, 226, 175),
];

/// Layout and colours handed to the renderer. Built once from config.
#[derive(Debug, Clone, PartialEq)]
pub struct Theme {
    pub margin_vertical: u16,
    pub margin_horizontal: u16,
    pub text_primary: Style,
    pub text_secondary: Style,
    pub accent: Style,
    pub selected: Style,
    pub border: Style,
    pub error: Style,
    pub heading: [Style; 4],
    pub quote: Style,
    pub code: Style,
    pub bullet: Style,
    pub depth_colors: Vec<Color>,
}

impl Default for Theme {
    fn default() -> Self {
        let primary = Color::Rgb(205, 214, 244);
        let accent = Color::Rgb(137, 180, 250);
        Self {
            margin_vertical: 1,
            margin_horizontal: 2,
            text_primary: Style::default().fg(primary),
            text_secondary: Style::default().fg(Color::Rgb(166, 173, 200)),
            accent: Style::default().fg(accent),
            selected: Style::default()
                .bg(Color::Rgb(69, 71, 90))
                .fg(primary)
                .add_modifier(Modifier::BOLD),
            border: Style::default().fg(accent),
            error: Style::default().fg(Color::Rgb(243, 139, 168)),
            heading: [
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD | Modifier::UNDERLINED),
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD),
                Style::default()
                    .fg(Color::Magenta)
                    .add_modifier(Modifier::BOLD),
                Style::default().fg(Color::Magenta),
            ],
            quote: Style::default().fg(Color::Green),
            code: Style::default().fg(Color::Cyan),
            bullet: Style::default().fg(Color::Yellow),
            depth_colors: COMMENT_DEPTH_COLORS.to_vec(),
        }
    }
}

impl Theme {
    /// No colours at all; emphasis only through modifiers.
    pub fn plain() -> Self {
        let bold = Style::default().add_modifier(Modifier::BOLD);
        Self {
            margin_vertical: 1,
            margin_horizontal: 2,
            text_primary: Style::default(),
            text_secondary: Style::default().add_modifier(Modifier::DIM),
            accent: bold,
            selected: Style::default().add_modifier(Modifier::REVERSED),
            border: Style::default(),
            error: bold,
            heading: [
                bold.add_modifier(Modifier::UNDERLINED),
                bold,
                bold,
                Style::default(),
            ],
            quote: Style::default().add_modifier(Modifier::ITALIC),
            code: Style::default(),
            bullet: Style::default(),
            depth_colors: vec![Color::Reset],
        }
    }

    pub fn from_config(cfg: &UIConfig) -> Self {
        match cfg.theme.trim().to_ascii_lowercase().as_str() {
            "plain" | "mono" => Self::plain(),
            _ => Self::default(),
        }
    }

    pub fn heading_style(&self, level: u8) -> Style {
        let index = usize::from(level.clamp(1, 4)) - 1;
        self.heading[index]
    }

    pub fn depth_color(&self, depth: usize) -> Color {
        if self.depth_colors.is_empty() {
            return Color::Reset;
        }
        self.depth_colors[depth % self.depth_colors.len()]
    }
}

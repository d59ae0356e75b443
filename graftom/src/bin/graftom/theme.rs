use clap::builder::styling::{AnsiColor, Color as ClapColor, Style, Styles};
use colored::Color;
use once_cell::sync::Lazy;

/// Kind of status line printed by the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Success,
    Warning,
    Info,
    /// Verbose-only details.
    Detail,
}

impl Tone {
    pub fn color(self) -> Color {
        match self {
            Tone::Success => Color::Green,
            Tone::Warning => Color::Yellow,
            Tone::Info => Color::Blue,
            Tone::Detail => Color::BrightBlack,
        }
    }

    pub fn mark(self) -> &'static str {
        match self {
            Tone::Success => "✓",
            Tone::Warning => "⚠",
            Tone::Info => "ℹ",
            Tone::Detail => "•",
        }
    }
}

pub const HEADING: Color = Color::BrightBlue;
pub const LABEL: Color = Color::BrightCyan;
pub const VALUE: Color = Color::White;

/// Help output colors, in line with the status tones.
pub static HELP_STYLES: Lazy<Styles> = Lazy::new(|| {
    Styles::styled()
        .usage(ansi(AnsiColor::BrightBlue).bold())
        .header(ansi(AnsiColor::Cyan).bold())
        .literal(ansi(AnsiColor::BrightCyan))
        .placeholder(ansi(AnsiColor::BrightBlack))
        .valid(ansi(AnsiColor::Green))
        .invalid(ansi(AnsiColor::Yellow))
        .error(ansi(AnsiColor::Red).bold())
});

fn ansi(color: AnsiColor) -> Style {
    Style::new().fg_color(Some(ClapColor::Ansi(color)))
}

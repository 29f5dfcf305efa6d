//! UI Theme - colors, icons and column widths for task rows

use crossterm::style::Color;

#[derive(Debug, Clone, Default)]
pub struct Theme {
    pub colors: ColorScheme,
    pub icons: Icons,
    pub layout: Layout,
}

#[derive(Debug, Clone)]
pub struct ColorScheme {
    /// Task titles
    pub title: Color,
    /// Subtitles (platform/arch)
    pub subtitle: Color,
    pub secondary: Color,
    pub success: Color,
    pub error: Color,
    /// Running tasks
    pub active: Color,
}

impl Default for ColorScheme {
    fn default() -> Self {
        Self {
            title: Color::Cyan,
            subtitle: Color::White,
            secondary: Color::DarkGrey,
            success: Color::Green,
            error: Color::Red,
            active: Color::Red,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Icons {
    /// ○
    pub pending: &'static str,
    /// ●
    pub active: &'static str,
    /// ✓
    pub success: &'static str,
    /// ✗
    pub error: &'static str,
    /// –
    pub skipped: &'static str,
}

impl Default for Icons {
    fn default() -> Self {
        Self {
            pending: "○",
            active: "●",
            success: "✓",
            error: "✗",
            skipped: "-",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Layout {
    /// Width of the icon + title column
    pub title_width: usize,
    /// Width of the subtitle column
    pub subtitle_width: usize,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            title_width: 44,
            subtitle_width: 16,
        }
    }
}

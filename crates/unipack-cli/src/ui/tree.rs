//! Task tree rendering
//!
//! One row per task, drawn into a [`RelativeFrame`] so rows update in place.
//! Running rows blink; everything else is redrawn only when it changes.

use super::engine::RelativeFrame;
use super::theme::Theme;
use crossterm::style::Stylize;
use std::io::Write;
use std::time::Instant;
use unipack_core::reporter::{TaskLine, TaskState};

#[derive(Debug, Clone)]
struct Row {
    line: TaskLine,
    state: TaskState,
}

pub struct TreeRenderer<W: Write> {
    rows: Vec<Row>,
    theme: Theme,
    started_at: Instant,
    frame: Option<RelativeFrame<W>>,
}

impl<W: Write> std::fmt::Debug for TreeRenderer<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeRenderer")
            .field("rows", &self.rows.len())
            .finish_non_exhaustive()
    }
}

impl<W: Write> TreeRenderer<W> {
    pub fn new(theme: Theme) -> Self {
        Self {
            rows: Vec::new(),
            theme,
            started_at: Instant::now(),
            frame: None,
        }
    }

    /// Reserve a row per task and draw them all as pending
    pub fn prepare(&mut self, out: W, lines: &[TaskLine]) {
        if let Some(mut frame) = self.frame.take() {
            let _ = frame.finish();
        }
        self.rows = lines
            .iter()
            .map(|line| Row {
                line: line.clone(),
                state: TaskState::Pending,
            })
            .collect();

        let mut frame = RelativeFrame::new(out, self.rows.len() as u16);
        let _ = frame.start();
        self.frame = Some(frame);
        self.render_all();
    }

    pub fn update(&mut self, id: usize, state: TaskState) {
        if let Some(row) = self.rows.get_mut(id) {
            row.state = state;
        }
        self.render_row(id);
        if let Some(frame) = self.frame.as_mut() {
            let _ = frame.flush();
        }
    }

    /// Redraw running rows so their icon blinks
    pub fn render_active(&mut self) {
        let active: Vec<usize> = self
            .rows
            .iter()
            .enumerate()
            .filter(|(_, r)| r.state == TaskState::Running)
            .map(|(i, _)| i)
            .collect();
        if active.is_empty() {
            return;
        }
        for idx in active {
            self.render_row(idx);
        }
        if let Some(frame) = self.frame.as_mut() {
            let _ = frame.flush();
        }
    }

    pub fn render_all(&mut self) {
        for idx in 0..self.rows.len() {
            self.render_row(idx);
        }
        if let Some(frame) = self.frame.as_mut() {
            let _ = frame.flush();
        }
    }

    /// Release the frame, leaving the cursor below it
    pub fn finish(&mut self) {
        self.render_all();
        if let Some(mut frame) = self.frame.take() {
            let _ = frame.finish();
        }
    }

    fn blink_icon(&self) -> &'static str {
        // 200ms per frame, independent of how often we are asked to draw
        let frame = self.started_at.elapsed().as_millis() / 200;
        if frame % 2 == 0 {
            self.theme.icons.active
        } else {
            self.theme.icons.pending
        }
    }

    fn render_row(&mut self, idx: usize) {
        let Some(row) = self.rows.get(idx).cloned() else {
            return;
        };
        let icon = match &row.state {
            TaskState::Pending => self.theme.icons.pending,
            TaskState::Running => self.blink_icon(),
            TaskState::Done => self.theme.icons.success,
            TaskState::Failed(_) => self.theme.icons.error,
            TaskState::Skipped => self.theme.icons.skipped,
        };
        let line = format_row(&self.theme, &row.line, &row.state, icon);

        if let Some(frame) = self.frame.as_mut() {
            let _ = frame.write_row(idx as u16, |out| write!(out, "{line}"));
        }
    }
}

impl<W: Write> Drop for TreeRenderer<W> {
    fn drop(&mut self) {
        if let Some(mut frame) = self.frame.take() {
            let _ = frame.finish();
        }
    }
}

fn format_row(theme: &Theme, line: &TaskLine, state: &TaskState, icon: &str) -> String {
    let (title_color, status_color) = match state {
        TaskState::Pending | TaskState::Skipped => (theme.colors.secondary, theme.colors.secondary),
        TaskState::Running => (theme.colors.title, theme.colors.secondary),
        TaskState::Done => (theme.colors.title, theme.colors.success),
        TaskState::Failed(_) => (theme.colors.title, theme.colors.error),
    };
    let status = match state {
        TaskState::Pending => "pending".to_string(),
        TaskState::Running => "running...".to_string(),
        TaskState::Done => "done".to_string(),
        TaskState::Failed(reason) => format!("FAILED: {reason}"),
        TaskState::Skipped => "skipped".to_string(),
    };

    // Children are indented under their parent with a branch marker
    let prefix = if line.depth > 0 {
        format!("{:indent$}└─ ", "", indent = line.depth * 2)
    } else {
        String::new()
    };
    let title = format!("  {prefix}{icon} {}", line.title);
    let title = format!("{title: <width$}", width = theme.layout.title_width);
    let subtitle = format!(
        "{: <width$}",
        line.subtitle,
        width = theme.layout.subtitle_width
    );

    format!(
        "{} {} {}",
        title.with(title_color),
        subtitle.with(theme.colors.subtitle),
        status.with(status_color)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(id: usize, depth: usize, title: &str) -> TaskLine {
        TaskLine {
            id,
            depth,
            title: title.to_string(),
            subtitle: "qemu/x86_64".to_string(),
        }
    }

    #[test]
    fn test_format_row_contents() {
        let theme = Theme::default();
        let row = format_row(
            &theme,
            &line(0, 0, "packaging hello (tarball)"),
            &TaskState::Failed("disk full".into()),
            theme.icons.error,
        );
        assert!(row.contains("packaging hello (tarball)"));
        assert!(row.contains("qemu/x86_64"));
        assert!(row.contains("FAILED: disk full"));
    }

    #[test]
    fn test_children_are_indented() {
        let theme = Theme::default();
        let row = format_row(&theme, &line(1, 1, "child"), &TaskState::Done, "✓");
        assert!(row.contains("└─ ✓ child"));
    }

    #[test]
    fn test_update_ignores_unknown_rows() {
        let mut renderer = TreeRenderer::new(Theme::default());
        renderer.prepare(Vec::<u8>::new(), &[line(0, 0, "only")]);
        renderer.update(7, TaskState::Done);
        renderer.update(0, TaskState::Done);
        assert_eq!(renderer.rows[0].state, TaskState::Done);
        renderer.finish();
    }
}

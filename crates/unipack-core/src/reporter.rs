//! Reporter trait for dependency injection
//!
//! The process tree reports task transitions through this trait so that core
//! logic is not coupled to a specific terminal implementation. The CLI provides
//! an interactive renderer; the core ships a line-oriented one.

use std::io::Write;
use std::sync::{Arc, Mutex};
use unipack_schema::LogType;

/// Which renderer a process tree should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    /// Redraw task rows in place.
    Fancy,
    /// One line per transition, no cursor control.
    Plain,
}

impl RenderMode {
    /// Anything other than the fancy log type renders plainly.
    pub fn from_log_type(log_type: LogType) -> Self {
        if log_type == LogType::Fancy {
            Self::Fancy
        } else {
            Self::Plain
        }
    }
}

/// Position of a task inside a tree, stable for the lifetime of one run.
pub type TaskId = usize;

/// A row the renderer reserves before the tree starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskLine {
    pub id: TaskId,
    pub depth: usize,
    pub title: String,
    pub subtitle: String,
}

/// Lifecycle of a single task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Running,
    Done,
    Failed(String),
    /// Never started because a sibling failed or the run was cancelled.
    Skipped,
}

impl TaskState {
    /// Returns `true` once the task can no longer change.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed(_) | Self::Skipped)
    }
}

/// Receives process tree progress.
pub trait TaskReporter: Send + Sync {
    /// Reserve rows for every task of a tree, in display order.
    fn prepare(&self, tasks: &[TaskLine]);

    /// Report a task transition.
    fn transition(&self, id: TaskId, state: &TaskState);

    /// The tree finished (successfully or not); release the display.
    fn finish(&self);
}

impl<T: TaskReporter + ?Sized> TaskReporter for Arc<T> {
    fn prepare(&self, tasks: &[TaskLine]) {
        (**self).prepare(tasks);
    }
    fn transition(&self, id: TaskId, state: &TaskState) {
        (**self).transition(id, state);
    }
    fn finish(&self) {
        (**self).finish();
    }
}

/// Builds the reporter a tree should render to.
///
/// Frontends that can draw interactively return their own reporter for
/// [`RenderMode::Fancy`]; everything else falls back to [`PlainReporter`].
pub trait RendererFactory: Send + Sync {
    /// Reporter for one tree run in `mode`.
    fn renderer(&self, mode: RenderMode) -> Arc<dyn TaskReporter>;
}

/// A no-op reporter for silent operations (e.g., testing).
#[derive(Debug, Clone, Copy)]
pub struct NullReporter;

impl TaskReporter for NullReporter {
    fn prepare(&self, _: &[TaskLine]) {}
    fn transition(&self, _: TaskId, _: &TaskState) {}
    fn finish(&self) {}
}

/// Writes one line per transition.
pub struct PlainReporter {
    out: Mutex<Box<dyn Write + Send>>,
    lines: Mutex<Vec<TaskLine>>,
}

impl std::fmt::Debug for PlainReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlainReporter").finish_non_exhaustive()
    }
}

impl PlainReporter {
    /// Report to any writer.
    pub fn new(out: impl Write + Send + 'static) -> Self {
        Self {
            out: Mutex::new(Box::new(out)),
            lines: Mutex::new(Vec::new()),
        }
    }

    /// Report to standard error.
    pub fn stderr() -> Self {
        Self::new(std::io::stderr())
    }

    fn format_line(line: &TaskLine, state: &TaskState) -> String {
        let indent = "  ".repeat(line.depth);
        let status = match state {
            TaskState::Pending => "pending".to_string(),
            TaskState::Running => "running".to_string(),
            TaskState::Done => "done".to_string(),
            TaskState::Failed(reason) => format!("failed: {reason}"),
            TaskState::Skipped => "skipped".to_string(),
        };
        if line.subtitle.is_empty() {
            format!("{indent}[{status}] {}", line.title)
        } else {
            format!("{indent}[{status}] {} [{}]", line.title, line.subtitle)
        }
    }
}

impl TaskReporter for PlainReporter {
    fn prepare(&self, tasks: &[TaskLine]) {
        if let Ok(mut lines) = self.lines.lock() {
            *lines = tasks.to_vec();
        }
    }

    fn transition(&self, id: TaskId, state: &TaskState) {
        // Pending rows carry no information in a log
        if *state == TaskState::Pending {
            return;
        }
        let Some(line) = self
            .lines
            .lock()
            .ok()
            .and_then(|lines| lines.iter().find(|l| l.id == id).cloned())
        else {
            return;
        };
        if let Ok(mut out) = self.out.lock() {
            let _ = writeln!(out, "{}", Self::format_line(&line, state));
        }
    }

    fn finish(&self) {
        if let Ok(mut out) = self.out.lock() {
            let _ = out.flush();
        }
    }
}

//! Process tree - observable task execution
//!
//! A [`ProcessTree`] runs an ordered list of named tasks, optionally nested,
//! and reports every transition to a [`TaskReporter`].
//!
//! ```text
//! packaging hello (tarball)   qemu/x86_64   ●
//! packaging hello (tarball)   fc/x86_64     ○
//! ```
//!
//! # Execution model
//!
//! - **Sequential** (default): siblings run in declaration order. The first
//!   failure stops the remaining siblings and is returned as-is.
//! - **Parallel**: siblings are polled concurrently on the calling task. The
//!   first failure is returned and the siblings still in flight are dropped,
//!   so nothing keeps running after [`ProcessTree::start`] returns.
//!
//! Children run after their parent's own action completes, following the same
//! rule as the tree. Tasks borrow from the caller (the tree is not `'static`),
//! which lets an action push results into a local collection.

use std::future::Future;
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::reporter::{NullReporter, TaskId, TaskLine, TaskReporter, TaskState};

type TaskAction<'a> = Box<dyn FnOnce() -> BoxFuture<'a, Result<()>> + Send + 'a>;

/// A single node of a process tree.
pub struct ProcessTreeItem<'a> {
    title: String,
    subtitle: String,
    action: Option<TaskAction<'a>>,
    children: Vec<ProcessTreeItem<'a>>,
}

impl std::fmt::Debug for ProcessTreeItem<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessTreeItem")
            .field("title", &self.title)
            .field("subtitle", &self.subtitle)
            .field("children", &self.children)
            .finish_non_exhaustive()
    }
}

impl<'a> ProcessTreeItem<'a> {
    /// Create a task running `action`.
    pub fn new<F, Fut>(title: impl Into<String>, subtitle: impl Into<String>, action: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'a,
        Fut: Future<Output = Result<()>> + Send + 'a,
    {
        Self {
            title: title.into(),
            subtitle: subtitle.into(),
            action: Some(Box::new(move || -> BoxFuture<'a, Result<()>> {
                Box::pin(action())
            })),
            children: Vec::new(),
        }
    }

    /// Create a task that only groups its children.
    pub fn group(title: impl Into<String>, subtitle: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            subtitle: subtitle.into(),
            action: None,
            children: Vec::new(),
        }
    }

    /// Nest `child` under this task.
    pub fn with_child(mut self, child: ProcessTreeItem<'a>) -> Self {
        self.children.push(child);
        self
    }

    /// Task title.
    pub fn title(&self) -> &str {
        &self.title
    }
}

/// How a tree runs and where it reports.
#[derive(Clone)]
pub struct ProcessTreeOptions {
    parallel: bool,
    renderer: Arc<dyn TaskReporter>,
    cancel: Option<CancellationToken>,
}

impl std::fmt::Debug for ProcessTreeOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessTreeOptions")
            .field("parallel", &self.parallel)
            .field("cancel", &self.cancel)
            .finish_non_exhaustive()
    }
}

impl Default for ProcessTreeOptions {
    fn default() -> Self {
        Self {
            parallel: false,
            renderer: Arc::new(NullReporter),
            cancel: None,
        }
    }
}

impl ProcessTreeOptions {
    /// Sequential, silent, not cancellable.
    pub fn new() -> Self {
        Self::default()
    }

    /// Run siblings concurrently.
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Report to `renderer`.
    pub fn with_renderer(mut self, renderer: Arc<dyn TaskReporter>) -> Self {
        self.renderer = renderer;
        self
    }

    /// Stop before starting any further task once `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// A tree of tasks ready to run once.
pub struct ProcessTree<'a> {
    options: ProcessTreeOptions,
    items: Vec<ProcessTreeItem<'a>>,
}

impl std::fmt::Debug for ProcessTree<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessTree")
            .field("options", &self.options)
            .field("items", &self.items)
            .finish()
    }
}

/// Internal node with its assigned id.
struct Node<'a> {
    id: TaskId,
    action: Option<TaskAction<'a>>,
    children: Vec<Node<'a>>,
}

impl<'a> ProcessTree<'a> {
    /// Build a tree.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Task`] if `items` is empty.
    pub fn new(options: ProcessTreeOptions, items: Vec<ProcessTreeItem<'a>>) -> Result<Self> {
        if items.is_empty() {
            return Err(Error::Task("process tree has no tasks".to_string()));
        }
        Ok(Self { options, items })
    }

    /// Run every task and return the first error encountered.
    ///
    /// # Errors
    ///
    /// Returns the error of the first failing task, or [`Error::Cancelled`]
    /// if the cancellation token fired before a task started.
    pub async fn start(self) -> Result<()> {
        let mut lines = Vec::new();
        let nodes = flatten(self.items, 0, &mut lines);

        let runner = Runner {
            parallel: self.options.parallel,
            renderer: self.options.renderer,
            cancel: self.options.cancel,
            states: Mutex::new(vec![TaskState::Pending; lines.len()]),
        };

        runner.renderer.prepare(&lines);
        for line in &lines {
            runner.renderer.transition(line.id, &TaskState::Pending);
        }

        let result = runner.run_level(nodes).await;

        runner.settle();
        runner.renderer.finish();

        result
    }
}

/// Assign ids depth-first, recording display rows on the way.
fn flatten<'a>(items: Vec<ProcessTreeItem<'a>>, depth: usize, lines: &mut Vec<TaskLine>) -> Vec<Node<'a>> {
    items
        .into_iter()
        .map(|item| {
            let id = lines.len();
            lines.push(TaskLine {
                id,
                depth,
                title: item.title,
                subtitle: item.subtitle,
            });
            Node {
                id,
                action: item.action,
                children: flatten(item.children, depth + 1, lines),
            }
        })
        .collect()
}

struct Runner {
    parallel: bool,
    renderer: Arc<dyn TaskReporter>,
    cancel: Option<CancellationToken>,
    states: Mutex<Vec<TaskState>>,
}

impl Runner {
    fn set(&self, id: TaskId, state: TaskState) {
        if let Ok(mut states) = self.states.lock() {
            if let Some(slot) = states.get_mut(id) {
                slot.clone_from(&state);
            }
        }
        self.renderer.transition(id, &state);
    }

    /// Close out tasks that never reached a terminal state.
    fn settle(&self) {
        let pending: Vec<(TaskId, TaskState)> = match self.states.lock() {
            Ok(states) => states
                .iter()
                .enumerate()
                .filter(|(_, s)| !s.is_terminal())
                .map(|(id, s)| {
                    let next = if *s == TaskState::Running {
                        TaskState::Failed("interrupted".to_string())
                    } else {
                        TaskState::Skipped
                    };
                    (id, next)
                })
                .collect(),
            Err(_) => return,
        };
        for (id, state) in pending {
            self.set(id, state);
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled)
    }

    fn run_level<'s, 'a: 's>(&'s self, nodes: Vec<Node<'a>>) -> BoxFuture<'s, Result<()>> {
        Box::pin(async move {
            if !self.parallel {
                for node in nodes {
                    self.run_node(node).await?;
                }
                return Ok(());
            }

            let mut running: FuturesUnordered<_> =
                nodes.into_iter().map(|node| self.run_node(node)).collect();

            while let Some(res) = running.next().await {
                if let Err(e) = res {
                    // Dropping the set cancels the siblings still in flight
                    drop(running);
                    return Err(e);
                }
            }
            Ok(())
        })
    }

    fn run_node<'s, 'a: 's>(&'s self, node: Node<'a>) -> BoxFuture<'s, Result<()>> {
        Box::pin(async move {
            if self.is_cancelled() {
                return Err(Error::Cancelled);
            }

            self.set(node.id, TaskState::Running);

            if let Some(action) = node.action {
                if let Err(e) = action().await {
                    tracing::debug!(task = node.id, "task failed: {e}");
                    self.set(node.id, TaskState::Failed(e.to_string()));
                    return Err(e);
                }
            }

            if !node.children.is_empty() {
                if let Err(e) = self.run_level(node.children).await {
                    self.set(node.id, TaskState::Failed(e.to_string()));
                    return Err(e);
                }
            }

            self.set(node.id, TaskState::Done);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    /// Records every transition for later inspection.
    #[derive(Default)]
    struct RecordingReporter {
        lines: Mutex<Vec<TaskLine>>,
        events: Mutex<Vec<(TaskId, TaskState)>>,
        finished: Mutex<bool>,
    }

    impl TaskReporter for RecordingReporter {
        fn prepare(&self, tasks: &[TaskLine]) {
            *self.lines.lock().unwrap() = tasks.to_vec();
        }
        fn transition(&self, id: TaskId, state: &TaskState) {
            self.events.lock().unwrap().push((id, state.clone()));
        }
        fn finish(&self) {
            *self.finished.lock().unwrap() = true;
        }
    }

    impl RecordingReporter {
        fn last_state(&self, id: TaskId) -> Option<TaskState> {
            self.events
                .lock()
                .unwrap()
                .iter()
                .rev()
                .find(|(i, _)| *i == id)
                .map(|(_, s)| s.clone())
        }
    }

    fn logging_task<'a>(
        name: &'static str,
        log: &'a Mutex<Vec<&'static str>>,
        fail: bool,
    ) -> ProcessTreeItem<'a> {
        ProcessTreeItem::new(name, "", move || async move {
            log.lock().unwrap().push(name);
            if fail {
                Err(Error::usage(format!("{name} failed")))
            } else {
                Ok(())
            }
        })
    }

    #[tokio::test]
    async fn test_sequential_runs_in_order() {
        let log = Mutex::new(Vec::new());
        let tree = ProcessTree::new(
            ProcessTreeOptions::new(),
            vec![
                logging_task("one", &log, false),
                logging_task("two", &log, false),
                logging_task("three", &log, false),
            ],
        )
        .unwrap();

        tree.start().await.unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn test_sequential_failure_stops_siblings() {
        let log = Mutex::new(Vec::new());
        let reporter = Arc::new(RecordingReporter::default());
        let tree = ProcessTree::new(
            ProcessTreeOptions::new().with_renderer(reporter.clone()),
            vec![
                logging_task("one", &log, false),
                logging_task("two", &log, true),
                logging_task("three", &log, false),
            ],
        )
        .unwrap();

        let err = tree.start().await.unwrap_err();
        assert_eq!(err.to_string(), "two failed");
        assert_eq!(*log.lock().unwrap(), vec!["one", "two"]);

        assert_eq!(reporter.last_state(0), Some(TaskState::Done));
        assert_eq!(
            reporter.last_state(1),
            Some(TaskState::Failed("two failed".to_string()))
        );
        assert_eq!(reporter.last_state(2), Some(TaskState::Skipped));
        assert!(
            !reporter
                .events
                .lock()
                .unwrap()
                .contains(&(2, TaskState::Running))
        );
        assert!(*reporter.finished.lock().unwrap());
    }

    #[tokio::test]
    async fn test_parallel_failure_does_not_hang() {
        let reporter = Arc::new(RecordingReporter::default());
        let tree = ProcessTree::new(
            ProcessTreeOptions::new()
                .parallel(true)
                .with_renderer(reporter.clone()),
            vec![
                ProcessTreeItem::new("forever", "", || async {
                    futures::future::pending::<()>().await;
                    Ok(())
                }),
                ProcessTreeItem::new("broken", "", || async {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    Err(Error::usage("broken"))
                }),
            ],
        )
        .unwrap();

        let result = tokio::time::timeout(Duration::from_secs(5), tree.start())
            .await
            .expect("tree must not block on a sibling");
        assert_eq!(result.unwrap_err().to_string(), "broken");
        assert_eq!(
            reporter.last_state(0),
            Some(TaskState::Failed("interrupted".to_string()))
        );
    }

    #[tokio::test]
    async fn test_parallel_runs_concurrently() {
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        // The receiver only completes if the sender task runs at the same time
        let tree = ProcessTree::new(
            ProcessTreeOptions::new().parallel(true),
            vec![
                ProcessTreeItem::new("wait", "", move || async move {
                    rx.await.map_err(|e| Error::Task(e.to_string()))
                }),
                ProcessTreeItem::new("signal", "", move || async move {
                    let _ = tx.send(());
                    Ok(())
                }),
            ],
        )
        .unwrap();

        tokio::time::timeout(Duration::from_secs(5), tree.start())
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_children_follow_parent() {
        let log = Mutex::new(Vec::new());
        let reporter = Arc::new(RecordingReporter::default());
        let tree = ProcessTree::new(
            ProcessTreeOptions::new().with_renderer(reporter.clone()),
            vec![
                logging_task("parent", &log, false)
                    .with_child(logging_task("child-a", &log, false))
                    .with_child(logging_task("child-b", &log, false)),
                logging_task("sibling", &log, false),
            ],
        )
        .unwrap();

        tree.start().await.unwrap();
        assert_eq!(
            *log.lock().unwrap(),
            vec!["parent", "child-a", "child-b", "sibling"]
        );

        let lines = reporter.lines.lock().unwrap().clone();
        let depths: Vec<usize> = lines.iter().map(|l| l.depth).collect();
        assert_eq!(depths, vec![0, 1, 1, 0]);
    }

    #[tokio::test]
    async fn test_child_failure_fails_parent() {
        let log = Mutex::new(Vec::new());
        let reporter = Arc::new(RecordingReporter::default());
        let tree = ProcessTree::new(
            ProcessTreeOptions::new().with_renderer(reporter.clone()),
            vec![
                ProcessTreeItem::group("group", "")
                    .with_child(logging_task("bad", &log, true)),
                logging_task("after", &log, false),
            ],
        )
        .unwrap();

        assert!(tree.start().await.is_err());
        assert_eq!(*log.lock().unwrap(), vec!["bad"]);
        assert!(matches!(reporter.last_state(0), Some(TaskState::Failed(_))));
    }

    #[tokio::test]
    async fn test_results_collected_into_borrowed_vec() {
        let results = Mutex::new(Vec::new());
        let tree = ProcessTree::new(
            ProcessTreeOptions::new().parallel(true),
            (0..4)
                .map(|i| {
                    let results = &results;
                    ProcessTreeItem::new(format!("task {i}"), "", move || async move {
                        results.lock().unwrap().push(i);
                        Ok(())
                    })
                })
                .collect(),
        )
        .unwrap();

        tree.start().await.unwrap();
        let mut got = results.into_inner().unwrap();
        got.sort_unstable();
        assert_eq!(got, vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let log = Mutex::new(Vec::new());
        let token = CancellationToken::new();
        token.cancel();

        let tree = ProcessTree::new(
            ProcessTreeOptions::new().with_cancellation(token),
            vec![logging_task("never", &log, false)],
        )
        .unwrap();

        assert!(matches!(tree.start().await, Err(Error::Cancelled)));
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn test_empty_tree_rejected() {
        let err = ProcessTree::new(ProcessTreeOptions::new(), Vec::new()).unwrap_err();
        assert!(matches!(err, Error::Task(_)));
    }
}

//! Terminal UI for process trees
//!
//! ```text
//! ┌──────────────┐
//! │ ProcessTree  │  unipack-core: runs tasks, reports transitions
//! └──────┬───────┘
//!        │ TaskReporter
//!        ▼
//! ┌──────────────┐
//! │FancyReporter │  forwards transitions as events
//! └──────┬───────┘
//!        │ mpsc channel
//!        ▼
//! ┌──────────────┐
//! │   UiActor    │  single thread owning the terminal
//! └──────┬───────┘
//!        ▼
//! ┌──────────────┐
//! │ TreeRenderer │  rows drawn through a RelativeFrame, styled by Theme
//! └──────────────┘
//! ```
//!
//! When stdout is not a terminal the fancy renderer is skipped entirely and
//! trees report through the core's plain reporter.

pub mod actor;
pub mod engine;
pub mod theme;
pub mod tree;

use actor::{UiActor, UiEvent};
use std::io::IsTerminal;
use std::sync::{Arc, mpsc};
use std::time::Duration;
use tokio::runtime::{Handle, RuntimeFlavor};
use unipack_core::reporter::{
    PlainReporter, RenderMode, RendererFactory, TaskId, TaskLine, TaskReporter, TaskState,
};

const FINISH_TIMEOUT: Duration = Duration::from_secs(2);

/// Reports to the UI actor thread.
#[derive(Debug)]
pub struct FancyReporter {
    actor: UiActor,
}

impl FancyReporter {
    pub fn spawn() -> Self {
        Self {
            actor: UiActor::spawn(),
        }
    }

    fn send(&self, event: UiEvent) {
        // A dead actor only costs us the display
        let _ = self.actor.sender().send(event);
    }
}

impl TaskReporter for FancyReporter {
    fn prepare(&self, tasks: &[TaskLine]) {
        self.send(UiEvent::Prepare(tasks.to_vec()));
    }

    fn transition(&self, id: TaskId, state: &TaskState) {
        self.send(UiEvent::Transition {
            id,
            state: state.clone(),
        });
    }

    fn finish(&self) {
        let (tx, rx) = mpsc::channel();
        self.send(UiEvent::Finish(tx));

        // Wait for the frame to be released before anything else prints
        let wait = move || {
            let _ = rx.recv_timeout(FINISH_TIMEOUT);
        };
        match Handle::try_current() {
            Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
                tokio::task::block_in_place(wait);
            }
            _ => wait(),
        }
    }
}

/// Picks the fancy renderer when stdout is an interactive terminal.
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalRenderers;

impl RendererFactory for TerminalRenderers {
    fn renderer(&self, mode: RenderMode) -> Arc<dyn TaskReporter> {
        if mode == RenderMode::Fancy && std::io::stdout().is_terminal() {
            Arc::new(FancyReporter::spawn())
        } else {
            Arc::new(PlainReporter::stderr())
        }
    }
}

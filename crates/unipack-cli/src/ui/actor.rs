//! UI Actor - Single-threaded event processing
//!
//! Process tree tasks may run concurrently, but the terminal can only be
//! drawn from one place. Reporters send events over a channel; one thread
//! owns the [`TreeRenderer`] and applies them in order.
use super::theme::Theme;
use super::tree::TreeRenderer;
use std::io::{Stdout, stdout};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;
use unipack_core::reporter::{TaskLine, TaskState};

/// Events that can be sent to the UI actor
#[derive(Debug)]
pub enum UiEvent {
    /// Reserve rows for a new tree
    Prepare(Vec<TaskLine>),
    /// A task changed state
    Transition { id: usize, state: TaskState },
    /// Close the current frame, then acknowledge
    Finish(mpsc::Sender<()>),
    /// Shutdown the actor
    Shutdown,
}

/// Handle to the UI actor thread
#[derive(Debug)]
pub struct UiActor {
    sender: mpsc::Sender<UiEvent>,
    _handle: thread::JoinHandle<()>,
}

impl UiActor {
    /// Spawn a new UI actor thread
    pub fn spawn() -> Self {
        let (sender, receiver) = mpsc::channel();
        let handle = thread::spawn(move || run_event_loop(&receiver, stdout));
        Self {
            sender,
            _handle: handle,
        }
    }

    /// Get a cloneable sender for this actor
    pub fn sender(&self) -> mpsc::Sender<UiEvent> {
        self.sender.clone()
    }
}

impl Drop for UiActor {
    fn drop(&mut self) {
        // Ignore errors if the thread is already gone
        let _ = self.sender.send(UiEvent::Shutdown);
    }
}

/// Runs on the actor thread until shutdown or until every sender is gone.
fn run_event_loop(receiver: &mpsc::Receiver<UiEvent>, out: fn() -> Stdout) {
    let mut tree: TreeRenderer<Stdout> = TreeRenderer::new(Theme::default());

    loop {
        // The timeout drives the blinking of running rows (10 FPS)
        match receiver.recv_timeout(Duration::from_millis(100)) {
            Ok(UiEvent::Prepare(lines)) => tree.prepare(out(), &lines),
            Ok(UiEvent::Transition { id, state }) => tree.update(id, state),
            Ok(UiEvent::Finish(ack)) => {
                tree.finish();
                let _ = ack.send(());
            }
            Ok(UiEvent::Shutdown) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
            Err(mpsc::RecvTimeoutError::Timeout) => tree.render_active(),
        }
    }
}

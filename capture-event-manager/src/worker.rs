//! Dispatch worker thread
//!
//! Provider events are queued on an unbounded channel and delivered by one
//! thread, so listeners see them in receipt order and never concurrently.
//! The provider's sink only enqueues; it never blocks on a slow listener.

use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

use capture_api::{CaptureEvent, EventSink};

use crate::registry::ListenerRegistry;

/// Commands processed by the dispatch worker
#[derive(Debug)]
pub(crate) enum Command {
    Dispatch(CaptureEvent),
    Shutdown,
}

/// Handle to a running dispatch worker
pub(crate) struct DispatchWorker {
    command_tx: mpsc::Sender<Command>,
    handle: Option<WorkerHandle>,
}

struct WorkerHandle {
    join: JoinHandle<()>,
    done_rx: mpsc::Receiver<()>,
}

impl DispatchWorker {
    pub(crate) fn spawn(name: String, registry: Arc<ListenerRegistry>) -> std::io::Result<Self> {
        let (command_tx, command_rx) = mpsc::channel();
        let (done_tx, done_rx) = mpsc::channel();

        let join = thread::Builder::new().name(name).spawn(move || {
            run_dispatch_loop(&registry, command_rx);
            let _ = done_tx.send(());
        })?;

        Ok(Self {
            command_tx,
            handle: Some(WorkerHandle { join, done_rx }),
        })
    }

    /// Sink handed to the provider; pushes events onto the dispatch queue
    pub(crate) fn sink(&self) -> EventSink {
        let tx = self.command_tx.clone();
        EventSink::new(move |event| {
            if tx.send(Command::Dispatch(event)).is_err() {
                tracing::debug!("Dispatch worker gone, dropping provider event");
            }
        })
    }

    pub(crate) fn thread_id(&self) -> Option<ThreadId> {
        self.handle.as_ref().map(|h| h.join.thread().id())
    }

    /// Ask the worker to stop and wait up to `grace` for it
    ///
    /// Events queued before the call are still delivered. A worker stuck in a
    /// listener past the grace period is detached and left to finish on its own.
    pub(crate) fn stop(&mut self, grace: Duration) {
        let _ = self.command_tx.send(Command::Shutdown);
        let Some(handle) = self.handle.take() else {
            return;
        };

        if thread::current().id() == handle.join.thread().id() {
            // Stopped from inside a listener; the loop exits after this event
            return;
        }

        match handle.done_rx.recv_timeout(grace) {
            Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => {
                if handle.join.join().is_err() {
                    tracing::error!("Dispatch worker terminated abnormally");
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                tracing::warn!(
                    "Dispatch worker did not stop within {:?}, detaching it",
                    grace
                );
            }
        }
    }
}

fn run_dispatch_loop(registry: &ListenerRegistry, command_rx: mpsc::Receiver<Command>) {
    tracing::info!("Dispatch worker started");

    while let Ok(command) = command_rx.recv() {
        match command {
            Command::Dispatch(event) => registry.dispatch(&event),
            Command::Shutdown => {
                tracing::info!("Dispatch worker received shutdown command");
                break;
            }
        }
    }

    tracing::info!("Dispatch worker stopped");
}

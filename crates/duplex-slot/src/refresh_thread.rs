//! Background host that polls a [`Registry`] on its own thread.
//!
//! The thread owns the registry exclusively (moved in at spawn) and is the
//! single writer for every registered app. Control arrives over a
//! crossbeam channel; replies go back on per-request channels. On shutdown
//! the registry is handed back through the join handle.

use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use duplex_arena::{HeapRegionProvider, RegionProvider};
use tracing::{debug, info};

use crate::registry::{AppId, Registry};

enum Command {
    TickNow,
    Unregister {
        id: AppId,
        reply: Sender<bool>,
    },
    Shutdown,
}

/// A [`Registry`] running on a dedicated thread.
///
/// The thread sleeps until the next app is due (never longer than
/// `max_sleep`), polls, and repeats. Dropping the handle stops the thread.
pub struct RefreshThread<P: RegionProvider + 'static = HeapRegionProvider> {
    commands: Sender<Command>,
    handle: Option<JoinHandle<Registry<P>>>,
}

impl<P: RegionProvider + 'static> RefreshThread<P> {
    /// Move `registry` onto a new thread named `duplex-refresh`.
    pub fn spawn(registry: Registry<P>, max_sleep: Duration) -> std::io::Result<Self> {
        let (commands, rx) = crossbeam_channel::unbounded();
        let handle = thread::Builder::new()
            .name("duplex-refresh".into())
            .spawn(move || run(registry, rx, max_sleep))?;
        Ok(Self {
            commands,
            handle: Some(handle),
        })
    }

    /// Ask the thread to tick every app immediately.
    ///
    /// Returns `false` if the thread has already stopped.
    pub fn tick_now(&self) -> bool {
        self.commands.send(Command::TickNow).is_ok()
    }

    /// Unregister an app on the refresh thread and wait for the result.
    pub fn unregister(&self, id: AppId) -> bool {
        let (reply, answer) = crossbeam_channel::bounded(1);
        if self.commands.send(Command::Unregister { id, reply }).is_err() {
            return false;
        }
        answer.recv().unwrap_or(false)
    }

    /// Stop the thread and take the registry back.
    ///
    /// Returns `None` if the thread panicked.
    pub fn shutdown(mut self) -> Option<Registry<P>> {
        self.stop()
    }

    fn stop(&mut self) -> Option<Registry<P>> {
        let handle = self.handle.take()?;
        // The thread may already be gone; join tells us either way.
        let _ = self.commands.send(Command::Shutdown);
        handle.join().ok()
    }
}

impl<P: RegionProvider + 'static> Drop for RefreshThread<P> {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

fn run<P: RegionProvider>(
    mut registry: Registry<P>,
    commands: Receiver<Command>,
    max_sleep: Duration,
) -> Registry<P> {
    info!(apps = registry.len(), "refresh thread started");
    loop {
        registry.poll(Instant::now());

        let wait = registry
            .next_deadline()
            .map(|d| d.saturating_duration_since(Instant::now()))
            .unwrap_or(max_sleep)
            .min(max_sleep);

        match commands.recv_timeout(wait) {
            Ok(Command::TickNow) => {
                let outcomes = registry.tick_all();
                debug!(ticked = outcomes.len(), "tick requested");
            }
            Ok(Command::Unregister { id, reply }) => {
                // Best-effort reply; the caller may have given up waiting.
                let _ = reply.send(registry.unregister_id(id));
            }
            Ok(Command::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }
    }
    info!("refresh thread stopped");
    registry
}

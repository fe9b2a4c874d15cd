use crate::error::PlaybackError;
use crossbeam::channel::{bounded, select, Receiver, Sender, TryRecvError};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

/// Which of the two session events woke the rendering thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    Finished,
    Cancelled,
}

/// Final report of a session, delivered once its resources are released
#[derive(Debug)]
pub enum SessionEnd {
    Finished,
    Cancelled,
    Failed(PlaybackError),
}

/// The rendering thread's view of its session.
pub struct SessionControl {
    cancel: Receiver<()>,
    cancelled: AtomicBool,
    paused: Arc<AtomicBool>,
}

impl SessionControl {
    /// Shared pause flag, read by the output callback
    pub fn paused(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.paused)
    }

    /// Non-blocking check. A dropped `Session` counts as a cancel.
    pub fn is_cancelled(&self) -> bool {
        if self.cancelled.load(Ordering::Relaxed) {
            return true;
        }

        match self.cancel.try_recv() {
            Err(TryRecvError::Empty) => false,
            _ => self.latch(),
        }
    }

    /// Sleep for at most `timeout`, returning early with `true` on cancel.
    pub fn cancelled_within(&self, timeout: Duration) -> bool {
        if self.is_cancelled() {
            return true;
        }

        select! {
            recv(self.cancel) -> _ => self.latch(),
            default(timeout) => false,
        }
    }

    /// Block until the output signals `finished` or the session is cancelled.
    pub fn wait_for(&self, finished: &Receiver<()>) -> Wake {
        if self.is_cancelled() {
            return Wake::Cancelled;
        }

        select! {
            recv(self.cancel) -> _ => {
                self.latch();
                Wake::Cancelled
            }
            recv(finished) -> _ => Wake::Finished,
        }
    }

    fn latch(&self) -> bool {
        self.cancelled.store(true, Ordering::Relaxed);
        true
    }
}

/// One track being rendered on its own thread.
///
/// The session owns the cancel side of the control channel, so dropping it
/// stops the rendering work as well.
#[derive(Debug)]
pub struct Session {
    path: PathBuf,
    cancel: Sender<()>,
    paused: Arc<AtomicBool>,
    ended: oneshot::Receiver<SessionEnd>,
}

impl Session {
    /// Run `work` on a dedicated thread. `work` must return once it observes
    /// either event on the control; everything it owns is dropped before the
    /// end is reported.
    pub fn spawn<F>(path: PathBuf, work: F) -> Result<Self, PlaybackError>
    where
        F: FnOnce(&SessionControl) -> Result<Wake, PlaybackError> + Send + 'static,
    {
        let (cancel_tx, cancel_rx) = bounded(1);
        let (ended_tx, ended_rx) = oneshot::channel();
        let paused = Arc::new(AtomicBool::new(false));

        let control = SessionControl {
            cancel: cancel_rx,
            cancelled: AtomicBool::new(false),
            paused: Arc::clone(&paused),
        };

        let path_display = path.display().to_string();
        std::thread::Builder::new()
            .name("playback-session".into())
            .spawn(move || {
                let end = match work(&control) {
                    Ok(Wake::Finished) => SessionEnd::Finished,
                    Ok(Wake::Cancelled) => SessionEnd::Cancelled,
                    Err(e) => SessionEnd::Failed(e),
                };
                drop(control);

                tracing::debug!("Session for {} ended: {:?}", path_display, end);
                let _ = ended_tx.send(end);
            })?;

        Ok(Self {
            path,
            cancel: cancel_tx,
            paused,
            ended: ended_rx,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Best-effort and idempotent
    pub fn cancel(&self) {
        let _ = self.cancel.try_send(());
    }

    /// Flip the pause flag and return the new value
    pub fn toggle_pause(&self) -> bool {
        !self.paused.fetch_xor(true, Ordering::Relaxed)
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Relaxed)
    }

    /// Resolves once the rendering thread has released its resources.
    /// Must not be awaited again after it has resolved.
    pub async fn ended(&mut self) -> SessionEnd {
        (&mut self.ended)
            .await
            .unwrap_or(SessionEnd::Failed(PlaybackError::SessionLost))
    }
}

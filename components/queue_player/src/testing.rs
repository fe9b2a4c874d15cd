//! Device-free `Output` for exercising the coordinator.

use crossbeam::channel::{bounded, Sender};
use parking_lot::Mutex;
use playback_engine::{AudioFormat, Output, PlaybackError, Session, Wake};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Sessions run until the test finishes or fails them. Paths whose file name
/// starts with `missing` fail to start, like a track that is not on disk.
#[derive(Default)]
pub struct FakeOutput {
    started: Mutex<Vec<PathBuf>>,
    running: Mutex<Vec<(Sender<()>, Arc<AtomicBool>)>>,
}

impl FakeOutput {
    pub fn started(&self) -> Vec<PathBuf> {
        self.started.lock().clone()
    }

    /// Let the most recently started session reach its natural end
    pub fn finish_current(&self) {
        if let Some((finish, _)) = self.running.lock().pop() {
            let _ = finish.send(());
        }
    }

    /// Make the most recently started session fail mid-stream
    pub fn fail_current(&self) {
        if let Some((finish, failed)) = self.running.lock().pop() {
            failed.store(true, Ordering::SeqCst);
            let _ = finish.send(());
        }
    }
}

impl Output for FakeOutput {
    fn start(&self, path: &Path) -> Result<Session, PlaybackError> {
        AudioFormat::from_path(path)?;
        let missing = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.starts_with("missing"));
        if missing {
            return Err(PlaybackError::TrackNotFound(path.to_path_buf()));
        }

        let (finished_tx, finished_rx) = bounded(1);
        let failed = Arc::new(AtomicBool::new(false));
        self.running.lock().push((finished_tx, Arc::clone(&failed)));
        self.started.lock().push(path.to_path_buf());

        Session::spawn(path.to_path_buf(), move |control| {
            let wake = control.wait_for(&finished_rx);
            if wake == Wake::Finished && failed.load(Ordering::SeqCst) {
                return Err(PlaybackError::Decoder("decode failed mid-stream".into()));
            }
            Ok(wake)
        })
    }
}

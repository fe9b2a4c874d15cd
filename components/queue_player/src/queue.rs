use std::collections::VecDeque;
use std::path::{Path, PathBuf};

/// Pending tracks, head first. The head is the track being played (or about
/// to be), and only leaves the queue once its session has ended.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Queue {
    tracks: VecDeque<PathBuf>,
}

impl Queue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn head(&self) -> Option<&Path> {
        self.tracks.front().map(PathBuf::as_path)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        self.tracks.iter().map(PathBuf::as_path)
    }

    pub fn push(&mut self, track: impl Into<PathBuf>) {
        self.tracks.push_back(track.into());
    }

    pub fn pop_head(&mut self) -> Option<PathBuf> {
        self.tracks.pop_front()
    }

    pub fn clear(&mut self) {
        self.tracks.clear();
    }

    /// Swap the whole queue for `tracks`
    pub fn replace(&mut self, tracks: impl IntoIterator<Item = PathBuf>) {
        self.tracks = tracks.into_iter().collect();
    }

    /// Head completed on its own: replay it when looping the track, send it
    /// to the back when looping the queue, drop it otherwise.
    pub fn finish_head(&mut self, loop_track: bool, loop_queue: bool) {
        if loop_track {
            return;
        }
        self.skip_head(loop_queue);
    }

    /// Head was skipped. Looping the track does not apply.
    pub fn skip_head(&mut self, loop_queue: bool) {
        if let Some(head) = self.tracks.pop_front() {
            if loop_queue {
                self.tracks.push_back(head);
            }
        }
    }
}

/// Read a playlist file: one track per line, surrounding whitespace trimmed,
/// blank lines ignored.
pub fn read_playlist(path: &Path) -> std::io::Result<Vec<PathBuf>> {
    let contents = std::fs::read_to_string(path)?;
    Ok(parse_playlist(&contents))
}

fn parse_playlist(contents: &str) -> Vec<PathBuf> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(PathBuf::from)
        .collect()
}

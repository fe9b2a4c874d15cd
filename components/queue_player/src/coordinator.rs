use crate::config::PlayerConfig;
use crate::error::PlayerError;
use crate::queue::{read_playlist, Queue};
use crate::router::{Inbox, Request};
use crate::state::{PlayerState, Snapshot};
use control_protocol::{Command, CommandName, Response};
use playback_engine::{Output, PlaybackError, Session, SessionEnd};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const SHUTTING_DOWN: &str = "The player is shutting down";

/// The session currently holding the output
struct Current {
    session: Session,
    /// The session is playing the queue head. Cleared when the queue is
    /// emptied or replaced underneath it, so its exit leaves the queue alone.
    owns_head: bool,
    /// Cancelled by SKIP or CLEAR and waiting for the session to wind down
    stopping: bool,
}

/// Sole owner of the queue and the player flags.
///
/// Commands arrive one at a time through the [`Inbox`]; session completions
/// arrive from the active [`Session`]. Both are handled on the same task, so
/// no state is ever shared.
pub struct Coordinator {
    config: PlayerConfig,
    inbox: Inbox,
    output: Arc<dyn Output>,
    queue: Queue,
    loop_track: bool,
    loop_queue: bool,
    current: Option<Current>,
    status: watch::Sender<Snapshot>,
}

impl Coordinator {
    pub fn new(config: PlayerConfig, inbox: Inbox, output: Arc<dyn Output>) -> Self {
        let (status, _) = watch::channel(Snapshot::default());

        Self {
            config,
            inbox,
            output,
            queue: Queue::new(),
            loop_track: false,
            loop_queue: false,
            current: None,
            status,
        }
    }

    /// Snapshots are published after every handled event
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.status.subscribe()
    }

    pub fn state(&self) -> PlayerState {
        let active = self.playing().ok();

        PlayerState {
            active: active.is_some(),
            paused: active.is_some_and(|current| current.session.is_paused()),
            loop_track: self.loop_track,
            loop_queue: self.loop_queue,
        }
    }

    pub fn queue(&self) -> &Queue {
        &self.queue
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            state: self.state(),
            now_playing: self
                .current
                .as_ref()
                .map(|current| current.session.path().to_path_buf()),
            queue: self.queue.iter().map(Path::to_path_buf).collect(),
        }
    }

    /// Serve until `shutdown` fires or every router is dropped. Any active
    /// session is cancelled and awaited before returning.
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!(
            "Coordinator started, idle check every {:?}",
            self.config.poll_interval
        );
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            self.start_next().await;
            self.publish();

            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!("Shutdown requested");
                    break;
                }
                request = self.inbox.recv() => match request {
                    Some(request) => self.handle(request).await,
                    None => {
                        info!("No routers left");
                        break;
                    }
                },
                end = session_ended(&mut self.current) => self.finish_session(end),
                _ = ticker.tick() => {}
            }
        }

        self.stop().await;
        self.publish();
        info!("Coordinator stopped");
    }

    async fn handle(&mut self, request: Request) {
        let (command, responder) = request.into_parts();
        let name = command.name;

        let response = match self.apply(command).await {
            Ok(()) => {
                info!("Applied {}", name);
                Response::ok()
            }
            Err(e) => {
                warn!("Could not execute {}: {}", name, e);
                Response::err(e.to_string())
            }
        };

        responder.send(response);
    }

    async fn apply(&mut self, command: Command) -> Result<(), PlayerError> {
        match command.name {
            CommandName::AddQueue => {
                let track = require_payload(&command)?;
                self.queue.push(track);
                debug!("Queued {}, {} tracks pending", track, self.queue.len());
            }

            CommandName::AddPlaylist => {
                let playlist = PathBuf::from(require_payload(&command)?);
                let tracks = load_playlist(playlist.clone())
                    .await
                    .map_err(|e| PlayerError::playlist(&playlist, e))?;

                if let Some(current) = self.current.as_mut() {
                    current.owns_head = false;
                }
                self.queue.replace(tracks);
                info!(
                    "Loaded {} tracks from {}",
                    self.queue.len(),
                    playlist.display()
                );
            }

            CommandName::Pause => {
                let paused = self.playing()?.session.toggle_pause();
                info!("Playback {}", if paused { "paused" } else { "resumed" });
            }

            CommandName::Clear => {
                self.queue.clear();
                self.loop_track = false;
                self.loop_queue = false;

                if let Some(current) = self.current.as_mut() {
                    current.owns_head = false;
                    current.stopping = true;
                    current.session.cancel();
                }
            }

            CommandName::Skip => {
                let current = self.playing_mut()?;
                current.stopping = true;
                current.session.cancel();
                info!("Skipping {}", current.session.path().display());
            }

            CommandName::LoopSong => {
                self.playing()?;
                self.loop_track = !self.loop_track;
            }

            CommandName::LoopPlaylist => {
                if self.queue.is_empty() {
                    return Err(PlayerError::QueueEmpty);
                }
                self.loop_queue = !self.loop_queue;
            }

            CommandName::SetVolume => return Err(PlayerError::Unsupported(command.name)),

            CommandName::Shutdown => return Err(PlayerError::ListenerOnly(command.name)),
        }

        Ok(())
    }

    /// The session, unless there is none or it is already winding down
    fn playing(&self) -> Result<&Current, PlayerError> {
        self.current
            .as_ref()
            .filter(|current| !current.stopping)
            .ok_or(PlayerError::NothingPlaying)
    }

    fn playing_mut(&mut self) -> Result<&mut Current, PlayerError> {
        self.current
            .as_mut()
            .filter(|current| !current.stopping)
            .ok_or(PlayerError::NothingPlaying)
    }

    /// Start the queue head if the output is free. Tracks that cannot be
    /// started are dropped from the queue. Opening a track touches the disk,
    /// so it runs on the blocking pool.
    async fn start_next(&mut self) {
        while self.current.is_none() {
            let Some(head) = self.queue.head().map(Path::to_path_buf) else {
                return;
            };

            let output = Arc::clone(&self.output);
            let track = head.clone();
            let started = tokio::task::spawn_blocking(move || output.start(&track))
                .await
                .unwrap_or_else(|e| {
                    warn!("Starting {} did not complete: {}", head.display(), e);
                    Err(PlaybackError::SessionLost)
                });

            match started {
                Ok(session) => {
                    info!("Now playing {}", head.display());
                    self.current = Some(Current {
                        session,
                        owns_head: true,
                        stopping: false,
                    });
                }
                Err(e) => {
                    warn!(
                        "Failed to start {}, removing it from the queue: {}",
                        head.display(),
                        e
                    );
                    self.queue.pop_head();
                }
            }
        }
    }

    fn finish_session(&mut self, end: SessionEnd) {
        let Some(current) = self.current.take() else {
            return;
        };
        let path = current.session.path().display();

        match &end {
            SessionEnd::Finished => info!("Finished playback of {}", path),
            SessionEnd::Cancelled => info!("Stopped playback of {}", path),
            SessionEnd::Failed(e) => warn!("Playback of {} failed: {}", path, e),
        }

        if !current.owns_head {
            return;
        }

        match (&end, current.stopping) {
            (SessionEnd::Failed(_), _) => {
                self.queue.pop_head();
            }
            (_, true) => self.queue.skip_head(self.loop_queue),
            (_, false) => self.queue.finish_head(self.loop_track, self.loop_queue),
        }
    }

    async fn stop(&mut self) {
        self.inbox.close();
        while let Some(request) = self.inbox.try_recv() {
            request.respond(Response::err(SHUTTING_DOWN));
        }

        if let Some(mut current) = self.current.take() {
            info!(
                "Stopping playback of {} for shutdown",
                current.session.path().display()
            );
            current.session.cancel();
            let end = current.session.ended().await;
            debug!("Final session ended: {:?}", end);
        }
    }

    fn publish(&self) {
        let snapshot = self.snapshot();
        self.status.send_if_modified(|current| {
            if *current == snapshot {
                return false;
            }
            *current = snapshot;
            true
        });
    }
}

async fn load_playlist(path: PathBuf) -> std::io::Result<Vec<PathBuf>> {
    tokio::task::spawn_blocking(move || read_playlist(&path))
        .await
        .map_err(std::io::Error::other)?
}

fn require_payload(command: &Command) -> Result<&str, PlayerError> {
    command
        .payload()
        .ok_or(PlayerError::MissingPayload(command.name))
}

/// Pending forever while no session is active
async fn session_ended(current: &mut Option<Current>) -> SessionEnd {
    match current {
        Some(current) => current.session.ended().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::Router;
    use crate::state::Phase;
    use crate::testing::FakeOutput;
    use assert_matches::assert_matches;
    use rstest::rstest;
    use std::io::Write;
    use std::time::{Duration, Instant};

    const PATIENCE: Duration = Duration::from_secs(5);

    fn coordinator() -> (Coordinator, Router, Arc<FakeOutput>) {
        let (router, inbox) = Router::channel();
        let output = Arc::new(FakeOutput::default());
        let coordinator = Coordinator::new(PlayerConfig::default(), inbox, output.clone());
        (coordinator, router, output)
    }

    async fn add(coordinator: &mut Coordinator, track: &str) {
        coordinator
            .apply(Command::with_payload(CommandName::AddQueue, track))
            .await
            .unwrap();
    }

    fn queued(coordinator: &Coordinator) -> Vec<PathBuf> {
        coordinator.queue().iter().map(Path::to_path_buf).collect()
    }

    fn paths(tracks: &[&str]) -> Vec<PathBuf> {
        tracks.iter().map(PathBuf::from).collect()
    }

    fn playlist(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    /// Wait for the active session to report and apply its end
    async fn settle(coordinator: &mut Coordinator) {
        let end = tokio::time::timeout(PATIENCE, session_ended(&mut coordinator.current))
            .await
            .expect("session never ended");
        coordinator.finish_session(end);
    }

    #[rstest]
    #[case(1)]
    #[case(3)]
    #[case(25)]
    #[tokio::test]
    async fn add_queue_grows_queue_by_one_each(#[case] n: usize) {
        let (mut coordinator, _router, _output) = coordinator();

        for i in 0..n {
            add(&mut coordinator, &format!("track{i}.mp3")).await;
        }

        assert_eq!(coordinator.queue().len(), n);
    }

    #[rstest]
    #[case(CommandName::AddQueue)]
    #[case(CommandName::AddPlaylist)]
    #[tokio::test]
    async fn payload_is_required(#[case] name: CommandName) {
        let (mut coordinator, _router, _output) = coordinator();
        add(&mut coordinator, "keep.mp3").await;

        assert_matches!(
            coordinator.apply(Command::new(name)).await,
            Err(PlayerError::MissingPayload(n)) if n == name
        );
        assert_eq!(queued(&coordinator), paths(&["keep.mp3"]));
    }

    #[tokio::test]
    async fn add_playlist_replaces_queue_with_non_blank_lines() {
        let (mut coordinator, _router, _output) = coordinator();
        add(&mut coordinator, "old.mp3").await;
        let file = playlist("first.mp3\n\nsecond.flac\n");

        coordinator
            .apply(Command::with_payload(
                CommandName::AddPlaylist,
                file.path().to_str().unwrap(),
            ))
            .await
            .unwrap();

        assert_eq!(queued(&coordinator), paths(&["first.mp3", "second.flac"]));
    }

    #[tokio::test]
    async fn unreadable_playlist_leaves_queue_alone() {
        let (mut coordinator, _router, _output) = coordinator();
        add(&mut coordinator, "old.mp3").await;

        let result = coordinator
            .apply(Command::with_payload(
                CommandName::AddPlaylist,
                "/no/such/playlist.txt",
            ))
            .await;

        assert_matches!(result, Err(PlayerError::Playlist { .. }));
        assert_eq!(queued(&coordinator), paths(&["old.mp3"]));
    }

    #[rstest]
    #[case(CommandName::Pause)]
    #[case(CommandName::Skip)]
    #[case(CommandName::LoopSong)]
    #[tokio::test]
    async fn needs_an_active_session(#[case] name: CommandName) {
        let (mut coordinator, _router, _output) = coordinator();
        add(&mut coordinator, "waiting.mp3").await;
        let before = coordinator.snapshot();

        let err = coordinator.apply(Command::new(name)).await.unwrap_err();

        assert_matches!(err, PlayerError::NothingPlaying);
        assert_eq!(err.to_string(), "There is no song currently playing");
        assert_eq!(coordinator.snapshot(), before);
    }

    #[tokio::test]
    async fn loop_playlist_on_empty_queue_is_refused() {
        let (mut coordinator, _router, _output) = coordinator();

        assert_matches!(
            coordinator.apply(Command::new(CommandName::LoopPlaylist)).await,
            Err(PlayerError::QueueEmpty)
        );
        assert!(!coordinator.state().loop_queue);
    }

    #[tokio::test]
    async fn loop_playlist_toggles() {
        let (mut coordinator, _router, _output) = coordinator();
        add(&mut coordinator, "a.mp3").await;

        coordinator
            .apply(Command::new(CommandName::LoopPlaylist))
            .await
            .unwrap();
        assert!(coordinator.state().loop_queue);

        coordinator
            .apply(Command::new(CommandName::LoopPlaylist))
            .await
            .unwrap();
        assert!(!coordinator.state().loop_queue);
    }

    #[tokio::test]
    async fn set_volume_is_an_explicit_error() {
        let (mut coordinator, _router, _output) = coordinator();

        let err = coordinator
            .apply(Command::with_payload(CommandName::SetVolume, "-6"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "SET_VOLUME is not supported");

        assert_matches!(
            coordinator.apply(Command::new(CommandName::Shutdown)).await,
            Err(PlayerError::ListenerOnly(CommandName::Shutdown))
        );
    }

    #[tokio::test]
    async fn pause_twice_restores_the_flag() {
        let (mut coordinator, _router, output) = coordinator();
        add(&mut coordinator, "a.mp3").await;
        coordinator.start_next().await;
        assert_eq!(output.started(), paths(&["a.mp3"]));
        assert_eq!(coordinator.state().phase(), Phase::Playing);

        coordinator.apply(Command::new(CommandName::Pause)).await.unwrap();
        assert_eq!(coordinator.state().phase(), Phase::Paused);

        coordinator.apply(Command::new(CommandName::Pause)).await.unwrap();
        assert_eq!(coordinator.state().phase(), Phase::Playing);
    }

    #[tokio::test]
    async fn loop_song_toggles_while_playing() {
        let (mut coordinator, _router, _output) = coordinator();
        add(&mut coordinator, "a.mp3").await;
        coordinator.start_next().await;

        coordinator.apply(Command::new(CommandName::LoopSong)).await.unwrap();
        assert!(coordinator.state().loop_track);
    }

    #[tokio::test]
    async fn clear_empties_queue_and_stops_session() {
        let (mut coordinator, _router, _output) = coordinator();
        add(&mut coordinator, "a.mp3").await;
        add(&mut coordinator, "b.mp3").await;
        coordinator.start_next().await;

        coordinator.apply(Command::new(CommandName::Clear)).await.unwrap();
        assert_eq!(coordinator.queue().len(), 0);
        assert!(!coordinator.state().active);

        // A track queued before the cancelled session reports must survive
        add(&mut coordinator, "next.mp3").await;
        settle(&mut coordinator).await;

        assert_eq!(queued(&coordinator), paths(&["next.mp3"]));
        assert!(coordinator.current.is_none());
    }

    #[tokio::test]
    async fn clear_when_idle_succeeds() {
        let (mut coordinator, _router, _output) = coordinator();
        coordinator.apply(Command::new(CommandName::Clear)).await.unwrap();
        assert!(coordinator.queue().is_empty());
    }

    #[tokio::test]
    async fn skip_pops_head_once_the_session_ends() {
        let (mut coordinator, _router, output) = coordinator();
        add(&mut coordinator, "a.mp3").await;
        add(&mut coordinator, "b.mp3").await;
        coordinator.start_next().await;

        coordinator.apply(Command::new(CommandName::Skip)).await.unwrap();
        assert_matches!(
            coordinator.apply(Command::new(CommandName::Skip)).await,
            Err(PlayerError::NothingPlaying)
        );

        settle(&mut coordinator).await;
        assert_eq!(queued(&coordinator), paths(&["b.mp3"]));

        coordinator.start_next().await;
        assert_eq!(output.started(), paths(&["a.mp3", "b.mp3"]));
    }

    #[tokio::test]
    async fn skip_with_loop_playlist_rotates() {
        let (mut coordinator, _router, _output) = coordinator();
        add(&mut coordinator, "a.mp3").await;
        add(&mut coordinator, "b.mp3").await;
        coordinator.start_next().await;
        coordinator
            .apply(Command::new(CommandName::LoopPlaylist))
            .await
            .unwrap();
        coordinator.apply(Command::new(CommandName::LoopSong)).await.unwrap();

        coordinator.apply(Command::new(CommandName::Skip)).await.unwrap();
        settle(&mut coordinator).await;

        assert_eq!(queued(&coordinator), paths(&["b.mp3", "a.mp3"]));
    }

    #[rstest]
    #[case(false, false, &["b.mp3"], "b.mp3")]
    #[case(true, false, &["a.mp3", "b.mp3"], "a.mp3")]
    #[case(false, true, &["b.mp3", "a.mp3"], "b.mp3")]
    #[tokio::test]
    async fn natural_finish_follows_loop_flags(
        #[case] loop_track: bool,
        #[case] loop_queue: bool,
        #[case] expected: &[&str],
        #[case] next: &str,
    ) {
        let (mut coordinator, _router, output) = coordinator();
        add(&mut coordinator, "a.mp3").await;
        add(&mut coordinator, "b.mp3").await;
        coordinator.start_next().await;
        if loop_track {
            coordinator.apply(Command::new(CommandName::LoopSong)).await.unwrap();
        }
        if loop_queue {
            coordinator
                .apply(Command::new(CommandName::LoopPlaylist))
                .await
                .unwrap();
        }

        output.finish_current();
        settle(&mut coordinator).await;
        assert_eq!(queued(&coordinator), paths(expected));

        coordinator.start_next().await;
        assert_eq!(output.started(), paths(&["a.mp3", next]));
    }

    #[rstest]
    #[case("missing.mp3")]
    #[case("cover.jpg")]
    #[tokio::test]
    async fn tracks_that_cannot_start_are_dropped(#[case] bad: &str) {
        let (mut coordinator, _router, output) = coordinator();
        add(&mut coordinator, bad).await;
        add(&mut coordinator, "good.flac").await;

        coordinator.start_next().await;

        assert_eq!(output.started(), paths(&["good.flac"]));
        assert_eq!(queued(&coordinator), paths(&["good.flac"]));
    }

    #[tokio::test]
    async fn mid_stream_failure_drops_head_even_when_looping() {
        let (mut coordinator, _router, output) = coordinator();
        add(&mut coordinator, "a.mp3").await;
        add(&mut coordinator, "b.mp3").await;
        coordinator.start_next().await;
        coordinator.apply(Command::new(CommandName::LoopSong)).await.unwrap();
        coordinator
            .apply(Command::new(CommandName::LoopPlaylist))
            .await
            .unwrap();

        output.fail_current();
        settle(&mut coordinator).await;

        assert_eq!(queued(&coordinator), paths(&["b.mp3"]));
    }

    #[tokio::test]
    async fn playlist_loaded_mid_track_is_not_consumed_by_that_track() {
        let (mut coordinator, _router, output) = coordinator();
        add(&mut coordinator, "a.mp3").await;
        coordinator.start_next().await;
        let file = playlist("x.mp3\ny.mp3\n");

        coordinator
            .apply(Command::with_payload(
                CommandName::AddPlaylist,
                file.path().to_str().unwrap(),
            ))
            .await
            .unwrap();
        assert!(coordinator.state().active);

        output.finish_current();
        settle(&mut coordinator).await;
        assert_eq!(queued(&coordinator), paths(&["x.mp3", "y.mp3"]));

        coordinator.start_next().await;
        assert_eq!(output.started(), paths(&["a.mp3", "x.mp3"]));
    }

    /// Takes a while to open every track, like a cold disk
    struct SlowOutput(FakeOutput);

    impl Output for SlowOutput {
        fn start(&self, path: &Path) -> Result<Session, PlaybackError> {
            std::thread::sleep(Duration::from_millis(300));
            self.0.start(path)
        }
    }

    #[tokio::test]
    async fn opening_a_track_leaves_the_runtime_free() {
        let (_router, inbox) = Router::channel();
        let output = Arc::new(SlowOutput(FakeOutput::default()));
        let mut coordinator = Coordinator::new(PlayerConfig::default(), inbox, output.clone());
        add(&mut coordinator, "slow.mp3").await;

        let ticker = tokio::spawn(async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Instant::now()
        });
        coordinator.start_next().await;
        let started = Instant::now();

        assert!(ticker.await.unwrap() < started);
        assert_eq!(output.0.started(), paths(&["slow.mp3"]));
    }

    async fn wait_until(
        status: &mut watch::Receiver<Snapshot>,
        condition: impl Fn(&Snapshot) -> bool,
    ) -> Snapshot {
        tokio::time::timeout(PATIENCE, status.wait_for(|snapshot| condition(snapshot)))
            .await
            .expect("condition never held")
            .expect("coordinator dropped its status")
            .clone()
    }

    #[tokio::test]
    async fn run_loop_plays_skips_and_clears() {
        let (coordinator, router, output) = coordinator();
        let mut status = coordinator.subscribe();
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(coordinator.run(shutdown.clone()));

        for track in ["a.mp3", "b.mp3", "c.mp3"] {
            let response = router
                .submit(Command::with_payload(CommandName::AddQueue, track))
                .await;
            assert_eq!(response, Response::ok());
        }

        let snapshot = wait_until(&mut status, |s| s.state.active).await;
        assert_eq!(snapshot.now_playing, Some(PathBuf::from("a.mp3")));

        assert!(router.submit(Command::new(CommandName::Skip)).await.is_ok());
        wait_until(&mut status, |s| {
            s.now_playing == Some(PathBuf::from("b.mp3")) && s.queue_len() == 2
        })
        .await;

        output.finish_current();
        wait_until(&mut status, |s| {
            s.now_playing == Some(PathBuf::from("c.mp3")) && s.queue_len() == 1
        })
        .await;

        assert!(router.submit(Command::new(CommandName::Clear)).await.is_ok());
        let snapshot = wait_until(&mut status, |s| s.now_playing.is_none()).await;
        assert_eq!(snapshot.queue_len(), 0);
        assert_eq!(snapshot.state.phase(), Phase::Idle);

        shutdown.cancel();
        tokio::time::timeout(PATIENCE, task).await.unwrap().unwrap();

        assert_eq!(
            router.submit(Command::new(CommandName::Pause)).await,
            Response::err("The player is not running")
        );
    }

    #[tokio::test]
    async fn shutdown_cancels_active_session() {
        let (coordinator, router, _output) = coordinator();
        let mut status = coordinator.subscribe();
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(coordinator.run(shutdown.clone()));

        router
            .submit(Command::with_payload(CommandName::AddQueue, "long.flac"))
            .await;
        wait_until(&mut status, |s| s.state.active).await;

        shutdown.cancel();
        tokio::time::timeout(PATIENCE, task).await.unwrap().unwrap();

        let last = status.borrow().clone();
        assert!(!last.state.active);
        assert_eq!(last.now_playing, None);
    }

    #[tokio::test]
    async fn run_ends_when_routers_are_gone() {
        let (coordinator, router, _output) = coordinator();
        let task = tokio::spawn(coordinator.run(CancellationToken::new()));

        drop(router);

        tokio::time::timeout(PATIENCE, task).await.unwrap().unwrap();
    }
}

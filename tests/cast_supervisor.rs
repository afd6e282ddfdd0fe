use async_trait::async_trait;
use parking_lot::Mutex;
use photocast::cast::{CastConnector, CastSession};
use photocast::config::Configuration;
use photocast::error::Error;
use photocast::media::{MediaItem, SourceKind};
use photocast::playlist::{Playlist, PlaylistHandle, PlaylistOrder, SortKey};
use photocast::settings::{SettingsHandle, SlideSettings};
use photocast::sources::SourceEntry;
use photocast::tasks::cast_loop::{LoopContext, LoopState};
use photocast::tasks::supervisor::CastSupervisor;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct Journal {
    loads: Mutex<Vec<(String, String)>>,
    released: Mutex<Vec<String>>,
}

impl Journal {
    fn loads_for(&self, device: &str) -> Vec<String> {
        self.loads
            .lock()
            .iter()
            .filter(|(d, _)| d == device)
            .map(|(_, url)| url.clone())
            .collect()
    }
}

struct FakeConnector {
    journal: Arc<Journal>,
}

#[async_trait]
impl CastConnector for FakeConnector {
    async fn connect(&self, name: &str) -> Result<Box<dyn CastSession>, Error> {
        if name == "ghost" {
            return Err(Error::DeviceNotFound(name.to_owned()));
        }
        Ok(Box::new(FakeSession {
            device: name.to_owned(),
            journal: Arc::clone(&self.journal),
        }))
    }
}

struct FakeSession {
    device: String,
    journal: Arc<Journal>,
}

#[async_trait]
impl CastSession for FakeSession {
    async fn load(&mut self, url: &str, mime: &str) -> Result<(), Error> {
        assert_eq!(mime, "image/jpeg");
        if self.device == "flaky" {
            return Err(Error::Device("load rejected".into()));
        }
        self.journal
            .loads
            .lock()
            .push((self.device.clone(), url.to_owned()));
        Ok(())
    }

    async fn await_active(&mut self, _timeout: Duration) -> Result<bool, Error> {
        Ok(true)
    }

    async fn release(&mut self) {
        self.journal.released.lock().push(self.device.clone());
    }
}

fn playlist_of(n: usize) -> PlaylistHandle {
    let items = (0..n)
        .map(|k| {
            MediaItem::from_entry(
                0,
                SourceKind::Local,
                SourceEntry {
                    path: format!("/photos/{k}.jpg"),
                    modified: SystemTime::now(),
                    size_bytes: 1,
                    filename: format!("{k}.jpg"),
                    dimensions: None,
                },
            )
        })
        .collect();
    let handle = PlaylistHandle::new();
    handle.replace(Playlist::build(
        items,
        PlaylistOrder::Sorted(SortKey::Filename),
        &mut StdRng::seed_from_u64(0),
    ));
    handle
}

struct Harness {
    supervisor: CastSupervisor,
    journal: Arc<Journal>,
    playlist: PlaylistHandle,
}

fn harness(playlist: PlaylistHandle, slide: Duration) -> Harness {
    let journal = Arc::new(Journal::default());
    let mut settings = SlideSettings::from_config(&Configuration::default());
    settings.slide_interval = slide;
    settings.tick = Duration::from_millis(5);
    let ctx = LoopContext {
        playlist: playlist.clone(),
        settings: SettingsHandle::new(settings),
        connector: Arc::new(FakeConnector {
            journal: Arc::clone(&journal),
        }),
        base_url: "http://frame.local:8080".into(),
        ack_timeout: Duration::from_secs(1),
    };
    Harness {
        supervisor: CastSupervisor::new(ctx, Duration::from_millis(200), CancellationToken::new()),
        journal,
        playlist,
    }
}

async fn wait_until<F: Fn() -> bool>(what: &str, check: F) {
    tokio::time::timeout(Duration::from_secs(3), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {what}"));
}

async fn state_of(supervisor: &CastSupervisor, device: &str) -> Option<LoopState> {
    supervisor
        .devices()
        .await
        .into_iter()
        .find(|d| d.device == device)
        .map(|d| d.state)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unknown_device_stops_without_affecting_siblings() {
    let h = harness(playlist_of(3), Duration::from_millis(20));
    let started = h
        .supervisor
        .start(&["ghost".to_string(), "tv".to_string()])
        .await;
    assert_eq!(started, vec!["ghost", "tv"]);

    let journal = Arc::clone(&h.journal);
    wait_until("tv to play several slides", || journal.loads_for("tv").len() >= 3).await;

    assert_eq!(state_of(&h.supervisor, "ghost").await, Some(LoopState::Stopped));
    assert_ne!(state_of(&h.supervisor, "tv").await, Some(LoopState::Stopped));
    assert!(h.journal.loads_for("ghost").is_empty());
    assert!(h.playlist.playhead() >= 2);

    h.supervisor.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn device_errors_stop_only_that_loop() {
    let h = harness(playlist_of(2), Duration::from_millis(20));
    h.supervisor
        .start(&["flaky".to_string(), "tv".to_string()])
        .await;

    let journal = Arc::clone(&h.journal);
    wait_until("flaky to be released", || {
        journal.released.lock().iter().any(|d| d == "flaky")
    })
    .await;
    wait_until("tv to keep playing", || journal.loads_for("tv").len() >= 2).await;
    assert_eq!(state_of(&h.supervisor, "flaky").await, Some(LoopState::Stopped));

    h.supervisor.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn slides_follow_the_cursor_in_order() {
    let h = harness(playlist_of(3), Duration::from_millis(10));
    let expected: Vec<String> = h
        .playlist
        .snapshot()
        .items()
        .iter()
        .map(|i| format!("http://frame.local:8080/image/{}.jpg", i.id))
        .collect();
    h.supervisor.start(&["tv".to_string()]).await;

    let journal = Arc::clone(&h.journal);
    wait_until("two laps", || journal.loads_for("tv").len() >= 6).await;
    h.supervisor.shutdown().await;

    let loads = h.journal.loads_for("tv");
    for (k, url) in loads.iter().enumerate() {
        assert_eq!(url, &expected[k % 3]);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_is_observed_within_a_tick() {
    let h = harness(playlist_of(2), Duration::from_secs(3600));
    h.supervisor.start(&["tv".to_string()]).await;

    let journal = Arc::clone(&h.journal);
    wait_until("first slide", || !journal.loads_for("tv").is_empty()).await;
    let playhead = h.playlist.playhead();

    h.supervisor.stop().await;
    wait_until("release after stop", || {
        journal.released.lock().iter().any(|d| d == "tv")
    })
    .await;
    assert_eq!(state_of(&h.supervisor, "tv").await, Some(LoopState::Stopped));
    // Cancelled mid-wait: the cursor does not move.
    assert_eq!(h.playlist.playhead(), playhead);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn restart_replaces_previous_loops() {
    let h = harness(playlist_of(2), Duration::from_secs(3600));
    h.supervisor.start(&["tv".to_string()]).await;
    let journal = Arc::clone(&h.journal);
    wait_until("tv first slide", || !journal.loads_for("tv").is_empty()).await;

    let started = h
        .supervisor
        .start(&["kitchen".to_string(), "kitchen".to_string(), " ".to_string()])
        .await;
    assert_eq!(started, vec!["kitchen"]);
    assert!(h.journal.released.lock().iter().any(|d| d == "tv"));

    let listed: Vec<String> = h
        .supervisor
        .devices()
        .await
        .into_iter()
        .map(|d| d.device)
        .collect();
    assert_eq!(listed, vec!["kitchen"]);

    h.supervisor.shutdown().await;
    assert!(h.journal.released.lock().iter().any(|d| d == "kitchen"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn empty_playlist_parks_without_loading() {
    let h = harness(PlaylistHandle::new(), Duration::from_millis(10));
    h.supervisor.start(&["tv".to_string()]).await;

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(h.journal.loads_for("tv").is_empty());
    assert_eq!(state_of(&h.supervisor, "tv").await, Some(LoopState::Playing));
    assert_eq!(h.playlist.playhead(), 0);

    h.supervisor.shutdown().await;
    assert_eq!(state_of(&h.supervisor, "tv").await, None);
}

use photocast::media::{MediaId, MediaItem, SourceKind};
use photocast::playlist::{Playlist, PlaylistHandle, PlaylistOrder, SortKey};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::collections::BTreeSet;
use std::time::{Duration, SystemTime};

fn item(name: &str, age_secs: u64) -> MediaItem {
    let path = format!("/photos/{name}");
    MediaItem {
        id: MediaId::derive(SourceKind::Local, &path),
        source_kind: SourceKind::Local,
        origin: 0,
        path,
        modified: SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000 - age_secs),
        size_bytes: 1,
        filename: name.to_owned(),
    }
}

fn library() -> Vec<MediaItem> {
    vec![
        item("c.jpg", 30),
        item("a.jpg", 10),
        item("b.jpg", 20),
        item("d.jpg", 40),
    ]
}

fn names(playlist: &Playlist) -> Vec<&str> {
    playlist.items().iter().map(|i| i.filename.as_str()).collect()
}

#[test]
fn sorted_builds_are_deterministic() {
    let mut rng = StdRng::seed_from_u64(1);
    let by_name = Playlist::build(library(), PlaylistOrder::Sorted(SortKey::Filename), &mut rng);
    assert_eq!(names(&by_name), vec!["a.jpg", "b.jpg", "c.jpg", "d.jpg"]);
    let again = Playlist::build(library(), PlaylistOrder::Sorted(SortKey::Filename), &mut rng);
    assert_eq!(names(&by_name), names(&again));

    let by_mtime = Playlist::build(
        library(),
        PlaylistOrder::Sorted(SortKey::ModifiedTime),
        &mut rng,
    );
    assert_eq!(names(&by_mtime), vec!["d.jpg", "c.jpg", "b.jpg", "a.jpg"]);
}

#[test]
fn shuffle_preserves_the_multiset_of_ids() {
    let mut rng = StdRng::seed_from_u64(99);
    let expected: BTreeSet<MediaId> = library().into_iter().map(|i| i.id).collect();
    for _ in 0..5 {
        let shuffled = Playlist::build(library(), PlaylistOrder::Shuffled, &mut rng);
        let got: BTreeSet<MediaId> = shuffled.items().iter().map(|i| i.id.clone()).collect();
        assert_eq!(shuffled.len(), expected.len());
        assert_eq!(got, expected);
    }
}

#[test]
fn seeded_shuffle_is_reproducible() {
    let a = Playlist::build(library(), PlaylistOrder::Shuffled, &mut StdRng::seed_from_u64(7));
    let b = Playlist::build(library(), PlaylistOrder::Shuffled, &mut StdRng::seed_from_u64(7));
    assert_eq!(names(&a), names(&b));
}

#[test]
fn cursor_wraps_around_over_three_laps() {
    let handle = PlaylistHandle::new();
    let playlist = Playlist::build(
        library(),
        PlaylistOrder::Sorted(SortKey::Filename),
        &mut StdRng::seed_from_u64(0),
    );
    let n = playlist.len();
    handle.replace(playlist);

    let mut seen = Vec::new();
    for _ in 0..3 * n {
        let slot = handle.current().unwrap();
        seen.push(slot.item.filename.clone());
        assert!(handle.advance(&slot));
    }
    assert_eq!(handle.playhead(), 3 * n);
    for (k, name) in seen.iter().enumerate() {
        assert_eq!(name, &seen[k % n]);
    }
    assert_eq!(&seen[..n], &["a.jpg", "b.jpg", "c.jpg", "d.jpg"]);
}

#[test]
fn empty_playlist_has_no_current_item() {
    let handle = PlaylistHandle::new();
    assert!(handle.current().is_none());
    assert!(handle.is_empty());
    assert_eq!(handle.playhead(), 0);
}

#[test]
fn advance_from_before_a_rebuild_is_discarded() {
    let handle = PlaylistHandle::new();
    let mut rng = StdRng::seed_from_u64(0);
    handle.replace(Playlist::build(
        library(),
        PlaylistOrder::Sorted(SortKey::Filename),
        &mut rng,
    ));
    let stale = handle.current().unwrap();
    assert!(handle.advance(&stale));
    let stale = handle.current().unwrap();

    handle.replace(Playlist::build(
        library(),
        PlaylistOrder::Sorted(SortKey::Filename),
        &mut rng,
    ));
    assert!(!handle.advance(&stale));
    assert_eq!(handle.playhead(), 0);
    assert_eq!(handle.current().unwrap().item.filename, "a.jpg");
}

#[test]
fn concurrent_advances_are_never_lost() {
    let handle = PlaylistHandle::new();
    handle.replace(Playlist::build(
        library(),
        PlaylistOrder::Sorted(SortKey::Filename),
        &mut StdRng::seed_from_u64(0),
    ));
    let threads: Vec<_> = (0..4)
        .map(|_| {
            let handle = handle.clone();
            std::thread::spawn(move || {
                for _ in 0..250 {
                    let slot = handle.current().unwrap();
                    handle.advance(&slot);
                }
            })
        })
        .collect();
    for t in threads {
        t.join().unwrap();
    }
    assert_eq!(handle.playhead(), 1000);
}

#[test]
fn find_and_ids_reflect_current_playlist() {
    let handle = PlaylistHandle::new();
    let items = library();
    let wanted = items[1].id.clone();
    handle.replace(Playlist::build(
        items,
        PlaylistOrder::Sorted(SortKey::Filename),
        &mut StdRng::seed_from_u64(0),
    ));
    assert_eq!(handle.find(&wanted).unwrap().filename, "a.jpg");
    assert_eq!(handle.ids().len(), 4);
    let unknown = MediaId::derive(SourceKind::Local, "/nope.jpg");
    assert!(handle.find(&unknown).is_none());
}

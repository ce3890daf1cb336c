//! Integration coverage for Testable Property 1 (cache round-trip) and
//! Testable Property 3 (staleness) across a full close()/init() cycle,
//! exercising the public `spindle_engine::cache` surface rather than
//! internals.

use spindle_engine::cache::{Comment, TrackInfoCache};

#[test]
fn close_then_init_restores_identical_records() {
    let dir = tempfile::tempdir().unwrap();
    let cache_path = dir.path().join("cache");

    let a = dir.path().join("a.mp3");
    let b = dir.path().join("b.flac");
    std::fs::write(&a, b"a").unwrap();
    std::fs::write(&b, b"b").unwrap();
    let a_str = a.to_str().unwrap().to_string();
    let b_str = b.to_str().unwrap().to_string();

    let (cache, _) = TrackInfoCache::init(cache_path.clone());
    cache
        .get(&a_str, |_| {
            Ok((
                200,
                vec![
                    Comment { key: "artist".into(), value: "A Artist".into() },
                    Comment { key: "title".into(), value: "A Title".into() },
                ],
            ))
        })
        .unwrap();
    cache
        .get(&b_str, |_| Ok((-1, vec![Comment { key: "title".into(), value: "B".into() }])))
        .unwrap();
    cache.close().unwrap();

    let (cache2, _) = TrackInfoCache::init(cache_path);
    let restored_a = cache2
        .get(&a_str, |_| unreachable!("mtime unchanged, must not redecode"))
        .unwrap();
    let restored_b = cache2
        .get(&b_str, |_| unreachable!("mtime unchanged, must not redecode"))
        .unwrap();

    assert_eq!(restored_a.duration, 200);
    assert_eq!(
        restored_a.comments,
        vec![
            Comment { key: "artist".into(), value: "A Artist".into() },
            Comment { key: "title".into(), value: "A Title".into() },
        ]
    );
    assert_eq!(restored_b.duration, -1);
}

#[test]
fn empty_cache_survives_a_close_with_no_writes() {
    let dir = tempfile::tempdir().unwrap();
    let cache_path = dir.path().join("cache");

    let (cache, _) = TrackInfoCache::init(cache_path.clone());
    cache.close().unwrap();

    assert!(!cache_path.exists(), "close() on a clean cache must not write a file");
}

#[test]
fn corrupt_cache_file_loads_empty_instead_of_failing() {
    let dir = tempfile::tempdir().unwrap();
    let cache_path = dir.path().join("cache");
    std::fs::write(&cache_path, b"not a cache file at all").unwrap();

    let (cache, outcome) = TrackInfoCache::init(cache_path);
    assert!(matches!(outcome, spindle_engine::cache::InitOutcome::Corrupt));
    assert_eq!(cache.len(), 0);
}

//! Integration test: load lifecycle driven through the actor.
//!
//! SQL loads run on worker threads; completions are marshalled back to the
//! index's owning thread through `SegmentCacheHandle`, while readers block on
//! the returned `SegmentFuture`.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use olap_segment_index::{
    common::load_error, BitKey, RemoveOutcome, SegmentCacheActor, SegmentColumn,
    SegmentHeader, SegmentIdentity, SegmentIndexConfig, SegmentIndexError, Value,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

#[derive(Debug, PartialEq)]
struct Body {
    cells: Vec<f64>,
}

type Actor = SegmentCacheActor<Body, Arc<str>>;

fn identity() -> SegmentIdentity {
    SegmentIdentity::new("FoodMart", "c0ffee", "Sales", "Store Sales", "sales_fact_1997")
}

fn header(year: i64) -> SegmentHeader {
    SegmentHeader::new(
        identity(),
        BitKey::from_bits([0]),
        vec![SegmentColumn::with_values("time.year", [year], Some(2))],
        vec![],
        vec![],
    )
}

fn sql_error(msg: &str) -> olap_segment_index::LoadError {
    load_error(std::io::Error::new(std::io::ErrorKind::Other, msg.to_string()))
}

fn spawn() -> Actor {
    Actor::spawn(SegmentIndexConfig::default()).unwrap()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn add_is_idempotent_and_round_trips_through_locate() {
    let actor = spawn();
    let cache = actor.handle();
    let h = header(1997);

    assert!(cache.add(h.clone(), false, None).unwrap());
    assert!(!cache.add(h.clone(), false, None).unwrap());
    assert_eq!(cache.header_count().unwrap(), 1);

    let coords = BTreeMap::from([("time.year".to_string(), Value::from(1997))]);
    let found = cache.locate(identity(), BitKey::from_bits([0]), coords, vec![]).unwrap();
    assert_eq!(found, vec![h]);
}

#[test]
fn body_loaded_on_worker_thread_reaches_waiters() {
    let actor = spawn();
    let cache = actor.handle();
    let h = header(1997);
    assert!(cache.add(h.clone(), true, None).unwrap());
    let future = cache.get_future(h.clone()).unwrap().expect("slot created");
    assert!(future.wait_timeout(Duration::from_millis(5)).is_none());

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let f = future.clone();
            thread::spawn(move || f.wait().map(|b| b.cells.len()).map_err(|e| e.to_string()))
        })
        .collect();

    let loader = {
        let cache = cache.clone();
        let h = h.clone();
        thread::spawn(move || cache.load_succeeded(h, Body { cells: vec![1.0, 2.5, 4.0] }))
    };
    loader.join().unwrap().unwrap();

    for r in readers {
        assert_eq!(r.join().unwrap(), Ok(3));
    }
    assert_eq!(cache.header_count().unwrap(), 1);
    assert!(!cache.is_loading(h.clone()).unwrap());
    assert!(cache.get_future(h).unwrap().is_some_and(|f| f.is_done()));
}

#[test]
fn duplicate_completion_is_ignored() {
    let actor = spawn();
    let cache = actor.handle();
    let h = header(1997);
    cache.add(h.clone(), true, None).unwrap();
    cache.load_succeeded(h.clone(), Body { cells: vec![1.0] }).unwrap();
    cache.load_succeeded(h.clone(), Body { cells: vec![9.0, 9.0] }).unwrap();

    let future = cache.get_future(h).unwrap().unwrap();
    assert_eq!(future.wait().unwrap().cells, vec![1.0]);
}

#[test]
fn remove_mid_load_waits_for_the_load() {
    let actor = spawn();
    let cache = actor.handle();
    let h = header(1998);
    cache.add(h.clone(), true, None).unwrap();
    let future = cache.get_future(h.clone()).unwrap().unwrap();

    assert_eq!(cache.remove(h.clone()).unwrap(), RemoveOutcome::Deferred);
    assert_eq!(cache.header_count().unwrap(), 1);

    cache.load_succeeded(h.clone(), Body { cells: vec![] }).unwrap();
    assert!(future.is_done());
    assert_eq!(cache.header_count().unwrap(), 0);

    // 再次删除是无操作
    assert_eq!(cache.remove(h).unwrap(), RemoveOutcome::Absent);
}

#[test]
fn flush_during_load_leaves_the_loader_in_charge() {
    let actor = spawn();
    let cache = actor.handle();
    let h = header(1997);
    cache.add(h.clone(), true, None).unwrap();
    let future = cache.get_future(h.clone()).unwrap().unwrap();

    let stale = [SegmentColumn::with_values("time.year", [1997], None)];
    let trimmed = h.with_excluded_regions(&stale);
    assert!(matches!(cache.update(h.clone(), trimmed), Err(SegmentIndexError::HeaderLoading(_))));
    assert_eq!(cache.remove(h.clone()).unwrap(), RemoveOutcome::Deferred);

    let loader = {
        let cache = cache.clone();
        let h = h.clone();
        thread::spawn(move || cache.load_succeeded(h, Body { cells: vec![1.0] }))
    };
    loader.join().unwrap().unwrap();

    assert_eq!(future.wait_timeout(Duration::from_secs(5)).unwrap().unwrap().cells, vec![1.0]);
    assert_eq!(cache.header_count().unwrap(), 0);
}

#[test]
fn failed_load_is_evicted_and_error_reaches_waiter() {
    let actor = spawn();
    let cache = actor.handle();
    let h = header(1997);
    cache.add(h.clone(), true, Some(Arc::from("row-converter"))).unwrap();
    let future = cache.get_future(h.clone()).unwrap().unwrap();

    cache.load_failed(h.clone(), sql_error("ORA-01555")).unwrap();
    assert_eq!(future.wait().unwrap_err().to_string(), "ORA-01555");
    assert_eq!(cache.header_count().unwrap(), 0);
    assert!(cache.get_future(h.clone()).unwrap().is_none());
    assert!(matches!(
        cache.load_failed(h, sql_error("again")),
        Err(SegmentIndexError::UnknownHeader(_))
    ));
}

#[test]
fn converter_round_trip_through_actor() {
    let actor = spawn();
    let cache = actor.handle();
    assert!(matches!(
        cache.set_converter(identity(), vec![], Arc::from("too early")),
        Err(SegmentIndexError::UnknownFactGroup(_))
    ));
    cache.add(header(1997), false, None).unwrap();
    cache.set_converter(identity(), vec![], Arc::from("cells-v2")).unwrap();
    assert_eq!(cache.get_converter(identity(), vec![]).unwrap().as_deref(), Some("cells-v2"));
}

#[test]
fn cache_state_is_deterministic() {
    let actor = spawn();
    let cache = actor.handle();
    cache.add(header(1998), false, None).unwrap();
    cache.add(header(1997), true, None).unwrap();

    let first = cache.cache_state().unwrap();
    let second = cache.cache_state().unwrap();
    assert_eq!(first, second);
    assert_eq!(first.lines().count(), 4);
    assert!(first.contains("(loading)"));
}

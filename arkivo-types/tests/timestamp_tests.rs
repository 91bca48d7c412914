use arkivo_types::HybridTimestamp;
use std::time::Duration;

#[test]
fn now_has_zero_logical() {
    let ts = HybridTimestamp::now();
    assert_eq!(ts.logical(), 0);
    assert!(ts.wall() > 0);
}

#[test]
fn tick_is_strictly_monotonic() {
    let mut ts = HybridTimestamp::now();
    for _ in 0..100 {
        let next = ts.tick();
        assert!(next > ts);
        ts = next;
    }
}

#[test]
fn tick_increments_logical_when_wall_stalls() {
    // A timestamp far in the future forces the logical-counter path.
    let ts = HybridTimestamp::new(u64::MAX - 1, 3);
    let next = ts.tick();
    assert_eq!(next.wall(), ts.wall());
    assert_eq!(next.logical(), 4);
}

#[test]
fn observe_exceeds_both_inputs() {
    let local = HybridTimestamp::new(1000, 5);
    let remote = HybridTimestamp::new(u64::MAX - 1, 9);
    let merged = local.observe(&remote);
    assert!(merged > local);
    assert!(merged > remote);
    assert_eq!(merged.logical(), 10);
}

#[test]
fn observe_past_remote_advances_past_local() {
    let local = HybridTimestamp::new(u64::MAX - 1, 2);
    let remote = HybridTimestamp::new(1000, 0);
    let merged = local.observe(&remote);
    assert!(merged > local);
}

#[test]
fn ordering_by_wall_then_logical() {
    let a = HybridTimestamp::new(100, 0);
    let b = HybridTimestamp::new(100, 1);
    let c = HybridTimestamp::new(101, 0);
    assert!(a < b);
    assert!(b < c);
    assert!(a.is_before(&c));
    assert!(c.is_after(&a));
}

#[test]
fn plus_shifts_wall_component() {
    let ts = HybridTimestamp::new(1_000, 7);
    let later = ts.plus(Duration::from_secs(30));
    assert_eq!(later.wall(), 31_000);
    assert_eq!(later.logical(), 7);
}

#[test]
fn serde_roundtrip() {
    let ts = HybridTimestamp::new(123_456, 42);
    let json = serde_json::to_string(&ts).unwrap();
    let parsed: HybridTimestamp = serde_json::from_str(&json).unwrap();
    assert_eq!(ts, parsed);
}

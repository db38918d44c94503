use super::*;

#[test]
fn fake_clock_advances_by_duration() {
    let clock = FakeClock::default();
    let start = clock.now();
    clock.advance(chrono::Duration::seconds(60));
    assert_eq!(clock.now(), start + chrono::Duration::seconds(60));
}

#[test]
fn fake_clock_set_overrides_current_time() {
    let clock = FakeClock::default();
    let target = DateTime::from_timestamp(0, 0).unwrap();
    clock.set(target);
    assert_eq!(clock.now(), target);
}

#[test]
fn system_clock_moves_forward() {
    let clock = SystemClock;
    let first = clock.now();
    std::thread::sleep(std::time::Duration::from_millis(5));
    let second = clock.now();
    assert!(second >= first);
}

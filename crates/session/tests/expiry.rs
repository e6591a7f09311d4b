use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use chrono::{TimeZone, Utc};
use dupmerge_session::timer::Task;
use dupmerge_session::{
    ManualClock, ManualTimer, SessionError, SessionStore, SessionUpdate, Timer, TimerId,
};

const MINUTE: Duration = Duration::from_secs(60);
const TTL: Duration = Duration::from_secs(15 * 60);

fn manual_store() -> (SessionStore, Arc<ManualTimer>) {
    let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 5, 2, 8, 0, 0).unwrap());
    let timer = Arc::new(ManualTimer::new(clock.clone()));
    (SessionStore::new(TTL, Arc::new(clock), timer.clone()), timer)
}

/// Cancellation is a no-op, so every timer ever armed eventually fires.
struct NeverCancel(Arc<ManualTimer>);

impl Timer for NeverCancel {
    fn schedule(&self, delay: Duration, task: Task) -> TimerId {
        self.0.schedule(delay, task)
    }

    fn cancel(&self, _id: TimerId) -> bool {
        false
    }
}

/// Only the sweep interval gets a real task; per-session expiry never fires.
struct SweepOnly {
    inner: Arc<ManualTimer>,
    interval: Duration,
}

impl Timer for SweepOnly {
    fn schedule(&self, delay: Duration, task: Task) -> TimerId {
        if delay == self.interval {
            self.inner.schedule(delay, task)
        } else {
            self.inner.schedule(delay, Box::new(|| {}))
        }
    }

    fn cancel(&self, id: TimerId) -> bool {
        self.inner.cancel(id)
    }
}

// ---------------------------------------------------------------------------
// Sliding TTL
// ---------------------------------------------------------------------------

#[test]
fn fetch_at_minute_14_extends_life() {
    let (store, timer) = manual_store();
    let id = store.create().id;

    timer.advance(14 * MINUTE);
    assert!(store.get(&id).is_ok());

    // 14 minutes after the refresh: still inside the window.
    timer.advance(14 * MINUTE);
    assert_eq!(store.len(), 1);

    timer.advance(2 * MINUTE);
    assert_eq!(store.len(), 0);
    assert_eq!(store.get(&id).unwrap_err(), SessionError::NotFound);
}

#[test]
fn untouched_past_ttl_is_not_found_even_without_timer() {
    let (store, timer) = manual_store();
    let id = store.create().id;
    // Clock only; the armed timer has not fired.
    timer.clock().advance(TTL + Duration::from_millis(1));
    assert_eq!(timer.pending(), 1);

    assert_eq!(store.get(&id).unwrap_err(), SessionError::NotFound);
    assert!(store.is_empty(), "stale session removed on access");
    assert_eq!(timer.pending(), 0);
}

#[test]
fn exactly_ttl_idle_is_still_live() {
    let (store, timer) = manual_store();
    let id = store.create().id;
    timer.clock().advance(TTL);
    assert!(store.get(&id).is_ok());
}

// ---------------------------------------------------------------------------
// Re-check before delete
// ---------------------------------------------------------------------------

#[test]
fn stale_timer_does_not_delete_refreshed_session() {
    let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 5, 2, 8, 0, 0).unwrap());
    let timer = Arc::new(ManualTimer::new(clock.clone()));
    let store = SessionStore::new(TTL, Arc::new(clock), Arc::new(NeverCancel(timer.clone())));

    let id = store.create().id;
    timer.advance(10 * MINUTE);
    store.update(&id, SessionUpdate::new()).unwrap();
    assert_eq!(timer.pending(), 2, "first timer still armed");

    // First timer fires at 15:01 against a session idle for 5 minutes.
    timer.advance(6 * MINUTE);
    assert_eq!(timer.pending(), 1);
    assert!(store.peek_status(&id).is_ok());

    // Second timer fires at 25:01.
    timer.advance(10 * MINUTE);
    assert!(store.is_empty());
}

#[test]
fn timer_reschedules_when_refreshed_without_rearm() {
    // A current timer that fires early (here: the session was stamped
    // into the future) must reschedule, not delete.
    let (store, timer) = manual_store();
    let id = store.create().id;
    let ahead = store.now() + chrono::Duration::minutes(5);
    store.update(&id, SessionUpdate::new().at(ahead)).unwrap();

    timer.advance(16 * MINUTE);
    assert_eq!(store.len(), 1);
    timer.advance(5 * MINUTE);
    assert!(store.is_empty());
}

// ---------------------------------------------------------------------------
// Sweep
// ---------------------------------------------------------------------------

#[test]
fn sweeper_is_a_safety_net() {
    let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 5, 2, 8, 0, 0).unwrap());
    let timer = Arc::new(ManualTimer::new(clock.clone()));
    let interval = 5 * MINUTE;
    let store = SessionStore::new(
        TTL,
        Arc::new(clock),
        Arc::new(SweepOnly { inner: timer.clone(), interval }),
    );
    store.create();
    store.start_sweeper(interval);

    // Sweeps at 5, 10, 15: idle never exceeds the TTL.
    timer.advance(16 * MINUTE);
    assert_eq!(store.len(), 1);

    // Sweep at 20 removes it.
    timer.advance(4 * MINUTE);
    assert!(store.is_empty());
}

#[test]
fn stop_sweeper_cancels_schedule() {
    let (store, timer) = manual_store();
    store.start_sweeper(5 * MINUTE);
    store.start_sweeper(5 * MINUTE);
    assert_eq!(timer.pending(), 1, "restart replaces the schedule");
    timer.advance(11 * MINUTE);
    assert_eq!(timer.pending(), 1);
    store.stop_sweeper();
    assert_eq!(timer.pending(), 0);
}

// ---------------------------------------------------------------------------
// Real thread timer
// ---------------------------------------------------------------------------

#[test]
fn system_store_expires_on_its_own() {
    let store = SessionStore::system(Duration::from_millis(50)).unwrap();
    let id = store.create().id;
    assert!(store.get(&id).is_ok());

    let deadline = Instant::now() + Duration::from_secs(10);
    while !store.is_empty() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(50));
    }
    assert!(store.is_empty());
}

//! Session store with a sliding idle timeout.
//!
//! Every `get` and `update` refreshes `last_activity` and re-arms the
//! session's expiry timer. Each session has at most one armed timer.
//!
//! When a timer fires, the callback takes the map lock and re-checks idle
//! time against the session's *current* `last_activity`. A session is only
//! deleted if it is idle past the TTL at that moment; a stale timer for a
//! session refreshed since it was armed reschedules or does nothing.
//!
//! A periodic sweep deletes anything idle past the TTL independently of
//! the per-session timers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::clock::{elapsed, Clock, SystemClock};
use crate::error::SessionError;
use crate::id::SessionId;
use crate::session::{Session, SessionStatus, SessionUpdate};
use crate::timer::{ThreadTimer, Timer, TimerId};

/// Added to every expiry delay so a timer never fires at exactly TTL,
/// where the session is not yet expired and would only be re-armed.
const EXPIRY_SLACK: Duration = Duration::from_secs(1);

struct Armed {
    token: u64,
    timer: TimerId,
}

struct Entry {
    session: Session,
    expiry: Option<Armed>,
}

struct Sweeper {
    token: u64,
    timer: TimerId,
}

struct Inner {
    sessions: Mutex<HashMap<SessionId, Entry>>,
    sweeper: Mutex<Option<Sweeper>>,
    clock: Arc<dyn Clock>,
    timer: Arc<dyn Timer>,
    ttl: Duration,
    next_token: AtomicU64,
}

/// Cloneable handle; clones share the same sessions.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<Inner>,
}

impl SessionStore {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>, timer: Arc<dyn Timer>) -> Self {
        Self {
            inner: Arc::new(Inner {
                sessions: Mutex::new(HashMap::new()),
                sweeper: Mutex::new(None),
                clock,
                timer,
                ttl,
                next_token: AtomicU64::new(0),
            }),
        }
    }

    /// Wall clock and a background timer thread.
    pub fn system(ttl: Duration) -> std::io::Result<Self> {
        Ok(Self::new(ttl, Arc::new(SystemClock), Arc::new(ThreadTimer::new()?)))
    }

    pub fn ttl(&self) -> Duration {
        self.inner.ttl
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.inner.clock.now()
    }

    pub fn create(&self) -> Session {
        let now = self.now();
        let session = Session::new(SessionId::generate(), now);
        let mut entry = Entry { session: session.clone(), expiry: None };

        let mut sessions = self.inner.sessions.lock();
        arm(&self.inner, &mut entry, self.inner.ttl);
        sessions.insert(session.id.clone(), entry);
        log::debug!("session {} created ({} live)", session.id.short(), sessions.len());
        session
    }

    /// Fetch a session and extend its life. A session idle past the TTL is
    /// deleted here and reported as not found.
    pub fn get(&self, id: &SessionId) -> Result<Session, SessionError> {
        let now = self.now();
        let mut sessions = self.inner.sessions.lock();
        let entry = live_entry(&self.inner, &mut sessions, id, now)?;
        entry.session.last_activity = now;
        arm(&self.inner, entry, self.inner.ttl);
        Ok(entry.session.clone())
    }

    /// Status without refreshing `last_activity`.
    pub fn peek_status(&self, id: &SessionId) -> Result<SessionStatus, SessionError> {
        let now = self.now();
        let mut sessions = self.inner.sessions.lock();
        let entry = live_entry(&self.inner, &mut sessions, id, now)?;
        Ok(entry.session.status())
    }

    /// Merge `update` into the stored session. `last_activity` becomes the
    /// update's timestamp if it carries one, else now.
    ///
    /// An update built with [`SessionUpdate::if_revision`] is checked against
    /// the session's revision under the map lock, so a result computed from
    /// superseded inputs is never stored.
    pub fn update(&self, id: &SessionId, update: SessionUpdate) -> Result<(), SessionError> {
        let now = self.now();
        let mut sessions = self.inner.sessions.lock();
        let entry = live_entry(&self.inner, &mut sessions, id, now)?;
        if let Some(expected) = update.expected_revision() {
            if expected != entry.session.revision {
                log::debug!(
                    "session {}: update for revision {expected} rejected, now at {}",
                    id.short(),
                    entry.session.revision
                );
                return Err(SessionError::Conflict);
            }
        }
        entry.session.apply(update, now);
        let idle = elapsed(entry.session.last_activity, now);
        arm(&self.inner, entry, self.inner.ttl.saturating_sub(idle));
        Ok(())
    }

    /// Remove a session and cancel its timer. Returns false if it was
    /// already gone.
    pub fn delete(&self, id: &SessionId) -> bool {
        let removed = remove(&self.inner, &mut self.inner.sessions.lock(), id);
        if removed {
            log::debug!("session {} deleted", id.short());
        }
        removed
    }

    /// Delete every session idle past the TTL. Returns how many went.
    pub fn sweep_expired(&self) -> usize {
        sweep(&self.inner)
    }

    /// Run [`SessionStore::sweep_expired`] every `interval` until stopped.
    /// Restarting replaces the previous schedule.
    pub fn start_sweeper(&self, interval: Duration) {
        let mut sweeper = self.inner.sweeper.lock();
        if let Some(old) = sweeper.take() {
            self.inner.timer.cancel(old.timer);
        }
        let token = self.inner.next_token.fetch_add(1, Ordering::Relaxed);
        let timer = schedule_sweep(&self.inner, interval, token);
        *sweeper = Some(Sweeper { token, timer });
    }

    pub fn stop_sweeper(&self) {
        if let Some(old) = self.inner.sweeper.lock().take() {
            self.inner.timer.cancel(old.timer);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(sweeper) = self.sweeper.get_mut().take() {
            self.timer.cancel(sweeper.timer);
        }
        for entry in self.sessions.get_mut().values_mut() {
            if let Some(armed) = entry.expiry.take() {
                self.timer.cancel(armed.timer);
            }
        }
    }
}

// ============================================================================
// Internals. Every function below expects the caller to hold the map lock.
// ============================================================================

fn is_expired(inner: &Inner, session: &Session, now: DateTime<Utc>) -> bool {
    elapsed(session.last_activity, now) > inner.ttl
}

fn live_entry<'m>(
    inner: &Inner,
    sessions: &'m mut HashMap<SessionId, Entry>,
    id: &SessionId,
    now: DateTime<Utc>,
) -> Result<&'m mut Entry, SessionError> {
    let expired = match sessions.get(id) {
        None => return Err(SessionError::NotFound),
        Some(entry) => is_expired(inner, &entry.session, now),
    };
    if expired {
        remove(inner, sessions, id);
        log::info!("session {} expired on access", id.short());
        return Err(SessionError::NotFound);
    }
    sessions.get_mut(id).ok_or(SessionError::NotFound)
}

fn remove(inner: &Inner, sessions: &mut HashMap<SessionId, Entry>, id: &SessionId) -> bool {
    match sessions.remove(id) {
        Some(mut entry) => {
            if let Some(armed) = entry.expiry.take() {
                inner.timer.cancel(armed.timer);
            }
            true
        }
        None => false,
    }
}

/// Replace the entry's expiry timer with one firing after `delay`.
fn arm(inner: &Arc<Inner>, entry: &mut Entry, delay: Duration) {
    if let Some(old) = entry.expiry.take() {
        inner.timer.cancel(old.timer);
    }
    let token = inner.next_token.fetch_add(1, Ordering::Relaxed);
    let weak: Weak<Inner> = Arc::downgrade(inner);
    let id = entry.session.id.clone();
    let timer = inner.timer.schedule(
        delay + EXPIRY_SLACK,
        Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                on_expiry(&inner, &id, token);
            }
        }),
    );
    entry.expiry = Some(Armed { token, timer });
}

fn on_expiry(inner: &Arc<Inner>, id: &SessionId, token: u64) {
    let now = inner.clock.now();
    let mut sessions = inner.sessions.lock();
    let Some(entry) = sessions.get_mut(id) else {
        return;
    };

    let idle = elapsed(entry.session.last_activity, now);
    if idle > inner.ttl {
        if entry.expiry.as_ref().is_some_and(|a| a.token == token) {
            entry.expiry = None;
        }
        remove(inner, &mut sessions, id);
        log::info!("session {} expired after {}s idle", id.short(), idle.as_secs());
        return;
    }

    // Still fresh. Only the current timer re-arms; a superseded one stops here.
    if entry.expiry.as_ref().is_some_and(|a| a.token == token) {
        log::debug!("session {} refreshed since timer was armed; rescheduling", id.short());
        arm(inner, entry, inner.ttl - idle);
    }
}

fn sweep(inner: &Inner) -> usize {
    let now = inner.clock.now();
    let mut sessions = inner.sessions.lock();
    let stale: Vec<SessionId> = sessions
        .iter()
        .filter(|(_, entry)| is_expired(inner, &entry.session, now))
        .map(|(id, _)| id.clone())
        .collect();
    for id in &stale {
        remove(inner, &mut sessions, id);
    }
    if !stale.is_empty() {
        log::info!("sweep removed {} expired session(s), {} live", stale.len(), sessions.len());
    }
    stale.len()
}

fn schedule_sweep(inner: &Arc<Inner>, interval: Duration, token: u64) -> TimerId {
    let weak = Arc::downgrade(inner);
    inner.timer.schedule(
        interval,
        Box::new(move || {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let mut sweeper = inner.sweeper.lock();
            if !sweeper.as_ref().is_some_and(|s| s.token == token) {
                return;
            }
            sweep(&inner);
            let timer = schedule_sweep(&inner, interval, token);
            *sweeper = Some(Sweeper { token, timer });
        }),
    )
}

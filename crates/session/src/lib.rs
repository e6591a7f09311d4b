//! `dupmerge-session`: per-user merge sessions with a sliding idle timeout.
//!
//! The store owns an explicit map plus injected [`Clock`] and [`Timer`], so
//! tests drive expiry with [`ManualClock`] / [`ManualTimer`] instead of sleeping.

pub mod clock;
pub mod error;
pub mod id;
pub mod session;
pub mod store;
pub mod timer;
pub mod workflow;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::SessionError;
pub use id::SessionId;
pub use session::{Session, SessionStatus, SessionUpdate};
pub use store::SessionStore;
pub use timer::{ManualTimer, ThreadTimer, Timer, TimerId};
pub use workflow::MergeWorkflow;

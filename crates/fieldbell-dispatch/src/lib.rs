//! # Fieldbell Dispatch
//! The notification dispatcher (queued-report delivery), the group
//! liveness checker, and the single-flight tick scheduler that drives
//! them both.

pub mod dispatcher;
pub mod liveness;
pub mod scheduler;

pub use dispatcher::{DispatchReport, NotificationDispatcher};
pub use liveness::GroupLivenessChecker;
pub use scheduler::DispatchScheduler;

//! # Fieldbell Verify
//! Per-user verification sessions, the stepwise identity check with
//! escalating lockout, and the admin group-binding service.

pub mod engine;
pub mod groups;
pub mod session;

pub use engine::{VerificationEngine, VerifyOutcome};
pub use groups::GroupBindingService;
pub use session::{IndexOrigin, SessionStore, VerificationSession, VerifyStep};

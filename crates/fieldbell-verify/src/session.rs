//! Per-user conversation state, keyed by Telegram user id.

use chrono::{DateTime, Utc};
use fieldbell_core::types::Role;
use std::collections::HashMap;
use std::sync::Mutex;

/// Where an indexing session was started. Indexing from a group stamps
/// that group onto the queued report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOrigin {
    Private,
    Group(i64),
}

impl IndexOrigin {
    pub fn group_id(&self) -> Option<i64> {
        match self {
            IndexOrigin::Private => None,
            IndexOrigin::Group(id) => Some(*id),
        }
    }
}

/// Current step of a conversation. Only moves forward, except that
/// `/start` resets to `AwaitingUsername` and `/cancel` exits indexing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyStep {
    AwaitingUsername,
    AwaitingRole,
    Indexing(IndexOrigin),
    Completed,
}

/// One user's verification state.
#[derive(Debug, Clone)]
pub struct VerificationSession {
    pub step: VerifyStep,
    pub username: Option<String>,
    pub role: Option<Role>,
    /// Failed credential attempts inside the current lockout window.
    pub attempts: u32,
    /// Lockouts incurred since the last success.
    pub penalties: u32,
    /// Set while the session is locked out.
    pub penalty_end: Option<DateTime<Utc>>,
}

impl VerificationSession {
    fn fresh() -> Self {
        Self {
            step: VerifyStep::AwaitingUsername,
            username: None,
            role: None,
            attempts: 0,
            penalties: 0,
            penalty_end: None,
        }
    }

    /// Remaining lockout, if any.
    pub fn remaining_penalty(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        let end = self.penalty_end?;
        if now < end { Some(end - now) } else { None }
    }
}

/// Keyed in-memory session table. All access goes through `with_session`,
/// which holds the lock for the whole read-modify-write of one key.
#[derive(Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<i64, VerificationSession>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset (or create) a session at the start of verification. Penalty
    /// state survives the reset so `/start` cannot wash out a lockout.
    pub fn start(&self, user_id: i64) {
        let mut sessions = self.sessions.lock().unwrap();
        let entry = sessions.entry(user_id).or_insert_with(VerificationSession::fresh);
        entry.step = VerifyStep::AwaitingUsername;
        entry.username = None;
        entry.role = None;
    }

    /// Snapshot of one session.
    pub fn get(&self, user_id: i64) -> Option<VerificationSession> {
        self.sessions.lock().unwrap().get(&user_id).cloned()
    }

    /// Atomic read-modify-write against one key. Returns None when the
    /// user has no session.
    pub fn with_session<R>(
        &self,
        user_id: i64,
        f: impl FnOnce(&mut VerificationSession) -> R,
    ) -> Option<R> {
        let mut sessions = self.sessions.lock().unwrap();
        sessions.get_mut(&user_id).map(f)
    }

    /// Put the user into indexing mode, creating a completed-state session
    /// first if they have none (verified users may never have run /start
    /// in this process lifetime).
    pub fn enter_indexing(&self, user_id: i64, origin: IndexOrigin) {
        let mut sessions = self.sessions.lock().unwrap();
        let entry = sessions.entry(user_id).or_insert_with(|| VerificationSession {
            step: VerifyStep::Completed,
            ..VerificationSession::fresh()
        });
        entry.step = VerifyStep::Indexing(origin);
    }

    /// Leave indexing mode. Returns false when the session was not
    /// indexing (cancel is a no-op then).
    pub fn cancel_indexing(&self, user_id: i64) -> bool {
        let mut sessions = self.sessions.lock().unwrap();
        match sessions.get_mut(&user_id) {
            Some(s) if matches!(s.step, VerifyStep::Indexing(_)) => {
                s.step = VerifyStep::Completed;
                true
            }
            _ => false,
        }
    }
}

//! Verification engine — consumes one inbound text per step, counts
//! failed credential attempts, and escalates lockouts geometrically.

use chrono::Utc;
use fieldbell_core::config::VerifyConfig;
use fieldbell_core::error::Result;
use fieldbell_core::traits::RecordStore;
use fieldbell_core::types::Role;
use std::sync::Arc;

use crate::session::{SessionStore, VerifyStep};

/// What `submit` decided. The front end renders these into replies;
/// the engine never talks to the chat platform itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyOutcome {
    /// No session — the user has not run /start.
    NoSession,
    /// Session is locked out; nothing was consumed.
    Locked { remaining_secs: u64 },
    /// Username rejected (empty); re-prompt.
    EmptyUsername,
    /// Username stored; ask for the role next.
    PromptRole,
    /// Role keyword not recognized; re-prompt, no attempt consumed.
    MalformedRole,
    /// Credentials not found; one attempt consumed.
    Rejected { attempts_left: u32 },
    /// This failure crossed the attempt limit and triggered a lockout.
    LockedOut { wait_secs: u64 },
    /// Verified and bound.
    Verified { username: String, role: Role },
    /// Session is Completed or Indexing — not verification input.
    NotVerifying,
}

/// Stepwise identity check with attempt limiting.
pub struct VerificationEngine {
    sessions: Arc<SessionStore>,
    store: Arc<dyn RecordStore>,
    config: VerifyConfig,
}

impl VerificationEngine {
    pub fn new(sessions: Arc<SessionStore>, store: Arc<dyn RecordStore>, config: VerifyConfig) -> Self {
        Self {
            sessions,
            store,
            config,
        }
    }

    /// Begin (or restart) verification for a user.
    pub fn start(&self, user_id: i64) {
        self.sessions.start(user_id);
        tracing::info!("🔐 Verification started for user {user_id}");
    }

    /// Consume one inbound text for the user's current step.
    pub async fn submit(&self, user_id: i64, text: &str) -> Result<VerifyOutcome> {
        let now = Utc::now();

        // Lockout gate first: a locked session rejects everything and
        // consumes nothing.
        let Some(step) = self.sessions.with_session(user_id, |s| {
            if let Some(remaining) = s.remaining_penalty(now) {
                return Err(remaining.num_seconds().max(1) as u64);
            }
            Ok(s.step)
        }) else {
            return Ok(VerifyOutcome::NoSession);
        };
        let step = match step {
            Ok(step) => step,
            Err(remaining_secs) => {
                return Ok(VerifyOutcome::Locked { remaining_secs });
            }
        };

        match step {
            VerifyStep::AwaitingUsername => Ok(self.take_username(user_id, text)),
            VerifyStep::AwaitingRole => self.take_role(user_id, text).await,
            VerifyStep::Indexing(_) | VerifyStep::Completed => Ok(VerifyOutcome::NotVerifying),
        }
    }

    fn take_username(&self, user_id: i64, text: &str) -> VerifyOutcome {
        let username = text.trim();
        if username.is_empty() {
            return VerifyOutcome::EmptyUsername;
        }
        self.sessions.with_session(user_id, |s| {
            s.username = Some(username.to_string());
            s.step = VerifyStep::AwaitingRole;
        });
        tracing::info!("📝 User {user_id} entered username");
        VerifyOutcome::PromptRole
    }

    async fn take_role(&self, user_id: i64, text: &str) -> Result<VerifyOutcome> {
        // Malformed role keyword is a validation error, not an
        // authentication failure: re-prompt without consuming an attempt.
        let Some(role) = Role::parse(text) else {
            return Ok(VerifyOutcome::MalformedRole);
        };

        let username = self
            .sessions
            .with_session(user_id, |s| s.username.clone())
            .flatten()
            .unwrap_or_default();

        let matched = match self.store.find_by_credentials(&username, role).await {
            Ok(found) => found.is_some(),
            Err(e) => {
                // Lookup trouble is never fatal to the flow; it reads as
                // a failed attempt, same as not-found.
                tracing::warn!("⚠️ Credential lookup failed for user {user_id}: {e}");
                false
            }
        };

        if !matched {
            tracing::info!("❌ Failed verification for user {user_id}: {username}/{}", role.as_str());
            return Ok(self.record_failure(user_id));
        }

        // Success path: exactly one persisted write. A write failure still
        // completes the session locally so the user is not looped through
        // retries; the caller surfaces the error.
        self.sessions.with_session(user_id, |s| {
            s.role = Some(role);
            s.step = VerifyStep::Completed;
            s.attempts = 0;
            s.penalties = 0;
            s.penalty_end = None;
        });

        self.store
            .bind_telegram_id(&username, role, user_id)
            .await?;

        tracing::info!(
            "✅ User {user_id} verified as {username} ({})",
            role.as_str()
        );
        Ok(VerifyOutcome::Verified { username, role })
    }

    /// Count one failed attempt; escalate to a lockout at the limit.
    fn record_failure(&self, user_id: i64) -> VerifyOutcome {
        let max_attempts = self.config.max_attempts;
        let base_secs = self.config.penalty_base_secs;

        self.sessions
            .with_session(user_id, |s| {
                s.attempts += 1;
                if s.attempts >= max_attempts {
                    s.penalties += 1;
                    s.attempts = 0;
                    let wait_secs = base_secs * s.penalties as u64;
                    s.penalty_end =
                        Some(Utc::now() + chrono::Duration::seconds(wait_secs as i64));
                    tracing::warn!(
                        "🚫 User {user_id} locked out for {wait_secs}s (lockout #{})",
                        s.penalties
                    );
                    VerifyOutcome::LockedOut { wait_secs }
                } else {
                    VerifyOutcome::Rejected {
                        attempts_left: max_attempts - s.attempts,
                    }
                }
            })
            .unwrap_or(VerifyOutcome::NoSession)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldbell_core::types::OperatorRecord;
    use fieldbell_store::MemoryRecordStore;

    fn engine_with(store: Arc<MemoryRecordStore>) -> (VerificationEngine, Arc<SessionStore>) {
        let sessions = Arc::new(SessionStore::new());
        let engine = VerificationEngine::new(
            sessions.clone(),
            store,
            VerifyConfig::default(),
        );
        (engine, sessions)
    }

    async fn seeded_store() -> Arc<MemoryRecordStore> {
        let store = Arc::new(MemoryRecordStore::new());
        let record = OperatorRecord {
            id: 0,
            user_name: "alice".into(),
            role: Role::Admin,
            telegram_id: None,
            group_id: None,
            message_body: None,
            is_sent: false,
            sent_at: None,
        };
        store.insert(record).await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_happy_path_binds_telegram_id() {
        let store = Arc::new(MemoryRecordStore::new());
        store
            .insert(OperatorRecord {
                id: 0,
                user_name: "alice".into(),
                role: Role::Admin,
                telegram_id: None,
                group_id: None,
                message_body: None,
                is_sent: false,
                sent_at: None,
            })
            .await
            .unwrap();
        let (engine, sessions) = engine_with(store.clone());

        engine.start(42);
        assert_eq!(
            engine.submit(42, "alice").await.unwrap(),
            VerifyOutcome::PromptRole
        );
        assert_eq!(
            engine.submit(42, "Admin").await.unwrap(),
            VerifyOutcome::Verified {
                username: "alice".into(),
                role: Role::Admin
            }
        );

        let record = store.find_by_telegram_id(42).await.unwrap().unwrap();
        assert_eq!(record.user_name, "alice");
        assert_eq!(sessions.get(42).unwrap().step, VerifyStep::Completed);
    }

    #[tokio::test]
    async fn test_malformed_role_consumes_no_attempt() {
        let (engine, sessions) = engine_with(seeded_store().await);
        engine.start(1);
        engine.submit(1, "alice").await.unwrap();

        for _ in 0..5 {
            assert_eq!(
                engine.submit(1, "supervisor").await.unwrap(),
                VerifyOutcome::MalformedRole
            );
        }
        assert_eq!(sessions.get(1).unwrap().attempts, 0);
    }

    #[tokio::test]
    async fn test_three_failures_lock_out_for_base_duration() {
        let (engine, _sessions) = engine_with(seeded_store().await);
        engine.start(1);
        // "alice"/waspang does not exist — only alice/admin was seeded
        engine.submit(1, "alice").await.unwrap();

        assert_eq!(
            engine.submit(1, "waspang").await.unwrap(),
            VerifyOutcome::Rejected { attempts_left: 2 }
        );
        assert_eq!(
            engine.submit(1, "waspang").await.unwrap(),
            VerifyOutcome::Rejected { attempts_left: 1 }
        );
        // Third failure: first lockout, multiplier 1 → 15 seconds
        assert_eq!(
            engine.submit(1, "waspang").await.unwrap(),
            VerifyOutcome::LockedOut { wait_secs: 15 }
        );

        // Locked: submissions rejected with remaining wait, nothing consumed
        match engine.submit(1, "waspang").await.unwrap() {
            VerifyOutcome::Locked { remaining_secs } => assert!(remaining_secs <= 15),
            other => panic!("expected Locked, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_lockout_duration_grows_geometrically() {
        let (engine, sessions) = engine_with(seeded_store().await);
        engine.start(1);
        engine.submit(1, "bob").await.unwrap();

        // First lockout
        engine.submit(1, "waspang").await.unwrap();
        engine.submit(1, "waspang").await.unwrap();
        assert_eq!(
            engine.submit(1, "waspang").await.unwrap(),
            VerifyOutcome::LockedOut { wait_secs: 15 }
        );

        // Expire the penalty, attempts must reset for the new window
        sessions.with_session(1, |s| {
            s.penalty_end = Some(Utc::now() - chrono::Duration::seconds(1));
        });
        assert_eq!(sessions.get(1).unwrap().attempts, 0);

        // Second lockout doubles the wait
        engine.submit(1, "waspang").await.unwrap();
        engine.submit(1, "waspang").await.unwrap();
        assert_eq!(
            engine.submit(1, "waspang").await.unwrap(),
            VerifyOutcome::LockedOut { wait_secs: 30 }
        );
    }

    #[tokio::test]
    async fn test_expired_lockout_accepts_attempts_again() {
        let (engine, sessions) = engine_with(seeded_store().await);
        engine.start(1);
        engine.submit(1, "alice").await.unwrap();
        for _ in 0..3 {
            engine.submit(1, "waspang").await.unwrap();
        }
        sessions.with_session(1, |s| {
            s.penalty_end = Some(Utc::now() - chrono::Duration::seconds(1));
        });

        // Accepts input again; correct credentials succeed
        assert_eq!(
            engine.submit(1, "admin").await.unwrap(),
            VerifyOutcome::Verified {
                username: "alice".into(),
                role: Role::Admin
            }
        );
        let session = sessions.get(1).unwrap();
        assert_eq!(session.penalties, 0);
        assert!(session.penalty_end.is_none());
    }

    #[tokio::test]
    async fn test_no_store_write_on_failure() {
        let store = seeded_store().await;
        let (engine, _) = engine_with(store.clone());
        engine.start(1);
        engine.submit(1, "mallory").await.unwrap();
        engine.submit(1, "admin").await.unwrap();

        // Nothing was bound
        assert!(store.find_by_telegram_id(1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_write_failure_completes_session_locally() {
        let store = seeded_store().await;
        let (engine, sessions) = engine_with(store.clone());
        engine.start(1);
        engine.submit(1, "alice").await.unwrap();

        store.poison_writes();
        let result = engine.submit(1, "admin").await;
        assert!(result.is_err());
        // Session stays Completed so the user is not looped into retries
        assert_eq!(sessions.get(1).unwrap().step, VerifyStep::Completed);
    }

    #[tokio::test]
    async fn test_submit_without_start() {
        let (engine, _) = engine_with(seeded_store().await);
        assert_eq!(
            engine.submit(99, "alice").await.unwrap(),
            VerifyOutcome::NoSession
        );
    }
}

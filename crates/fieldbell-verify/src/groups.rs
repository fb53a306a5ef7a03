//! Group binding — associates a verified admin with one delivery group
//! and gates in-group command access.

use fieldbell_core::traits::{MessagingGateway, RecordStore};
use fieldbell_core::types::Role;
use std::sync::Arc;

/// Binds delivery groups to admin records and answers access checks.
pub struct GroupBindingService {
    store: Arc<dyn RecordStore>,
    gateway: Arc<dyn MessagingGateway>,
}

impl GroupBindingService {
    pub fn new(store: Arc<dyn RecordStore>, gateway: Arc<dyn MessagingGateway>) -> Self {
        Self { store, gateway }
    }

    /// Bind `group_id` to the admin's record. A group belongs to at most
    /// one record at a time, so any previous holder is cleared first
    /// (last writer wins). Returns false when the caller is not a
    /// verified admin or the write fails.
    pub async fn bind(&self, admin_id: i64, group_id: i64, title: &str) -> bool {
        let record = match self.store.find_by_telegram_id(admin_id).await {
            Ok(Some(record)) if record.role == Role::Admin => record,
            Ok(_) => {
                tracing::warn!("🚷 Bind refused: {admin_id} is not a verified admin");
                return false;
            }
            Err(e) => {
                tracing::warn!("⚠️ Bind lookup failed for {admin_id}: {e}");
                return false;
            }
        };

        if let Err(e) = self.store.clear_group_everywhere(group_id).await {
            tracing::warn!("⚠️ Could not release previous binding of group {group_id}: {e}");
            return false;
        }
        match self.store.set_group(record.id, group_id).await {
            Ok(()) => {
                tracing::info!(
                    "🔗 Group \"{title}\" ({group_id}) bound to {}",
                    record.user_name
                );
                true
            }
            Err(e) => {
                tracing::warn!("⚠️ Bind write failed for group {group_id}: {e}");
                false
            }
        }
    }

    /// Clear the admin's group binding. Returns false when the caller is
    /// not a verified admin or the write fails.
    pub async fn unbind(&self, admin_id: i64) -> bool {
        let record = match self.store.find_by_telegram_id(admin_id).await {
            Ok(Some(record)) if record.role == Role::Admin => record,
            Ok(_) => return false,
            Err(e) => {
                tracing::warn!("⚠️ Unbind lookup failed for {admin_id}: {e}");
                return false;
            }
        };
        match self.store.clear_group_for_record(record.id).await {
            Ok(()) => {
                tracing::info!("🔓 Group binding cleared for {}", record.user_name);
                true
            }
            Err(e) => {
                tracing::warn!("⚠️ Unbind write failed for {}: {e}", record.user_name);
                false
            }
        }
    }

    /// True iff the user is a platform-level administrator of the group
    /// AND holds an Admin record bound to that same group. Every in-group
    /// command goes through this.
    pub async fn is_authorized_in_group(&self, user_id: i64, group_id: i64) -> bool {
        let platform_admin = match self.gateway.get_chat_administrators(group_id).await {
            Ok(admins) => admins.contains(&user_id),
            Err(e) => {
                tracing::warn!("⚠️ Admin list lookup failed for group {group_id}: {e}");
                false
            }
        };
        if !platform_admin {
            return false;
        }

        match self.store.find_by_telegram_id(user_id).await {
            Ok(Some(record)) => record.role == Role::Admin && record.group_id == Some(group_id),
            Ok(None) => false,
            Err(e) => {
                tracing::warn!("⚠️ Record lookup failed for {user_id}: {e}");
                false
            }
        }
    }

    /// Whether the user's record carries the given role. Used by the
    /// front end to gate private-chat commands.
    pub async fn has_role(&self, user_id: i64, role: Role) -> bool {
        matches!(
            self.store.find_by_telegram_id(user_id).await,
            Ok(Some(record)) if record.role == role
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use fieldbell_core::traits::GatewayError;
    use fieldbell_core::types::OperatorRecord;
    use fieldbell_store::MemoryRecordStore;
    use std::collections::HashMap;

    /// Gateway stub: group id → platform admin ids; missing groups probe
    /// as inaccessible.
    struct StubGateway {
        admins: HashMap<i64, Vec<i64>>,
    }

    #[async_trait]
    impl MessagingGateway for StubGateway {
        async fn send_message(&self, _chat_id: i64, _text: &str) -> Result<(), GatewayError> {
            Ok(())
        }

        async fn get_chat(&self, chat_id: i64) -> Result<(), GatewayError> {
            if self.admins.contains_key(&chat_id) {
                Ok(())
            } else {
                Err(GatewayError::ChatInaccessible(chat_id))
            }
        }

        async fn get_chat_administrators(&self, group_id: i64) -> Result<Vec<i64>, GatewayError> {
            self.admins
                .get(&group_id)
                .cloned()
                .ok_or(GatewayError::ChatInaccessible(group_id))
        }
    }

    async fn seed(store: &MemoryRecordStore, name: &str, role: Role, telegram_id: Option<i64>) -> i64 {
        store
            .insert(OperatorRecord {
                id: 0,
                user_name: name.into(),
                role,
                telegram_id,
                group_id: None,
                message_body: None,
                is_sent: false,
                sent_at: None,
            })
            .await
            .unwrap()
    }

    fn service(
        store: Arc<MemoryRecordStore>,
        admins: HashMap<i64, Vec<i64>>,
    ) -> GroupBindingService {
        GroupBindingService::new(store, Arc::new(StubGateway { admins }))
    }

    #[tokio::test]
    async fn test_bind_requires_admin_role() {
        let store = Arc::new(MemoryRecordStore::new());
        seed(&store, "alice", Role::Admin, Some(1)).await;
        seed(&store, "bob", Role::Waspang, Some(2)).await;
        let svc = service(store.clone(), HashMap::new());

        assert!(svc.bind(1, -100, "Ops").await);
        assert!(!svc.bind(2, -100, "Ops").await);
        // Unverified id
        assert!(!svc.bind(99, -100, "Ops").await);
    }

    #[tokio::test]
    async fn test_bind_is_last_writer_wins() {
        let store = Arc::new(MemoryRecordStore::new());
        let alice = seed(&store, "alice", Role::Admin, Some(1)).await;
        let bob = seed(&store, "bob", Role::Admin, Some(2)).await;
        let svc = service(store.clone(), HashMap::new());

        assert!(svc.bind(1, -100, "Ops").await);
        assert!(svc.bind(2, -100, "Ops").await);

        // Exactly one holder: bob took the binding from alice
        assert_eq!(store.get(alice).unwrap().group_id, None);
        assert_eq!(store.get(bob).unwrap().group_id, Some(-100));
    }

    #[tokio::test]
    async fn test_unbind_clears_binding() {
        let store = Arc::new(MemoryRecordStore::new());
        let alice = seed(&store, "alice", Role::Admin, Some(1)).await;
        let svc = service(store.clone(), HashMap::new());

        svc.bind(1, -100, "Ops").await;
        assert!(svc.unbind(1).await);
        assert_eq!(store.get(alice).unwrap().group_id, None);
    }

    #[tokio::test]
    async fn test_authorization_needs_both_checks() {
        let store = Arc::new(MemoryRecordStore::new());
        seed(&store, "alice", Role::Admin, Some(1)).await;
        seed(&store, "carol", Role::Admin, Some(3)).await;
        // 1 and 9 are platform admins of -100; 3 is not
        let svc = service(
            store.clone(),
            HashMap::from([(-100i64, vec![1i64, 9])]),
        );

        svc.bind(1, -100, "Ops").await;

        // Bound record + platform admin → authorized
        assert!(svc.is_authorized_in_group(1, -100).await);
        // Platform admin of the group but no bound record → refused
        assert!(!svc.is_authorized_in_group(9, -100).await);
        // Bound-less admin record, not a platform admin → refused
        assert!(!svc.is_authorized_in_group(3, -100).await);
        // Unknown group → refused
        assert!(!svc.is_authorized_in_group(1, -200).await);
    }
}

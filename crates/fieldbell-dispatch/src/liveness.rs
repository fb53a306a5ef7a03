//! Group liveness checker — prunes bindings to groups the bot lost.

use fieldbell_core::error::Result;
use fieldbell_core::traits::{MessagingGateway, RecordStore};
use std::sync::Arc;

/// Probes every bound group and clears dead bindings.
pub struct GroupLivenessChecker {
    store: Arc<dyn RecordStore>,
    gateway: Arc<dyn MessagingGateway>,
}

impl GroupLivenessChecker {
    pub fn new(store: Arc<dyn RecordStore>, gateway: Arc<dyn MessagingGateway>) -> Self {
        Self { store, gateway }
    }

    /// Probe each distinct bound group once. A failed probe clears the
    /// binding on every record pointing at that group (a dead group may
    /// have been bound to more than one record historically). Returns the
    /// number of groups pruned.
    pub async fn verify_all(&self) -> Result<usize> {
        let group_ids = self.store.distinct_group_ids().await?;
        if group_ids.is_empty() {
            return Ok(0);
        }

        tracing::info!("🔍 Verifying {} bound group(s)", group_ids.len());
        let mut pruned = 0;

        for group_id in group_ids {
            match self.gateway.get_chat(group_id).await {
                Ok(()) => {
                    tracing::debug!("Group {group_id}: active");
                }
                Err(e) if e.is_chat_gone() => {
                    tracing::warn!("🧹 Group {group_id} is gone — clearing bindings");
                    // Best-effort cascade; a store failure here leaves the
                    // binding for the next sweep.
                    match self.store.clear_group_everywhere(group_id).await {
                        Ok(cleared) => {
                            tracing::info!(
                                "✅ Cleared group {group_id} from {cleared} record(s)"
                            );
                            pruned += 1;
                        }
                        Err(e) => {
                            tracing::error!("❌ Could not clear group {group_id}: {e}");
                        }
                    }
                }
                Err(e) => {
                    // Transient probe trouble is not evidence the group is
                    // dead; leave the binding alone.
                    tracing::warn!("⚠️ Probe of group {group_id} failed: {e}");
                }
            }
        }

        Ok(pruned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use fieldbell_core::traits::GatewayError;
    use fieldbell_core::types::{OperatorRecord, Role};
    use fieldbell_store::MemoryRecordStore;
    use std::collections::HashSet;

    /// Probe stub: listed groups are dead, everything else is alive.
    struct DeadGroups(HashSet<i64>);

    #[async_trait]
    impl MessagingGateway for DeadGroups {
        async fn send_message(&self, _chat_id: i64, _text: &str) -> std::result::Result<(), GatewayError> {
            Ok(())
        }

        async fn get_chat(&self, chat_id: i64) -> std::result::Result<(), GatewayError> {
            if self.0.contains(&chat_id) {
                Err(GatewayError::ChatInaccessible(chat_id))
            } else {
                Ok(())
            }
        }

        async fn get_chat_administrators(&self, _group_id: i64) -> std::result::Result<Vec<i64>, GatewayError> {
            Ok(Vec::new())
        }
    }

    async fn seed_bound(store: &MemoryRecordStore, name: &str, group_id: i64) -> i64 {
        store
            .insert(OperatorRecord {
                id: 0,
                user_name: name.into(),
                role: Role::Admin,
                telegram_id: None,
                group_id: Some(group_id),
                message_body: None,
                is_sent: false,
                sent_at: None,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_only_dead_groups_are_pruned() {
        let store = Arc::new(MemoryRecordStore::new());
        let g1_record = seed_bound(&store, "alice", -1).await;
        let g2_record = seed_bound(&store, "bob", -2).await;

        let checker = GroupLivenessChecker::new(
            store.clone(),
            Arc::new(DeadGroups(HashSet::from([-1]))),
        );
        let pruned = checker.verify_all().await.unwrap();

        assert_eq!(pruned, 1);
        assert_eq!(store.get(g1_record).unwrap().group_id, None);
        assert_eq!(store.get(g2_record).unwrap().group_id, Some(-2));
    }

    #[tokio::test]
    async fn test_cascade_clears_every_holder_of_a_dead_group() {
        let store = Arc::new(MemoryRecordStore::new());
        let a = seed_bound(&store, "alice", -1).await;
        let b = seed_bound(&store, "bob", -1).await;

        let checker = GroupLivenessChecker::new(
            store.clone(),
            Arc::new(DeadGroups(HashSet::from([-1]))),
        );
        checker.verify_all().await.unwrap();

        assert_eq!(store.get(a).unwrap().group_id, None);
        assert_eq!(store.get(b).unwrap().group_id, None);
    }

    #[tokio::test]
    async fn test_no_bindings_is_a_noop() {
        let store = Arc::new(MemoryRecordStore::new());
        let checker =
            GroupLivenessChecker::new(store, Arc::new(DeadGroups(HashSet::new())));
        assert_eq!(checker.verify_all().await.unwrap(), 0);
    }
}

//! Notification dispatcher — delivers queued reports to their one or two
//! targets and records the outcome.

use chrono::Utc;
use fieldbell_core::error::Result;
use fieldbell_core::traits::{MessagingGateway, RecordStore};
use fieldbell_core::types::OperatorRecord;
use std::sync::Arc;

/// What one `run_once` pass did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    /// Records marked sent this pass.
    pub sent: usize,
    /// Records whose every attempted target failed; retried next pass.
    pub failed: usize,
    /// Records with no usable target (no telegram_id).
    pub skipped: usize,
    /// Group bindings cleared because the bot lost the group.
    pub groups_healed: usize,
}

/// Fetches pending records, resolves targets, sends, records outcome.
pub struct NotificationDispatcher {
    store: Arc<dyn RecordStore>,
    gateway: Arc<dyn MessagingGateway>,
}

impl NotificationDispatcher {
    pub fn new(store: Arc<dyn RecordStore>, gateway: Arc<dyn MessagingGateway>) -> Self {
        Self { store, gateway }
    }

    /// Cheap count-only check, exposed to the status command.
    pub async fn pending_count(&self) -> Result<u64> {
        self.store.pending_count().await
    }

    /// Process every pending record once. Records are independent: any
    /// error is contained to its record and the loop continues.
    pub async fn run_once(&self) -> Result<DispatchReport> {
        let pending = self.store.pending_messages().await?;
        if pending.is_empty() {
            return Ok(DispatchReport::default());
        }

        tracing::info!("🔔 Processing {} pending report(s)", pending.len());
        let mut report = DispatchReport::default();

        for record in pending {
            match self.deliver_record(&record, &mut report).await {
                Ok(()) => {}
                Err(e) => {
                    // Store trouble on this record only; the rest of the
                    // batch still runs.
                    tracing::error!(
                        "❌ Dispatch aborted for record {} ({}): {e}",
                        record.id,
                        record.user_name
                    );
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    /// Deliver one record to its personal and/or group target.
    async fn deliver_record(
        &self,
        record: &OperatorRecord,
        report: &mut DispatchReport,
    ) -> Result<()> {
        let Some(body) = record.message_body.as_deref() else {
            return Ok(());
        };

        // A record with no bound chat cannot go anywhere. Data-quality
        // issue on the seeded row, not a dispatcher bug; it stays pending.
        if record.telegram_id.is_none() {
            tracing::warn!(
                "⚠️ No telegram_id bound for {} — report stays queued",
                record.user_name
            );
            report.skipped += 1;
            return Ok(());
        }

        let mut delivered = false;

        if let Some(chat_id) = record.telegram_id {
            let text = personal_report(&record.user_name, body);
            match self.gateway.send_message(chat_id, &text).await {
                Ok(()) => {
                    delivered = true;
                }
                Err(e) => {
                    tracing::warn!(
                        "❌ Personal delivery to {} ({chat_id}) failed: {e}",
                        record.user_name
                    );
                }
            }
        }

        if let Some(group_id) = record.group_id {
            match self.gateway.send_message(group_id, body).await {
                Ok(()) => {
                    delivered = true;
                }
                Err(e) if e.is_chat_gone() => {
                    // The bot lost this group: heal the binding right here
                    // instead of waiting for the next liveness sweep.
                    tracing::warn!(
                        "🧹 Group {group_id} unreachable — clearing stale binding"
                    );
                    let cleared = self.store.clear_group_everywhere(group_id).await?;
                    report.groups_healed += cleared as usize;
                }
                Err(e) => {
                    tracing::warn!("❌ Group delivery to {group_id} failed: {e}");
                }
            }
        }

        if delivered {
            let sent_at = Utc::now();
            self.store.mark_sent(record.id, sent_at).await?;
            tracing::info!(
                "✅ Report delivered for {} at {}",
                record.user_name,
                sent_at.to_rfc3339()
            );
            report.sent += 1;
        } else {
            // Both attempted targets failed; is_sent stays false and the
            // record is retried on a later pass.
            report.failed += 1;
        }
        Ok(())
    }
}

/// Wrap a report body for personal delivery.
fn personal_report(user_name: &str, body: &str) -> String {
    format!("📋 Report for {user_name}\n\n{body}\n\n— sent automatically by fieldbell")
}

use super::AgentManager;
use aiden_proto::AgentStatus;
use aiden_store::AgentSessionPatch;
use std::collections::HashSet;

pub(crate) const HOST_RESTARTED: &str = "Host restarted before the session finished";

impl AgentManager {
    /// Mark persisted records that still look in-flight, but have no live
    /// session in this process, as failed. Returns how many were updated.
    pub async fn reconcile_records(&self) -> usize {
        let active = match self.records.active() {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(error = %e, "failed to load active agent session records");
                return 0;
            }
        };

        let owned: HashSet<String> = self
            .sessions
            .read()
            .await
            .values()
            .filter_map(|e| e.info.record_id.clone())
            .collect();

        let now = chrono::Utc::now();
        let mut reconciled = 0;
        for record in active.into_iter().filter(|r| !owned.contains(&r.id)) {
            let patch = AgentSessionPatch {
                status: Some(AgentStatus::Failed),
                error: Some(HOST_RESTARTED.to_string()),
                completed_at: Some(now),
                ..Default::default()
            };
            match self.records.update(&record.id, patch) {
                Ok(()) => reconciled += 1,
                Err(e) => {
                    tracing::warn!(record_id = %record.id, error = %e, "failed to reconcile agent session record")
                }
            }
        }

        if reconciled > 0 {
            tracing::info!(count = reconciled, "marked orphaned agent sessions failed");
        }
        reconciled
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AgentId, AgentKind, AgentStatus};

/// A registered agent persona plus its cumulative performance counters.
///
/// Profiles are created once at startup from the fixed default set and
/// mutated after every completed task; they are never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentProfile {
    pub id: AgentId,
    pub kind: AgentKind,
    pub name: String,
    pub description: String,
    pub status: AgentStatus,
    pub capabilities: Vec<String>,
    pub tasks_completed: u64,
    pub tasks_failed: u64,
    pub success_rate: f64,
    pub avg_response_time_secs: f64,
    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
}

impl AgentProfile {
    pub fn new(
        kind: AgentKind,
        name: impl Into<String>,
        description: impl Into<String>,
        capabilities: Vec<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: AgentId::new_v4(),
            kind,
            name: name.into(),
            description: description.into(),
            status: AgentStatus::Idle,
            capabilities,
            tasks_completed: 0,
            tasks_failed: 0,
            success_rate: 0.0,
            avg_response_time_secs: 0.0,
            created_at: now,
            last_active_at: now,
        }
    }

    pub fn total_tasks(&self) -> u64 {
        self.tasks_completed + self.tasks_failed
    }

    /// Fold one finished task into the running counters.
    ///
    /// Average response time only tracks successful tasks; failures count
    /// toward the success rate but not the timing.
    pub fn record_outcome(&mut self, success: bool, elapsed_secs: f64) {
        if success {
            let completed = self.tasks_completed as f64;
            self.avg_response_time_secs =
                (self.avg_response_time_secs * completed + elapsed_secs) / (completed + 1.0);
            self.tasks_completed += 1;
        } else {
            self.tasks_failed += 1;
        }
        self.success_rate = self.tasks_completed as f64 / self.total_tasks() as f64;
        self.last_active_at = Utc::now();
    }
}

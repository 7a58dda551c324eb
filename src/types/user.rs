use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::UserId;

/// Platform user. Persisted for accounting; not exposed over the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub is_active: bool,
    pub tasks_created: u64,
    pub documents_uploaded: u64,
    pub workflows_created: u64,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

impl User {
    pub fn new(username: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: UserId::new_v4(),
            username: username.into(),
            email: email.into(),
            is_active: true,
            tasks_created: 0,
            documents_uploaded: 0,
            workflows_created: 0,
            created_at: Utc::now(),
            last_login: None,
        }
    }
}

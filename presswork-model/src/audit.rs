use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One audit trail entry. The web UI writes these; the engine only reads
/// them, so there is no constructor here.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuditLog {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub actor: String,
    pub ip: String,
    pub action: String,
    pub message: String,
}

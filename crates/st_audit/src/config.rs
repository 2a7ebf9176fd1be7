use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Caller-facing knobs for one engine instance.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuditConfig {
    /// Schema (PostgreSQL) or database (MySQL) holding the audited tables.
    /// `None` uses the connection's default.
    #[serde(default)]
    pub schema: Option<String>,
    /// Actor tag attached to operational events (a username or client IP).
    #[serde(default)]
    pub actor: Option<String>,
    #[serde(default)]
    pub batch: BatchPolicy,
}

/// Pacing for batch setup: a few tables run concurrently, then a pause
/// before the next slice. Concurrent DDL against one schema races in the
/// catalog on some engines; the pause keeps trigger creation spread out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchPolicy {
    pub batch_size: usize,
    pub batch_delay_ms: u64,
}

impl Default for BatchPolicy {
    fn default() -> Self {
        Self {
            batch_size: 3,
            batch_delay_ms: 500,
        }
    }
}

impl BatchPolicy {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }

    /// At least one table per batch, whatever the config file says.
    pub fn effective_batch_size(&self) -> usize {
        self.batch_size.max(1)
    }
}

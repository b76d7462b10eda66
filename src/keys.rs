//! In-memory API key pool for a provider.
//!
//! Every pick takes the key with the fewest uses, breaking ties by the oldest
//! last use (never-used keys first), then records the use.

use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};

use crate::error::{GatewayError, Result};

#[derive(Clone)]
struct KeyEntry {
    secret: String,
    usage_count: u64,
    last_used: Option<DateTime<Utc>>,
}

/// Usage snapshot of one key, in configuration order. The secret is not exposed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyStats {
    pub usage_count: u64,
    pub last_used: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct KeyPool {
    provider: String,
    entries: Arc<Mutex<Vec<KeyEntry>>>,
}

impl KeyPool {
    pub fn new(provider: impl Into<String>, keys: impl IntoIterator<Item = String>) -> Self {
        let entries = keys
            .into_iter()
            .filter(|k| !k.is_empty())
            .map(|secret| KeyEntry {
                secret,
                usage_count: 0,
                last_used: None,
            })
            .collect();

        Self {
            provider: provider.into(),
            entries: Arc::new(Mutex::new(entries)),
        }
    }

    /// Pick the least recently used key and record the use.
    pub fn next_key(&self) -> Result<String> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| GatewayError::other("Key pool lock poisoned"))?;

        let entry = entries
            .iter_mut()
            .min_by_key(|e| (e.usage_count, e.last_used))
            .ok_or_else(|| {
                GatewayError::config(format!(
                    "No available API keys for provider {}",
                    self.provider
                ))
            })?;

        entry.usage_count += 1;
        entry.last_used = Some(Utc::now());
        Ok(entry.secret.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> Vec<KeyStats> {
        self.entries
            .lock()
            .map(|entries| {
                entries
                    .iter()
                    .map(|e| KeyStats {
                        usage_count: e.usage_count,
                        last_used: e.last_used,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl std::fmt::Debug for KeyPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPool")
            .field("provider", &self.provider)
            .field("keys", &self.len())
            .finish()
    }
}

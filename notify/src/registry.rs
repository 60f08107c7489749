use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, info};

/// Push tokens of everyone who should hear about doorbell activity.
///
/// In-memory only; the set is empty again after a restart.
#[derive(Default)]
pub struct SubscriberRegistry {
    tokens: Mutex<HashSet<String>>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a token. Returns false if it was already registered.
    pub fn register(&self, token: &str) -> bool {
        let added = self.lock().insert(token.to_string());
        if added {
            info!(token = short(token), "subscriber registered");
        } else {
            debug!(token = short(token), "subscriber already registered");
        }
        added
    }

    /// Drop a token. Returns false if it was not registered.
    pub fn remove(&self, token: &str) -> bool {
        let removed = self.lock().remove(token);
        if removed {
            info!(token = short(token), "subscriber removed");
        }
        removed
    }

    /// Copy of the current tokens, unaffected by later register/remove calls.
    pub fn snapshot(&self) -> Vec<String> {
        self.lock().iter().cloned().collect()
    }

    pub fn contains(&self, token: &str) -> bool {
        self.lock().contains(token)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        // The set is valid after any panic mid-operation, so poisoning is ignored.
        self.tokens.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Token prefix for log lines.
pub fn short(token: &str) -> &str {
    match token.char_indices().nth(20) {
        Some((idx, _)) => &token[..idx],
        None => token,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_is_idempotent() {
        let registry = SubscriberRegistry::new();
        assert!(registry.register("tok-a"));
        assert!(!registry.register("tok-a"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn remove_is_idempotent() {
        let registry = SubscriberRegistry::new();
        registry.register("tok-a");
        assert!(registry.remove("tok-a"));
        assert!(!registry.remove("tok-a"));
        assert!(registry.is_empty());
    }

    #[test]
    fn snapshot_is_detached_from_later_mutation() {
        let registry = SubscriberRegistry::new();
        registry.register("tok-a");
        registry.register("tok-b");

        let mut snapshot = registry.snapshot();
        registry.remove("tok-a");
        registry.register("tok-c");

        snapshot.sort();
        assert_eq!(snapshot, vec!["tok-a", "tok-b"]);
        assert!(!registry.contains("tok-a"));
        assert!(registry.contains("tok-c"));
    }

    #[test]
    fn short_truncates_long_tokens() {
        let token = "x".repeat(64);
        assert_eq!(short(&token).len(), 20);
        assert_eq!(short("abc"), "abc");
    }
}

//! Allow-list access gate.
//!
//! Membership is purely existence-based: a user is allowed if and only if
//! their allow-list key is present in the store, whatever the stored value.
//! The gate must run before any session or completion work; denial is a
//! defined no-op outcome, not an error.

use crate::keys::KeySpace;
use crate::storage::KeyValueStore;
use anyhow::Result;
use std::sync::Arc;

pub struct AccessGate {
    store: Arc<dyn KeyValueStore>,
    keyspace: KeySpace,
}

impl AccessGate {
    pub fn new(store: Arc<dyn KeyValueStore>, keyspace: KeySpace) -> Self {
        Self { store, keyspace }
    }

    pub async fn is_allowed(&self, user_id: i64) -> Result<bool> {
        self.store.exists(&self.keyspace.allowlist(user_id)).await
    }

    /// Add a user. The record is presence-only and never expires.
    pub async fn allow(&self, user_id: i64) -> Result<()> {
        self.store
            .set(&self.keyspace.allowlist(user_id), "", None)
            .await?;
        tracing::info!("[AccessGate] Allowed user {}", user_id);
        Ok(())
    }

    /// Remove a user. Deletion is best-effort per the store contract.
    pub async fn revoke(&self, user_id: i64) -> Result<()> {
        self.store
            .delete(&self.keyspace.allowlist(user_id))
            .await?;
        tracing::info!("[AccessGate] Revoked user {}", user_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStore;

    fn gate_with_store() -> (AccessGate, Arc<dyn KeyValueStore>) {
        let store: Arc<dyn KeyValueStore> = Arc::new(InMemoryStore::new());
        let gate = AccessGate::new(store.clone(), KeySpace::new("monty"));
        (gate, store)
    }

    #[tokio::test]
    async fn unknown_user_is_denied() {
        let (gate, _store) = gate_with_store();
        assert!(!gate.is_allowed(42).await.unwrap());
    }

    #[tokio::test]
    async fn allow_then_revoke_round_trip() {
        let (gate, _store) = gate_with_store();

        gate.allow(42).await.unwrap();
        assert!(gate.is_allowed(42).await.unwrap());
        assert!(!gate.is_allowed(43).await.unwrap());

        gate.revoke(42).await.unwrap();
        assert!(!gate.is_allowed(42).await.unwrap());
    }

    #[tokio::test]
    async fn membership_ignores_the_stored_value() {
        let (gate, store) = gate_with_store();
        store.set("monty.42", "anything at all", None).await.unwrap();

        assert!(gate.is_allowed(42).await.unwrap());
    }
}

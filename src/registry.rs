//! The tunnel registry: the shared map from label to the SSH session that
//! should service HTTP requests for it.
//!
//! A label always maps to at most one live session. Registration is last
//! writer wins — a second `tcpip-forward` for the same label silently
//! replaces whoever held it, matching a developer reconnecting and simply
//! taking their label back. Removal is identity-guarded: a session may only
//! delete the entry it itself installed, so a stale session's teardown can
//! never evict a different session that has since taken the same label.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use russh::server::Handle;
use tokio::sync::RwLock;

static NEXT_OWNER_TOKEN: AtomicU64 = AtomicU64::new(1);

/// A process-wide unique token minted once per SSH handler. Used only to
/// decide whether a removal request is allowed to proceed, never exposed
/// outside this module.
pub fn next_owner_token() -> u64 {
    NEXT_OWNER_TOKEN.fetch_add(1, Ordering::Relaxed)
}

/// Everything the HTTP front end needs to route a request to one tunnel
/// owner, plus enough provenance to explain routing decisions in logs.
#[derive(Clone)]
pub struct TunnelDescriptor {
    pub label: String,
    pub handle: Handle,
    pub peer_addr: Option<SocketAddr>,
    pub user: String,
    pub fingerprint: String,
    owner_token: u64,
}

impl TunnelDescriptor {
    pub fn new(
        label: String,
        handle: Handle,
        peer_addr: Option<SocketAddr>,
        user: String,
        fingerprint: String,
        owner_token: u64,
    ) -> Self {
        Self {
            label,
            handle,
            peer_addr,
            user,
            fingerprint,
            owner_token,
        }
    }
}

#[derive(Default)]
pub struct TunnelRegistry {
    tunnels: RwLock<HashMap<String, TunnelDescriptor>>,
}

impl TunnelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the entry for `label`. Never fails: a duplicate
    /// label is not an error, it is a handoff.
    pub async fn add(&self, label: String, descriptor: TunnelDescriptor) {
        let mut tunnels = self.tunnels.write().await;
        if let Some(previous) = tunnels.insert(label.clone(), descriptor) {
            log::info!(
                "label '{}' reassigned from user '{}' to a new session",
                label,
                previous.user
            );
        }
    }

    pub async fn get(&self, label: &str) -> Option<TunnelDescriptor> {
        self.tunnels.read().await.get(label).cloned()
    }

    /// Remove `label` unconditionally. Idempotent: removing an absent label
    /// is not an error.
    pub async fn del(&self, label: &str) {
        self.tunnels.write().await.remove(label);
    }

    /// Remove `label` only if the entry currently installed there was
    /// registered by `owner_token`. A mismatch means the label has already
    /// been taken over by a different session, and that session's entry
    /// must survive this call.
    pub async fn remove_if_owned(&self, label: &str, owner_token: u64) {
        let mut tunnels = self.tunnels.write().await;
        if let Some(current) = tunnels.get(label) {
            if current.owner_token == owner_token {
                tunnels.remove(label);
            }
        }
    }
}

pub type SharedRegistry = Arc<TunnelRegistry>;

#[cfg(test)]
mod tests {
    use super::*;

    // TunnelDescriptor needs a real russh::server::Handle, which can only be
    // constructed from a live session, so these tests exercise the registry's
    // bookkeeping logic (token allocation, guarded removal) without ever
    // building a descriptor.

    #[test]
    fn owner_tokens_are_unique() {
        let a = next_owner_token();
        let b = next_owner_token();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn del_on_missing_label_is_not_an_error() {
        let registry = TunnelRegistry::new();
        registry.del("nothing-here").await;
    }

    #[tokio::test]
    async fn remove_if_owned_on_missing_label_is_a_no_op() {
        let registry = TunnelRegistry::new();
        registry.remove_if_owned("nothing-here", next_owner_token()).await;
        assert!(registry.get("nothing-here").await.is_none());
    }
}

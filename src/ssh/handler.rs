//! SSH handler for a single connection.
//!
//! One `SshHandler` is created per accepted TCP connection (see
//! `TunnelServer::new_client`). It authenticates the client against the
//! authorized-keys table, falling back to an anonymous session if the
//! presented key (or lack of one at all) doesn't resolve, and tracks the one
//! `tcpip-forward` label this session currently owns so it can be released
//! again on `cancel-tcpip-forward` or when the connection drops.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, info, warn};
use russh::keys::PublicKey;
use russh::server::{Auth, Handler, Session};
use russh_keys::HashAlg;

use crate::authorized_keys::AuthorizedKeys;
use crate::error::TunnelError;
use crate::registry::{next_owner_token, TunnelDescriptor, TunnelRegistry};

const ANONYMOUS: &str = "anonymous";

/// Handler for a single SSH connection.
pub struct SshHandler {
    registry: Arc<TunnelRegistry>,
    authorized_keys: Arc<AuthorizedKeys>,
    peer_addr: Option<SocketAddr>,
    user: String,
    fingerprint: String,
    /// The label registered by this session's most recent `tcpip-forward`,
    /// if any. Empty until the first successful forward request.
    label: String,
    /// Unique per handler; guards `cancel-tcpip-forward` and teardown
    /// removal against evicting a different session that has since taken
    /// over this label.
    owner_token: u64,
}

impl SshHandler {
    pub fn new(
        registry: Arc<TunnelRegistry>,
        authorized_keys: Arc<AuthorizedKeys>,
        peer_addr: Option<SocketAddr>,
    ) -> Self {
        Self {
            registry,
            authorized_keys,
            peer_addr,
            user: ANONYMOUS.to_string(),
            fingerprint: String::new(),
            label: String::new(),
            owner_token: next_owner_token(),
        }
    }
}

#[async_trait]
impl Handler for SshHandler {
    type Error = TunnelError;

    async fn auth_publickey(
        &mut self,
        _user: &str,
        public_key: &PublicKey,
    ) -> Result<Auth, Self::Error> {
        let fingerprint = public_key.fingerprint(HashAlg::Sha256).to_string();

        match self.authorized_keys.resolve(&fingerprint) {
            Some(principal) => {
                info!(
                    "public key auth: fingerprint '{}' resolved to '{}'",
                    fingerprint, principal
                );
                self.user = principal.to_string();
            }
            None => {
                warn!(
                    "public key auth: fingerprint '{}' not in authorized-keys table, continuing as anonymous",
                    fingerprint
                );
                self.user = ANONYMOUS.to_string();
            }
        }
        self.fingerprint = fingerprint;

        // A key that doesn't resolve isn't rejected outright: the session
        // continues as anonymous rather than failing the connection.
        Ok(Auth::Accept)
    }

    async fn tcpip_forward(
        &mut self,
        address: &str,
        _port: &mut u32,
        session: &mut Session,
    ) -> Result<bool, Self::Error> {
        let label = address.to_string();
        info!(
            "tcpip-forward: label='{}' user='{}' peer={:?}",
            label, self.user, self.peer_addr
        );

        let descriptor = TunnelDescriptor::new(
            label.clone(),
            session.handle(),
            self.peer_addr,
            self.user.clone(),
            self.fingerprint.clone(),
            self.owner_token,
        );
        self.registry.add(label.clone(), descriptor).await;
        self.label = label;

        Ok(true)
    }

    async fn cancel_tcpip_forward(
        &mut self,
        address: &str,
        _port: u32,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        if self.label == address {
            info!("cancel-tcpip-forward: releasing label '{}'", address);
            self.registry.remove_if_owned(&self.label, self.owner_token).await;
            self.label.clear();
        } else {
            debug!(
                "cancel-tcpip-forward for '{}' does not match this session's label '{}'",
                address, self.label
            );
        }

        Ok(true)
    }
}

impl Drop for SshHandler {
    fn drop(&mut self) {
        if self.label.is_empty() {
            return;
        }

        // Drop can't be async; hand the guarded removal off to a detached
        // task the way a server naturally winds down the rest of a closed
        // session's state.
        let registry = self.registry.clone();
        let label = std::mem::take(&mut self.label);
        let owner_token = self.owner_token;
        tokio::spawn(async move {
            registry.remove_if_owned(&label, owner_token).await;
            debug!("session teardown released label '{}'", label);
        });
    }
}

//! SSH server implementation.

use std::net::SocketAddr;
use std::sync::Arc;

use log::{error, info};
use russh::server::{Handler, Server};

use super::SshHandler;
use crate::authorized_keys::AuthorizedKeys;
use crate::registry::TunnelRegistry;

/// The main SSH server that creates handlers for each connection.
#[derive(Clone)]
pub struct TunnelServer {
    registry: Arc<TunnelRegistry>,
    authorized_keys: Arc<AuthorizedKeys>,
}

impl TunnelServer {
    pub fn new(registry: Arc<TunnelRegistry>, authorized_keys: Arc<AuthorizedKeys>) -> Self {
        Self {
            registry,
            authorized_keys,
        }
    }
}

impl Server for TunnelServer {
    type Handler = SshHandler;

    fn new_client(&mut self, peer_addr: Option<SocketAddr>) -> Self::Handler {
        info!("New SSH connection from {:?}", peer_addr);
        SshHandler::new(self.registry.clone(), self.authorized_keys.clone(), peer_addr)
    }

    fn handle_session_error(&mut self, error: <Self::Handler as Handler>::Error) {
        error!("Session error: {:?}", error);
    }
}

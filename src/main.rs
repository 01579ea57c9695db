//! Tunnel broker entry point.
//!
//! Starts two independent front ends behind one shared registry:
//! - an SSH server (port 2222 by default) that authenticates tunnel owners
//!   and records their `tcpip-forward` label;
//! - an HTTP server (port 3000 by default) that routes public requests to
//!   whichever session currently owns the label in the request's Host
//!   header.
//!
//! ```bash
//! ssh -o StrictHostKeyChecking=no -R foo:80:localhost:3000 -p 2222 anyone@localhost
//! curl -H "Host: foo.localhost:3000" http://localhost:3000/
//! ```

use std::sync::Arc;
use std::time::Duration;

use log::{error, info};
use russh::server::Server as _;
use socket2::SockRef;
use tokio::net::TcpListener;

use tunnelbroker::authorized_keys::AuthorizedKeys;
use tunnelbroker::key::load_host_key;
use tunnelbroker::proxy::run_http_front_end;
use tunnelbroker::registry::TunnelRegistry;
use tunnelbroker::ssh::TunnelServer;
use tunnelbroker::{config, TunnelError};

#[tokio::main]
async fn main() {
    // A missing .env file is the common case (config comes from the real
    // environment instead) and is not worth logging.
    let _ = dotenvy::dotenv();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run().await {
        error!("fatal: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), TunnelError> {
    config::init();
    let cfg = config::get();

    info!("starting tunnel broker");

    let host_key = load_host_key(&cfg.host_key_path)?;
    let authorized_keys = Arc::new(AuthorizedKeys::load(&cfg.authorized_keys_path));
    let registry = Arc::new(TunnelRegistry::new());

    let ssh_config = Arc::new(russh::server::Config {
        methods: russh::MethodSet::PUBLICKEY,
        keys: vec![host_key],
        inactivity_timeout: Some(Duration::from_secs(1800)),
        auth_rejection_time: Duration::from_secs(3),
        auth_rejection_time_initial: Some(Duration::from_secs(0)),
        ..Default::default()
    });

    let ssh_addr = cfg.ssh_addr.clone();
    let http_addr = cfg.http_addr.clone();

    let ssh_task = tokio::spawn(run_ssh_front_end(
        ssh_addr,
        ssh_config,
        registry.clone(),
        authorized_keys,
    ));
    let http_task = tokio::spawn(run_http_front_end(http_addr, registry));

    tokio::select! {
        result = ssh_task => propagate("SSH front end", result).await,
        result = http_task => propagate("HTTP front end", result).await,
    }
}

async fn propagate(
    name: &str,
    result: Result<Result<(), TunnelError>, tokio::task::JoinError>,
) -> Result<(), TunnelError> {
    match result {
        Ok(inner) => inner,
        Err(join_err) => {
            error!("{} task panicked: {}", name, join_err);
            Err(TunnelError::Io(std::io::Error::other(join_err.to_string())))
        }
    }
}

/// Custom accept loop (rather than `Server::run_on_address`) so keep-alive
/// can be tuned on each socket before the SSH handshake begins.
async fn run_ssh_front_end(
    addr: String,
    config: Arc<russh::server::Config>,
    registry: Arc<TunnelRegistry>,
    authorized_keys: Arc<AuthorizedKeys>,
) -> Result<(), TunnelError> {
    let listener = TcpListener::bind(&addr).await?;
    info!("SSH front end listening on {}", addr);

    let mut server = TunnelServer::new(registry, authorized_keys);

    loop {
        let (stream, peer_addr) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                error!("SSH accept error: {}", e);
                continue;
            }
        };

        if let Err(e) = SockRef::from(&stream).set_keepalive(true) {
            error!("failed to set keep-alive for {}: {}", peer_addr, e);
        }

        let handler = server.new_client(Some(peer_addr));
        let config = config.clone();

        tokio::spawn(async move {
            if let Err(e) = russh::server::run_stream(config, stream, handler).await {
                error!("SSH session with {} ended with error: {:?}", peer_addr, e);
            }
        });
    }
}

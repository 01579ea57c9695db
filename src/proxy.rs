//! The HTTP front end: accepts public HTTP connections, resolves the
//! subdomain label from the Host header, and relays the request to the
//! owning SSH session over a fresh `forwarded-tcpip` channel.
//!
//! Each inbound request gets its own channel and its own one-shot HTTP/1.1
//! client handshake over that channel — there is no connection pooling to
//! the tunnel owner's local service, mirroring the one-channel-per-exchange
//! model the SSH side hands out.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::{HeaderName, HeaderValue, HOST};
use hyper::server::conn::http1 as server_http1;
use hyper::service::service_fn;
use hyper::{HeaderMap, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use log::{debug, error, info, warn};
use tokio::net::TcpListener;

use crate::error::TunnelError;
use crate::registry::TunnelRegistry;
use crate::transport::ChannelTransport;

type ProxyBody = BoxBody<Bytes, hyper::Error>;

/// Headers that describe only the hop between adjacent parties on the wire
/// and must never be forwarded as-is to the next hop.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
    "transfer-encoding",
    "upgrade",
];

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in HOP_BY_HOP {
        headers.remove(*name);
    }
}

fn full_body(s: impl Into<Bytes>) -> ProxyBody {
    Full::new(s.into()).map_err(|never| match never {}).boxed()
}

fn plain_response(status: StatusCode, message: impl Into<Bytes>) -> Response<ProxyBody> {
    Response::builder()
        .status(status)
        .header("content-type", "text/plain")
        .body(full_body(message))
        .expect("static response is always well-formed")
}

/// The label a request routes by: the Host header with any `:port` suffix
/// and anything after the first `.` stripped. `foo.example.com`,
/// `foo.localhost:3000`, and bare `foo` all yield `foo`; a host with no
/// label segment (`.example.com`) yields an empty string, which never
/// matches a registered tunnel.
pub fn extract_label(host: &str) -> String {
    let without_port = host.split(':').next().unwrap_or("");
    without_port.split('.').next().unwrap_or("").to_string()
}

/// Fold a new hop's address into an `X-Forwarded-For` chain, combining any
/// inbound occurrences of the header (there may be more than one) before
/// appending the caller.
fn append_x_forwarded_for(headers: &mut HeaderMap, caller_ip: &str) {
    let existing: Vec<String> = headers
        .get_all("x-forwarded-for")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(str::to_string)
        .collect();
    headers.remove("x-forwarded-for");

    let chain = if existing.is_empty() {
        caller_ip.to_string()
    } else {
        format!("{}, {}", existing.join(", "), caller_ip)
    };

    if let Ok(value) = HeaderValue::from_str(&chain) {
        headers.insert(HeaderName::from_static("x-forwarded-for"), value);
    }
}

async fn handle(
    req: Request<Incoming>,
    registry: Arc<TunnelRegistry>,
    caller_addr: SocketAddr,
) -> Result<Response<ProxyBody>, Infallible> {
    let host = req
        .headers()
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    let label = extract_label(&host);

    let descriptor = match registry.get(&label).await {
        Some(d) => d,
        None => {
            let err = TunnelError::TunnelNotFound(label.clone());
            debug!("{}", err);
            return Ok(plain_response(StatusCode::NOT_FOUND, format!("{}\n", err)));
        }
    };

    // The channel-open payload's origin fields describe the owning SSH
    // session's own remote address, not the public HTTP caller's — the Go
    // original marshals `ServerConn.RemoteAddr()` here with no access to a
    // per-HTTP-request address at all.
    let remote_addr = descriptor
        .peer_addr
        .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 0)));
    let origin_addr = remote_addr.ip().to_string();
    let origin_port = u32::from(remote_addr.port());

    let channel = match descriptor
        .handle
        .channel_open_forwarded_tcpip(&label, 80, &origin_addr, origin_port)
        .await
    {
        Ok(channel) => channel,
        Err(e) => {
            let err = TunnelError::ChannelOpenFailed(label.clone(), e.to_string());
            error!("{}", err);
            return Ok(plain_response(
                StatusCode::BAD_GATEWAY,
                format!("tunnel '{}' is unreachable\n", label),
            ));
        }
    };

    let io = TokioIo::new(ChannelTransport::new(channel, remote_addr));

    let (mut sender, connection) = match hyper::client::conn::http1::handshake(io).await {
        Ok(pair) => pair,
        Err(e) => {
            error!("HTTP handshake with tunnel '{}' failed: {}", label, e);
            return Ok(plain_response(
                StatusCode::BAD_GATEWAY,
                "failed to negotiate HTTP with tunnel\n",
            ));
        }
    };

    let conn_label = label.clone();
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            debug!("tunnel connection for '{}' ended: {}", conn_label, e);
        }
    });

    let (mut parts, body) = req.into_parts();
    parts.headers.remove(HOST);
    if let Ok(value) = HeaderValue::from_str(&crate::config::get().upstream_host) {
        parts.headers.insert(HOST, value);
    }
    strip_hop_by_hop(&mut parts.headers);
    append_x_forwarded_for(&mut parts.headers, &caller_addr.ip().to_string());
    let outbound = Request::from_parts(parts, body);

    let timeout = Duration::from_secs(crate::config::get().upstream_timeout_secs);
    let response = match tokio::time::timeout(timeout, sender.send_request(outbound)).await {
        Ok(Ok(response)) => response,
        Ok(Err(e)) => {
            error!("request to tunnel '{}' failed: {}", label, e);
            return Ok(plain_response(StatusCode::BAD_GATEWAY, "upstream request failed\n"));
        }
        Err(_) => {
            warn!("request to tunnel '{}' timed out", label);
            return Ok(plain_response(StatusCode::GATEWAY_TIMEOUT, "upstream timed out\n"));
        }
    };

    let (mut resp_parts, resp_body) = response.into_parts();
    strip_hop_by_hop(&mut resp_parts.headers);
    Ok(Response::from_parts(resp_parts, resp_body.boxed()))
}

/// Run the HTTP front end's accept loop until `listener` fails. Each
/// connection, and each request within it, is handled independently; a
/// single bad request never brings down the listener.
pub async fn run_http_front_end(addr: String, registry: Arc<TunnelRegistry>) -> Result<(), TunnelError> {
    let listener = TcpListener::bind(&addr).await?;
    info!("HTTP front end listening on {}", addr);

    loop {
        let (stream, peer_addr) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                warn!("HTTP accept error: {}", e);
                continue;
            }
        };

        let registry = registry.clone();
        let io = TokioIo::new(stream);

        tokio::spawn(async move {
            let service = service_fn(move |req| handle(req, registry.clone(), peer_addr));
            if let Err(e) = server_http1::Builder::new().serve_connection(io, service).await {
                debug!("HTTP connection from {} ended: {}", peer_addr, e);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_label_from_subdomain_host() {
        assert_eq!(extract_label("foo.example.com"), "foo");
    }

    #[test]
    fn extracts_label_ignoring_port() {
        assert_eq!(extract_label("foo.localhost:3000"), "foo");
    }

    #[test]
    fn bare_host_is_its_own_label() {
        assert_eq!(extract_label("foo"), "foo");
    }

    #[test]
    fn bare_host_with_port_strips_port() {
        assert_eq!(extract_label("foo:3000"), "foo");
    }

    #[test]
    fn host_with_no_label_segment_is_empty() {
        assert_eq!(extract_label(".example.com"), "");
    }

    #[test]
    fn x_forwarded_for_is_set_when_absent() {
        let mut headers = HeaderMap::new();
        append_x_forwarded_for(&mut headers, "203.0.113.7");
        assert_eq!(headers.get("x-forwarded-for").unwrap(), "203.0.113.7");
    }

    #[test]
    fn x_forwarded_for_chains_onto_existing_value() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("10.0.0.1"));
        append_x_forwarded_for(&mut headers, "203.0.113.7");
        assert_eq!(headers.get("x-forwarded-for").unwrap(), "10.0.0.1, 203.0.113.7");
    }

    #[test]
    fn hop_by_hop_headers_are_stripped() {
        let mut headers = HeaderMap::new();
        headers.insert("connection", HeaderValue::from_static("keep-alive"));
        headers.insert("transfer-encoding", HeaderValue::from_static("chunked"));
        headers.insert("x-custom", HeaderValue::from_static("keep-me"));
        strip_hop_by_hop(&mut headers);
        assert!(headers.get("connection").is_none());
        assert!(headers.get("transfer-encoding").is_none());
        assert_eq!(headers.get("x-custom").unwrap(), "keep-me");
    }
}

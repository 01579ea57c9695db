//! Adapts a single SSH channel into a byte stream usable as the transport
//! for exactly one HTTP/1.1 exchange.
//!
//! `russh::Channel::into_stream()` already hands back a `ChannelStream` that
//! implements `AsyncRead`/`AsyncWrite`; this wrapper only adds the remote
//! address bookkeeping the HTTP front end wants to log and to hand to
//! `hyper_util::rt::TokioIo`.

use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};

use russh::{Channel, ChannelStream};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

pub struct ChannelTransport {
    stream: ChannelStream<russh::server::Msg>,
    remote_addr: SocketAddr,
}

impl ChannelTransport {
    pub fn new(channel: Channel<russh::server::Msg>, remote_addr: SocketAddr) -> Self {
        Self {
            stream: channel.into_stream(),
            remote_addr,
        }
    }

    /// The owning SSH session's remote address, not the HTTP caller's.
    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }
}

impl AsyncRead for ChannelTransport {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.stream).poll_read(cx, buf)
    }
}

impl AsyncWrite for ChannelTransport {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        Pin::new(&mut self.stream).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.stream).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.stream).poll_shutdown(cx)
    }
}

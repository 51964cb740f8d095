// Copyright (C) 2022-2025 Michael Herstine <sp1ff@pobox.com>
//
// This file is part of otel-gelf-exporter.
//
// otel-gelf-exporter is free software: you can redistribute it and/or modify it under the terms of
// the GNU General Public License as published by the Free Software Foundation, either version 3 of
// the License, or (at your option) any later version.
//
// mpdpopm is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even
// the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General
// Public License for more details.
//
// You should have received a copy of the GNU General Public License along with mpdpopm.  If not,
// see <http://www.gnu.org/licenses/>.

//! The GELF transport layer.
//!
//! This module defines the [`Transport`] trait that all implementations must support, as well as
//! the UDP & TCP implementations. Neither knows anything about TLS: encrypted TCP is carried by
//! pointing a [`TcpTransport`] at a local [`TlsGateway`].
//!
//! [`TlsGateway`]: crate::gateway::TlsGateway
//!
//! # Framing
//!
//! GELF over UDP is one JSON document per datagram. GELF over TCP is a stream of JSON documents,
//! each terminated by a NUL byte.

use crate::error::{Error, Result};

use async_trait::async_trait;
use backtrace::Backtrace;
use tokio::{
    io::AsyncWriteExt,
    net::{TcpStream, ToSocketAddrs, UdpSocket},
};

use std::net::SocketAddr;

/// The largest payload that fits in a single UDP datagram (65535 - 20 byte IP header - 8 byte UDP
/// header).
pub const MAX_UDP_DATAGRAM: usize = 65507;

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                      transport mechanisms                                      //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Operations all transport layers must support.
#[async_trait]
pub trait Transport: Send {
    /// Send one serialized GELF message on this transport mechanism, adding whatever framing the
    /// transport requires. Returns the number of payload bytes sent.
    async fn send(&mut self, buf: &[u8]) -> Result<usize>;
}

/// Sending GELF messages via UDP datagrams.
pub struct UdpTransport {
    socket: UdpSocket,
}

impl UdpTransport {
    /// Construct a [`Transport`] implementation via UDP at `addr`.
    pub async fn new<A: ToSocketAddrs + std::fmt::Display>(addr: A) -> Result<UdpTransport> {
        let target = addr.to_string();
        let peer = tokio::net::lookup_host(addr)
            .await
            .ok()
            .and_then(|mut addrs| addrs.next())
            .ok_or_else(|| Error::Dial {
                addr: target.clone(),
                source: "address did not resolve".into(),
                back: Backtrace::new(),
            })?;
        // Bind to any available port on the matching wildcard address...
        let local = if peer.is_ipv4() {
            SocketAddr::from(([0u8; 4], 0))
        } else {
            SocketAddr::from(([0u16; 8], 0))
        };
        let socket = UdpSocket::bind(local).await.map_err(|err| Error::Dial {
            addr: target.clone(),
            source: Box::new(err),
            back: Backtrace::new(),
        })?;
        // and connect to the GELF input at `addr`:
        socket.connect(peer).await.map_err(|err| Error::Dial {
            addr: target,
            source: Box::new(err),
            back: Backtrace::new(),
        })?;
        Ok(UdpTransport { socket })
    }
}

#[async_trait]
impl Transport for UdpTransport {
    async fn send(&mut self, buf: &[u8]) -> Result<usize> {
        if buf.len() > MAX_UDP_DATAGRAM {
            return Err(Error::MessageTooLarge {
                size: buf.len(),
                max: MAX_UDP_DATAGRAM,
                back: Backtrace::new(),
            });
        }
        self.socket.send(buf).await.map_err(|err| Error::Write {
            source: Box::new(err),
            back: Backtrace::new(),
        })
    }
}

/// Sending GELF messages via TCP streams
pub struct TcpTransport {
    socket: TcpStream,
}

impl TcpTransport {
    /// Construct a [`Transport`] implementation via TCP at `addr`.
    pub async fn new<A: ToSocketAddrs + std::fmt::Display>(addr: A) -> Result<TcpTransport> {
        let target = addr.to_string();
        Ok(TcpTransport {
            socket: TcpStream::connect(addr).await.map_err(|err| Error::Dial {
                addr: target,
                source: Box::new(err),
                back: Backtrace::new(),
            })?,
        })
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn send(&mut self, buf: &[u8]) -> Result<usize> {
        let write = |err: std::io::Error| Error::Write {
            source: Box::new(err),
            back: Backtrace::new(),
        };
        self.socket.write_all(buf).await.map_err(write)?;
        self.socket.write_all(&[0]).await.map_err(write)?;
        self.socket.flush().await.map_err(write)?;
        Ok(buf.len())
    }
}

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

//! A local plaintext → remote TLS relay.
//!
//! [`TcpTransport`] speaks plain TCP only. To reach a TLS-protected GELF input, the exporter stands
//! up a [`TlsGateway`]: a listener on an ephemeral loopback port whose accepted connections are
//! relayed, byte for byte, over a single TLS connection to the real destination. The transport is
//! then simply pointed at [`TlsGateway::addr`].
//!
//! [`TcpTransport`]: crate::transport::TcpTransport
//!
//! Local connections are served one at a time, all against the same TLS connection. The gateway
//! adds no framing of its own.

use crate::error::{Error, Result};

use backtrace::Backtrace;
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    task::JoinHandle,
};
use tokio_native_tls::TlsStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use std::net::SocketAddr;

const RELAY_BUFFER_SIZE: usize = 16 * 1024;

/// One side of the gateway: a network (only "tcp" is supported) & an address on it
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GatewayEndpoint {
    pub network: String,
    pub address: String,
}

impl GatewayEndpoint {
    pub fn tcp<S: Into<String>>(address: S) -> GatewayEndpoint {
        GatewayEndpoint {
            network: "tcp".to_string(),
            address: address.into(),
        }
    }
}

/// How the gateway should establish its TLS session
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TlsSettings {
    /// Accept any certificate (& any hostname) the peer presents
    pub insecure_skip_verify: bool,
    /// Name to present via SNI & verify the certificate against; defaults to the host part of the
    /// remote address
    pub server_name: Option<String>,
}

/// Relays plaintext connections on a local listener to a remote TLS peer.
pub struct TlsGateway {
    remote: GatewayEndpoint,
    local_addr: SocketAddr,
    // Moved into the accept loop by `start()`
    listener: Option<TcpListener>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl TlsGateway {
    /// Bind `local`; the gateway will relay to `remote` once started.
    pub async fn bind(local: GatewayEndpoint, remote: GatewayEndpoint) -> Result<TlsGateway> {
        let bind_err = |source: Box<dyn std::error::Error + Send + Sync>| Error::Bind {
            addr: local.address.clone(),
            source,
            back: Backtrace::new(),
        };

        if local.network != "tcp" {
            return Err(bind_err(
                format!("unsupported network '{}'", local.network).into(),
            ));
        }
        let listener = TcpListener::bind(local.address.as_str())
            .await
            .map_err(|err| bind_err(Box::new(err)))?;
        let local_addr = listener
            .local_addr()
            .map_err(|err| bind_err(Box::new(err)))?;
        debug!("started local listener on {}", local_addr);

        Ok(TlsGateway {
            remote,
            local_addr,
            listener: Some(listener),
            cancel: CancellationToken::new(),
            task: None,
        })
    }

    /// The local (plaintext) address to which writers should connect
    pub fn addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn remote(&self) -> &GatewayEndpoint {
        &self.remote
    }

    /// True from a successful [`start`](TlsGateway::start) until the accept loop exits
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Dial the remote peer over TLS &, on success, start relaying in the background.
    pub async fn start(&mut self, tls: &TlsSettings) -> Result<()> {
        let dial_err = |source: Box<dyn std::error::Error + Send + Sync>| Error::Dial {
            addr: self.remote.address.clone(),
            source,
            back: Backtrace::new(),
        };

        if self.remote.network != "tcp" {
            return Err(dial_err(
                format!("unsupported network '{}'", self.remote.network).into(),
            ));
        }
        let listener = self
            .listener
            .take()
            .ok_or_else(|| dial_err("gateway already started or shut down".into()))?;

        let connector = native_tls::TlsConnector::builder()
            .danger_accept_invalid_certs(tls.insecure_skip_verify)
            .danger_accept_invalid_hostnames(tls.insecure_skip_verify)
            .build()
            .map_err(|err| dial_err(Box::new(err)))?;
        let connector = tokio_native_tls::TlsConnector::from(connector);

        let domain = match &tls.server_name {
            Some(name) => name.clone(),
            None => crate::resolver::endpoint_host(&self.remote.address).to_string(),
        };
        let tcp = TcpStream::connect(self.remote.address.as_str())
            .await
            .map_err(|err| dial_err(Box::new(err)))?;
        let conn = connector
            .connect(&domain, tcp)
            .await
            .map_err(|err| dial_err(Box::new(err)))?;
        debug!("TLS session established with {}", self.remote.address);

        self.task = Some(tokio::spawn(run(listener, conn, self.cancel.clone())));
        Ok(())
    }

    /// Stop accepting local connections & close the listener.
    ///
    /// The listener is closed at once, even mid-relay. The TLS connection is closed by the accept
    /// loop as it exits, which happens only after any relay in progress has finished.
    pub fn shutdown(&mut self) -> Result<()> {
        self.cancel.cancel();
        // Never started: the listener is still ours to close.
        self.listener.take();
        Ok(())
    }
}

impl Drop for TlsGateway {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run(listener: TcpListener, mut conn: TlsStream<TcpStream>, cancel: CancellationToken) {
    let mut listener = Some(listener);
    while let Some(accepting) = listener.take() {
        let (mut local, peer) = tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = accepting.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(err) => {
                    error!(error = %err, "failed to accept connection");
                    listener = Some(accepting);
                    continue;
                }
            },
        };

        debug!("relaying connection from {}", peer);
        let result = {
            let relay = forward(&mut local, &mut conn);
            tokio::pin!(relay);
            tokio::select! {
                result = &mut relay => {
                    listener = Some(accepting);
                    result
                }
                _ = cancel.cancelled() => {
                    // Stop accepting now; the relay in progress runs until the writer hangs up.
                    drop(accepting);
                    debug!("closed local listener; draining relay from {}", peer);
                    relay.await
                }
            }
        };
        if let Err(err) = result {
            warn!(error = %err, "relay from {} ended in error", peer);
        }
        if let Err(err) = local.shutdown().await {
            // The writer may well have hung up first.
            debug!(error = %err, "failed to close local connection");
        }
    }

    if let Err(err) = conn.shutdown().await {
        error!(error = %err, "failed to close TLS connection");
    }
}

/// Copy bytes from `src` to `dst` & from `dst` to `src` concurrently, until either side reaches
/// end-of-stream.
pub async fn forward<A, B>(src: &mut A, dst: &mut B) -> std::io::Result<()>
where
    A: AsyncRead + AsyncWrite + Unpin,
    B: AsyncRead + AsyncWrite + Unpin,
{
    let mut upstream = vec![0u8; RELAY_BUFFER_SIZE];
    let mut downstream = vec![0u8; RELAY_BUFFER_SIZE];
    loop {
        tokio::select! {
            n = src.read(&mut upstream) => {
                let n = n?;
                if n == 0 {
                    return Ok(());
                }
                if let Err(err) = dst.write_all(&upstream[..n]).await {
                    warn!(error = %err, "failed to write to destination");
                    return Err(err);
                }
                dst.flush().await?;
            }
            n = dst.read(&mut downstream) => {
                let n = n?;
                if n == 0 {
                    return Ok(());
                }
                if let Err(err) = src.write_all(&downstream[..n]).await {
                    warn!(error = %err, "failed receiving from destination");
                    return Err(err);
                }
                src.flush().await?;
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;

    use tokio::sync::mpsc;

    /// What a [`TlsPeer`] observed, tagged with a 1-based session number
    #[derive(Debug, PartialEq, Eq)]
    pub(crate) enum PeerEvent {
        Opened(usize),
        Data(usize, Vec<u8>),
        Closed(usize),
    }

    /// A TLS peer on loopback with a self-signed certificate for "localhost". It accepts any
    /// number of sessions & reports each one's traffic on `events`. Everything sent on `reply` is
    /// written back on the first session.
    pub(crate) struct TlsPeer {
        pub addr: SocketAddr,
        pub events: mpsc::UnboundedReceiver<PeerEvent>,
        pub reply: mpsc::UnboundedSender<Vec<u8>>,
        _handle: JoinHandle<()>,
    }

    impl TlsPeer {
        pub(crate) async fn start() -> TlsPeer {
            let certified =
                rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
            let identity = native_tls::Identity::from_pkcs8(
                certified.cert.pem().as_bytes(),
                certified.key_pair.serialize_pem().as_bytes(),
            )
            .unwrap();
            let acceptor = tokio_native_tls::TlsAcceptor::from(
                native_tls::TlsAcceptor::new(identity).unwrap(),
            );

            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            let (events_tx, events) = mpsc::unbounded_channel();
            let (reply, reply_rx) = mpsc::unbounded_channel::<Vec<u8>>();

            let handle = tokio::spawn(async move {
                let mut reply_rx = Some(reply_rx);
                let mut session = 0;
                while let Ok((stream, _)) = listener.accept().await {
                    // Clients that refuse our certificate abort the handshake.
                    let Ok(stream) = acceptor.accept(stream).await else {
                        continue;
                    };
                    session += 1;
                    let _ = events_tx.send(PeerEvent::Opened(session));
                    tokio::spawn(serve(stream, session, events_tx.clone(), reply_rx.take()));
                }
            });

            TlsPeer {
                addr,
                events,
                reply,
                _handle: handle,
            }
        }

        /// Collect exactly `len` bytes from the peer's receive side, whichever session they
        /// arrived on
        pub(crate) async fn read_exactly(&mut self, len: usize) -> Vec<u8> {
            let mut out = Vec::new();
            while out.len() < len {
                if let PeerEvent::Data(_, bytes) = self.events.recv().await.unwrap() {
                    out.extend(bytes);
                }
            }
            out
        }
    }

    async fn serve(
        mut stream: TlsStream<TcpStream>,
        session: usize,
        events: mpsc::UnboundedSender<PeerEvent>,
        mut reply: Option<mpsc::UnboundedReceiver<Vec<u8>>>,
    ) {
        let mut buf = vec![0u8; 4096];
        loop {
            tokio::select! {
                n = stream.read(&mut buf) => {
                    match n {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            let _ = events.send(PeerEvent::Data(session, buf[..n].to_vec()));
                        }
                    }
                }
                Some(bytes) = async { reply.as_mut()?.recv().await } => {
                    if stream.write_all(&bytes).await.is_err() || stream.flush().await.is_err() {
                        break;
                    }
                }
            }
        }
        let _ = events.send(PeerEvent::Closed(session));
    }

    fn insecure() -> TlsSettings {
        TlsSettings {
            insecure_skip_verify: true,
            server_name: None,
        }
    }

    #[tokio::test]
    async fn test_bidirectional_relay() {
        let mut peer = TlsPeer::start().await;

        let mut gateway = TlsGateway::bind(
            GatewayEndpoint::tcp("127.0.0.1:0"),
            GatewayEndpoint::tcp(peer.addr.to_string()),
        )
        .await
        .unwrap();
        gateway.start(&insecure()).await.unwrap();
        assert!(gateway.is_running());
        assert!(gateway.addr().ip().is_loopback());

        let mut local = TcpStream::connect(gateway.addr()).await.unwrap();

        local.write_all(b"first message\0").await.unwrap();
        assert_eq!(peer.read_exactly(14).await, b"first message\0");
        local.write_all(b"second\0").await.unwrap();
        assert_eq!(peer.read_exactly(7).await, b"second\0");

        let mut buf = [0u8; 5];
        peer.reply.send(b"hello".to_vec()).unwrap();
        local.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello");
        peer.reply.send(b"world".to_vec()).unwrap();
        local.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"world");

        gateway.shutdown().unwrap();
    }

    #[tokio::test]
    async fn test_sequential_local_connections() {
        let mut peer = TlsPeer::start().await;
        let mut gateway = TlsGateway::bind(
            GatewayEndpoint::tcp("127.0.0.1:0"),
            GatewayEndpoint::tcp(peer.addr.to_string()),
        )
        .await
        .unwrap();
        gateway.start(&insecure()).await.unwrap();

        {
            let mut local = TcpStream::connect(gateway.addr()).await.unwrap();
            local.write_all(b"one").await.unwrap();
            assert_eq!(peer.read_exactly(3).await, b"one");
        }
        // The first connection hung up; the next one shares the same TLS session.
        let mut local = TcpStream::connect(gateway.addr()).await.unwrap();
        local.write_all(b"two").await.unwrap();
        assert_eq!(peer.read_exactly(3).await, b"two");

        gateway.shutdown().unwrap();
    }

    #[tokio::test]
    async fn test_verification_rejects_self_signed() {
        let peer = TlsPeer::start().await;
        let mut gateway = TlsGateway::bind(
            GatewayEndpoint::tcp("127.0.0.1:0"),
            GatewayEndpoint::tcp(peer.addr.to_string()),
        )
        .await
        .unwrap();
        let strict = TlsSettings {
            insecure_skip_verify: false,
            server_name: Some("localhost".to_string()),
        };
        assert!(matches!(
            gateway.start(&strict).await,
            Err(Error::Dial { .. })
        ));
        assert!(!gateway.is_running());
    }

    #[tokio::test]
    async fn test_bind_errors() {
        assert!(matches!(
            TlsGateway::bind(
                GatewayEndpoint::tcp("not an address"),
                GatewayEndpoint::tcp("127.0.0.1:1"),
            )
            .await,
            Err(Error::Bind { .. })
        ));
        let udp = GatewayEndpoint {
            network: "udp".to_string(),
            address: "127.0.0.1:0".to_string(),
        };
        assert!(matches!(
            TlsGateway::bind(udp, GatewayEndpoint::tcp("127.0.0.1:1")).await,
            Err(Error::Bind { .. })
        ));
    }

    #[tokio::test]
    async fn test_dial_error() {
        let closed = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };
        let mut gateway = TlsGateway::bind(
            GatewayEndpoint::tcp("127.0.0.1:0"),
            GatewayEndpoint::tcp(closed.to_string()),
        )
        .await
        .unwrap();
        assert!(matches!(
            gateway.start(&insecure()).await,
            Err(Error::Dial { .. })
        ));
    }

    #[tokio::test]
    async fn test_shutdown_closes_listener() {
        let peer = TlsPeer::start().await;
        let mut gateway = TlsGateway::bind(
            GatewayEndpoint::tcp("127.0.0.1:0"),
            GatewayEndpoint::tcp(peer.addr.to_string()),
        )
        .await
        .unwrap();
        gateway.start(&insecure()).await.unwrap();
        let addr = gateway.addr();
        gateway.shutdown().unwrap();

        // Give the accept loop a chance to observe the cancellation.
        for _ in 0..100 {
            if !gateway.is_running() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert!(!gateway.is_running());
        assert!(TcpStream::connect(addr).await.is_err());
    }

    #[tokio::test]
    async fn test_shutdown_during_relay() {
        let mut peer = TlsPeer::start().await;
        let mut gateway = TlsGateway::bind(
            GatewayEndpoint::tcp("127.0.0.1:0"),
            GatewayEndpoint::tcp(peer.addr.to_string()),
        )
        .await
        .unwrap();
        gateway.start(&insecure()).await.unwrap();
        let addr = gateway.addr();

        let mut local = TcpStream::connect(addr).await.unwrap();
        local.write_all(b"before").await.unwrap();
        assert_eq!(peer.read_exactly(6).await, b"before");

        gateway.shutdown().unwrap();

        // The listener goes away even though a relay is still in progress...
        let mut refused = false;
        for _ in 0..100 {
            if TcpStream::connect(addr).await.is_err() {
                refused = true;
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert!(refused);

        // while the connection already being relayed keeps working...
        local.write_all(b"after").await.unwrap();
        assert_eq!(peer.read_exactly(5).await, b"after");
        assert!(gateway.is_running());

        // until the writer hangs up, at which point the TLS session is closed.
        drop(local);
        loop {
            if let PeerEvent::Closed(session) = peer.events.recv().await.unwrap() {
                assert_eq!(session, 1);
                break;
            }
        }
        for _ in 0..100 {
            if !gateway.is_running() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert!(!gateway.is_running());
    }
}

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

//! GELF writers & the connectors that build them.
//!
//! A [`GelfWriter`] pairs a [`Transport`] with whatever else must live exactly as long as it (for
//! TLS, the [`TlsGateway`] it is connected through). A [`Connector`] knows how to build a writer
//! for one resolved address; the exporter holds a connector & asks it for a fresh writer every
//! time it (re-)initializes.

use crate::{
    error::Result,
    gateway::{GatewayEndpoint, TlsGateway, TlsSettings},
    message::Message,
    transport::{TcpTransport, Transport, UdpTransport},
};

use async_trait::async_trait;
use tracing::{debug, error};

/// Serializes [`Message`]s onto a [`Transport`].
pub struct GelfWriter<T: Transport> {
    transport: T,
    gateway: Option<TlsGateway>,
}

impl<T: Transport> GelfWriter<T> {
    pub fn new(transport: T) -> GelfWriter<T> {
        GelfWriter {
            transport,
            gateway: None,
        }
    }
    /// A writer whose transport is connected through `gateway`; the gateway is shut down when the
    /// writer is retired.
    pub fn with_gateway(transport: T, gateway: TlsGateway) -> GelfWriter<T> {
        GelfWriter {
            transport,
            gateway: Some(gateway),
        }
    }
    pub fn transport(&self) -> &T {
        &self.transport
    }
    pub fn gateway(&self) -> Option<&TlsGateway> {
        self.gateway.as_ref()
    }
    /// Write one message; returns the number of payload bytes sent
    pub async fn write_message(&mut self, msg: &Message) -> Result<usize> {
        let buf = msg.to_json()?;
        self.transport.send(&buf).await
    }
    /// Release this writer's resources. The transport is simply dropped.
    pub fn retire(mut self) -> Result<()> {
        match self.gateway.take() {
            Some(mut gateway) => gateway.shutdown(),
            None => Ok(()),
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                           connectors                                           //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Builds a [`GelfWriter`] connected to a resolved address.
#[async_trait]
pub trait Connector: Send + Sync {
    type Transport: Transport;
    /// Connect to `resolved` (`ip[:port]`)
    async fn connect(&self, resolved: &str) -> Result<GelfWriter<Self::Transport>>;
    /// For logging
    fn name(&self) -> &'static str;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct UdpConnector;

#[async_trait]
impl Connector for UdpConnector {
    type Transport = UdpTransport;
    async fn connect(&self, resolved: &str) -> Result<GelfWriter<UdpTransport>> {
        Ok(GelfWriter::new(UdpTransport::new(resolved).await?))
    }
    fn name(&self) -> &'static str {
        "udp"
    }
}

/// Connects over TCP; when `tls` is set, through a freshly-started [`TlsGateway`]
#[derive(Clone, Debug, Default)]
pub struct TcpConnector {
    tls: Option<TlsSettings>,
}

impl TcpConnector {
    pub fn plain() -> TcpConnector {
        TcpConnector { tls: None }
    }
    pub fn tls(settings: TlsSettings) -> TcpConnector {
        TcpConnector {
            tls: Some(settings),
        }
    }
    pub fn tls_settings(&self) -> Option<&TlsSettings> {
        self.tls.as_ref()
    }
}

#[async_trait]
impl Connector for TcpConnector {
    type Transport = TcpTransport;
    async fn connect(&self, resolved: &str) -> Result<GelfWriter<TcpTransport>> {
        let settings = match &self.tls {
            Some(settings) => settings,
            None => return Ok(GelfWriter::new(TcpTransport::new(resolved).await?)),
        };

        let mut gateway = TlsGateway::bind(
            GatewayEndpoint::tcp("127.0.0.1:0"),
            GatewayEndpoint::tcp(resolved),
        )
        .await?;
        if let Err(err) = gateway.start(settings).await {
            // Close the listener; the gateway never got going.
            if let Err(err) = gateway.shutdown() {
                error!(error = %err, "failed to shut down TLS gateway");
            }
            return Err(err);
        }
        debug!("TLS gateway for {} listening on {}", resolved, gateway.addr());

        match TcpTransport::new(gateway.addr()).await {
            Ok(transport) => Ok(GelfWriter::with_gateway(transport, gateway)),
            Err(err) => {
                if let Err(err) = gateway.shutdown() {
                    error!(error = %err, "failed to shut down TLS gateway");
                }
                Err(err)
            }
        }
    }
    fn name(&self) -> &'static str {
        if self.tls.is_some() {
            "tcp+tls"
        } else {
            "tcp"
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use crate::{error::Error, gateway::test::TlsPeer};

    use tokio::{
        io::AsyncReadExt,
        net::{TcpListener, UdpSocket},
    };

    fn sample() -> Message {
        let mut msg = Message::default();
        msg.set_host("worker-7");
        msg.set_short_message("disk full");
        msg.update_extra_fields([("path", "/var")]);
        msg
    }

    #[tokio::test]
    async fn udp_writer() {
        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = receiver.local_addr().unwrap().to_string();

        let mut writer = UdpConnector.connect(&addr).await.unwrap();
        let sent = writer.write_message(&sample()).await.unwrap();

        let mut buf = vec![0u8; 4096];
        let (len, _) = receiver.recv_from(&mut buf).await.unwrap();
        assert_eq!(len, sent);
        let json: serde_json::Value = serde_json::from_slice(&buf[..len]).unwrap();
        assert_eq!(json["short_message"], "disk full");
        assert_eq!(json["_path"], "/var");
        writer.retire().unwrap();
    }

    #[tokio::test]
    async fn tcp_writer() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let connector = TcpConnector::plain();
        assert_eq!(connector.name(), "tcp");
        let mut writer = connector.connect(&addr).await.unwrap();
        assert!(writer.gateway().is_none());
        let (mut server, _) = listener.accept().await.unwrap();

        writer.write_message(&sample()).await.unwrap();
        writer.retire().unwrap();

        let mut received = Vec::new();
        server.read_to_end(&mut received).await.unwrap();
        assert_eq!(received.last(), Some(&0u8));
        let json: serde_json::Value =
            serde_json::from_slice(&received[..received.len() - 1]).unwrap();
        assert_eq!(json["host"], "worker-7");
    }

    #[tokio::test]
    async fn tls_writer() {
        let mut peer = TlsPeer::start().await;
        let connector = TcpConnector::tls(TlsSettings {
            insecure_skip_verify: true,
            server_name: Some("localhost".to_string()),
        });
        assert_eq!(connector.name(), "tcp+tls");

        let mut writer = connector.connect(&peer.addr.to_string()).await.unwrap();
        assert!(writer.gateway().is_some_and(|g| g.is_running()));
        let sent = writer.write_message(&sample()).await.unwrap();

        let received = peer.read_exactly(sent + 1).await;
        assert_eq!(received[sent], 0);
        let json: serde_json::Value = serde_json::from_slice(&received[..sent]).unwrap();
        assert_eq!(json["short_message"], "disk full");
        writer.retire().unwrap();
    }

    #[tokio::test]
    async fn tls_writer_verification_failure() {
        let peer = TlsPeer::start().await;
        let connector = TcpConnector::tls(TlsSettings::default());
        assert!(matches!(
            connector.connect(&peer.addr.to_string()).await,
            Err(Error::Dial { .. })
        ));
    }
}

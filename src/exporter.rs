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

//! The exporter proper.
//!
//! [`Exporter`] owns exactly one [`GelfWriter`] at a time, guarded by a single lock that is held for
//! the whole of [`start`](Exporter::start), [`export`](Exporter::export) &
//! [`shutdown`](Exporter::shutdown). Whenever the writer is (re-)initialized, the replacement is
//! fully connected before the old one is retired, so that at no point is there no usable writer.
//!
//! The same type serves UDP, TCP and TCP+TLS; the differences live in the [`Connector`].

use crate::{
    config::{ExporterConfig, RefreshStrategy, TcpExporterConfig},
    converter::{convert_resource_logs, log_record_count},
    error::{Error, Result},
    gateway::TlsSettings,
    resolver::{endpoint_host, resolve_endpoint, EndpointState, Lookup, SystemLookup},
    retry::init_with_retries,
    writer::{Connector, GelfWriter, TcpConnector, UdpConnector},
};

use backtrace::Backtrace;
use opentelemetry_proto::tonic::logs::v1::{LogsData, ResourceLogs};
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use std::sync::Arc;

/// Where the exporter's writer is in its lifecycle
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriterState {
    Uninitialized,
    Initializing,
    Ready,
    Refreshing,
    /// The last (re-)initialization exhausted its retries. If that was a refresh, the previous
    /// writer is still in place.
    Failed,
}

impl std::fmt::Display for WriterState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                WriterState::Uninitialized => "uninitialized",
                WriterState::Initializing => "initializing",
                WriterState::Ready => "ready",
                WriterState::Refreshing => "refreshing",
                WriterState::Failed => "failed",
            }
        )
    }
}

struct Inner<C: Connector> {
    state: WriterState,
    writer: Option<GelfWriter<C::Transport>>,
    endpoint: EndpointState,
}

/// Converts OpenTelemetry logs to GELF & ships them to a single (re-resolvable) endpoint.
pub struct Exporter<C: Connector> {
    config: ExporterConfig,
    connector: C,
    lookup: Arc<dyn Lookup>,
    inner: Mutex<Inner<C>>,
}

impl Exporter<UdpConnector> {
    /// GELF over UDP
    pub fn udp(config: ExporterConfig) -> Result<Exporter<UdpConnector>> {
        Exporter::new(config, UdpConnector)
    }
}

impl Exporter<TcpConnector> {
    /// GELF over TCP, tunneled through TLS unless `endpoint_tls.enabled` is false
    pub fn tcp(config: TcpExporterConfig) -> Result<Exporter<TcpConnector>> {
        config.validate()?;
        let connector = if config.endpoint_tls.enabled {
            // The writer dials a resolved IP; verify against the configured name, not that.
            let server_name = config
                .endpoint_tls
                .server_name
                .clone()
                .unwrap_or_else(|| endpoint_host(&config.exporter.endpoint).to_string());
            TcpConnector::tls(TlsSettings {
                insecure_skip_verify: config.endpoint_tls.insecure_skip_verify,
                server_name: Some(server_name),
            })
        } else {
            TcpConnector::plain()
        };
        Exporter::new(config.exporter, connector)
    }
}

impl<C: Connector> Exporter<C> {
    pub fn new(config: ExporterConfig, connector: C) -> Result<Exporter<C>> {
        config.validate()?;
        let endpoint = EndpointState::new(config.endpoint.clone());
        Ok(Exporter {
            config,
            connector,
            lookup: Arc::new(SystemLookup),
            inner: Mutex::new(Inner {
                state: WriterState::Uninitialized,
                writer: None,
                endpoint,
            }),
        })
    }

    /// Resolve endpoint names with `lookup` instead of the system resolver
    pub fn with_lookup(mut self, lookup: Arc<dyn Lookup>) -> Exporter<C> {
        self.lookup = lookup;
        self
    }

    pub fn config(&self) -> &ExporterConfig {
        &self.config
    }

    pub async fn state(&self) -> WriterState {
        self.inner.lock().await.state
    }

    /// The address the current writer is connected to, if any
    pub async fn resolved_endpoint(&self) -> Option<String> {
        self.inner
            .lock()
            .await
            .endpoint
            .resolved()
            .map(String::from)
    }

    async fn connect_once(&self) -> Result<(String, GelfWriter<C::Transport>)> {
        let resolved = resolve_endpoint(self.lookup.as_ref(), &self.config.endpoint)
            .await
            .map_err(|err| {
                error!(endpoint = %self.config.endpoint, error = %err, "failed to resolve endpoint");
                err
            })?;
        debug!(endpoint = %self.config.endpoint, resolved = %resolved, "resolved endpoint");
        let writer = self.connector.connect(&resolved).await.map_err(|err| {
            error!(endpoint = %resolved, error = %err, "failed to connect {} writer", self.connector.name());
            err
        })?;
        info!(endpoint = %resolved, "initialized {} GELF writer", self.connector.name());
        Ok((resolved, writer))
    }

    /// Build a new writer (with retries) & swap it in. On failure, any existing writer is left in
    /// place & the state is [`WriterState::Failed`].
    async fn initialize(&self, inner: &mut Inner<C>, state: WriterState) -> bool {
        inner.state = state;
        match init_with_retries(
            || self.connect_once(),
            self.config.endpoint_init_retries,
            self.config.init_backoff(),
        )
        .await
        {
            Some((resolved, writer)) => {
                inner
                    .endpoint
                    .record(resolved, chrono::Utc::now().timestamp());
                if let Some(old) = inner.writer.replace(writer) {
                    match old.retire() {
                        Ok(()) => debug!("retired previous GELF writer"),
                        Err(err) => error!(error = %err, "failed to shut down previous writer"),
                    }
                }
                inner.state = WriterState::Ready;
                true
            }
            None => {
                inner.state = WriterState::Failed;
                false
            }
        }
    }

    async fn refresh(&self, inner: &mut Inner<C>) -> Result<()> {
        if self.initialize(inner, WriterState::Refreshing).await {
            Ok(())
        } else {
            Err(Error::Refresh {
                strategy: self.config.endpoint_refresh_strategy.to_string(),
                back: Backtrace::new(),
            })
        }
    }

    /// Resolve the endpoint & initialize the writer, retrying per configuration.
    pub async fn start(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if self.initialize(&mut inner, WriterState::Initializing).await {
            info!(endpoint = %self.config.endpoint, "started GELF exporter");
            Ok(())
        } else {
            Err(Error::Start {
                retries: self.config.endpoint_init_retries,
                back: Backtrace::new(),
            })
        }
    }

    /// Convert & write one batch.
    ///
    /// Messages that fail to write are logged & skipped. A failed refresh abandons the rest of the
    /// batch & is returned.
    pub async fn export(&self, resource_logs: &[ResourceLogs]) -> Result<()> {
        info!(
            resource_logs = resource_logs.len(),
            log_records = log_record_count(resource_logs),
            "exporting batch"
        );

        let mut inner = self.inner.lock().await;
        if inner.writer.is_none() {
            return Err(Error::NotStarted {
                back: Backtrace::new(),
            });
        }

        let strategy = self.config.endpoint_refresh_strategy;
        if strategy == RefreshStrategy::Interval
            && inner.endpoint.is_stale(
                chrono::Utc::now().timestamp(),
                self.config.endpoint_refresh_interval,
            )
        {
            debug!(
                "endpoint last resolved at {}; refreshing",
                inner.endpoint.last_resolved()
            );
            self.refresh(&mut inner).await?;
        }

        for msg in convert_resource_logs(resource_logs) {
            if strategy == RefreshStrategy::PerMessage {
                debug!("refreshing endpoint before message");
                self.refresh(&mut inner).await?;
            }
            let writer = match inner.writer.as_mut() {
                Some(writer) => writer,
                None => {
                    return Err(Error::NotStarted {
                        back: Backtrace::new(),
                    })
                }
            };
            if let Err(err) = writer.write_message(&msg).await {
                error!(error = %err, "failed to write GELF message");
            }
        }
        Ok(())
    }

    pub async fn export_logs_data(&self, logs: &LogsData) -> Result<()> {
        self.export(&logs.resource_logs).await
    }

    /// Retire the writer; the exporter may be started again afterward.
    pub async fn shutdown(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.state = WriterState::Uninitialized;
        match inner.writer.take() {
            Some(writer) => writer.retire(),
            None => Ok(()),
        }
    }
}

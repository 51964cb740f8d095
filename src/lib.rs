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
//! Export [OpenTelemetry] log records to a [Graylog] input as [GELF] messages, over UDP, TCP or
//! TCP tunneled through TLS
//!
//! [OpenTelemetry]: https://opentelemetry.io/docs/specs/otel/logs/data-model/
//! [Graylog]: https://graylog.org/
//! [GELF]: https://go2docs.graylog.org/current/getting_in_log_data/gelf.html
//!
//! # Introduction
//!
//! An OpenTelemetry collector receives log records as a tree: [`ResourceLogs`] (the thing doing
//! the logging: a host, a service) containing [`ScopeLogs`] (the instrumentation library that
//! emitted them) containing the [`LogRecord`]s themselves. Each level carries its own attributes.
//! GELF, on the other hand, is flat: a handful of well-known fields (`host`, `short_message`,
//! `level` & so on) plus arbitrarily many "additional" fields whose names begin with an underscore.
//!
//! [`ResourceLogs`]: opentelemetry_proto::tonic::logs::v1::ResourceLogs
//! [`ScopeLogs`]: opentelemetry_proto::tonic::logs::v1::ScopeLogs
//! [`LogRecord`]: opentelemetry_proto::tonic::logs::v1::LogRecord
//!
//! This crate does three things:
//!
//! 1. flattens each record, together with its scope & resource, into a GELF [`Message`]
//!    (see [`converter`]); scope & resource attributes are namespaced as `scope.*` & `resource.*`
//!    so they can't collide with the record's own attributes
//!
//! 2. keeps a writer pointed at the configured endpoint, re-resolving it on a configurable
//!    schedule so that DNS changes (or round-robin DNS in front of a Graylog cluster) are picked up
//!    (see [`exporter`] & [`config::RefreshStrategy`])
//!
//! 3. for TLS, runs a small local relay, the [`TlsGateway`], so that the plain TCP transport can
//!    carry encrypted traffic unmodified
//!
//! [`Message`]: message::Message
//! [`TlsGateway`]: gateway::TlsGateway
//!
//! Configuration loading, batching & the rest of the collector plumbing belong to the host
//! application.
//!
//! # Usage
//!
//! ```no_run
//! use otel_gelf_exporter::{config::ExporterConfig, exporter::Exporter};
//! use opentelemetry_proto::tonic::logs::v1::ResourceLogs;
//!
//! # async fn f(batch: Vec<ResourceLogs>) -> otel_gelf_exporter::error::Result<()> {
//! // GELF over UDP to a Graylog input on port 12201
//! let exporter = Exporter::udp(ExporterConfig::new("graylog.internal:12201"))?;
//! exporter.start().await?;
//! exporter.export(&batch).await?;
//! # Ok(())
//! # }
//! ```
//!
//! TCP is encrypted by default; the certificate is verified against the configured host name:
//!
//! ```no_run
//! use otel_gelf_exporter::{
//!     config::{ExporterConfig, RefreshStrategy, TcpExporterConfig},
//!     exporter::Exporter,
//! };
//!
//! # async fn f() -> otel_gelf_exporter::error::Result<()> {
//! let mut config = TcpExporterConfig::default();
//! config.exporter = ExporterConfig::new("graylog.internal:12201");
//! // Re-resolve graylog.internal at most once a minute
//! config.exporter.endpoint_refresh_strategy = RefreshStrategy::Interval;
//! let exporter = Exporter::tcp(config)?;
//! exporter.start().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod converter;
pub mod error;
pub mod exporter;
pub mod gateway;
pub mod level;
pub mod message;
pub mod resolver;
pub mod retry;
pub mod transport;
pub mod writer;

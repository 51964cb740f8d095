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

//! Endpoint resolution.
//!
//! The configured endpoint may name a host by DNS. The exporter pins its writer to one concrete
//! address at a time, & re-resolves on its refresh schedule so that DNS changes (or round-robin
//! DNS in front of a Graylog cluster) are picked up.

use crate::error::{Error, Result};

use async_trait::async_trait;
use backtrace::Backtrace;

use std::net::IpAddr;

/// Name-to-address lookup.
///
/// The exporter only ever uses [`SystemLookup`]; the trait exists so that resolution can be
/// exercised without a DNS server.
#[async_trait]
pub trait Lookup: Send + Sync {
    async fn lookup_ip(&self, host: &str) -> std::io::Result<Vec<IpAddr>>;
}

/// Resolve names with the operating system's resolver
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemLookup;

#[async_trait]
impl Lookup for SystemLookup {
    async fn lookup_ip(&self, host: &str) -> std::io::Result<Vec<IpAddr>> {
        Ok(tokio::net::lookup_host((host, 0))
            .await?
            .map(|addr| addr.ip())
            .collect())
    }
}

/// Split `endpoint` into host & optional port. Bracketed IPv6 literals (`[::1]:12201`) are
/// supported; a bare IPv6 literal is ambiguous & rejected.
fn split_host_port(endpoint: &str) -> Result<(&str, Option<&str>)> {
    let bad = || Error::Resolution {
        endpoint: endpoint.to_string(),
        source: Some(format!("malformed endpoint '{}'", endpoint).into()),
        back: Backtrace::new(),
    };

    if !endpoint.contains(':') {
        return Ok((endpoint, None));
    }

    let (host, port) = if let Some(rest) = endpoint.strip_prefix('[') {
        let (host, port) = rest.split_once("]:").ok_or_else(bad)?;
        (host, port)
    } else {
        let (host, port) = endpoint.rsplit_once(':').ok_or_else(bad)?;
        if host.contains(':') {
            return Err(bad());
        }
        (host, port)
    };
    if host.is_empty() {
        return Err(bad());
    }
    Ok((host, Some(port)))
}

/// Resolve `endpoint` (`host[:port]`) to `ip[:port]`.
///
/// The first address the lookup returns wins; the port, if any, is carried over unchanged.
pub async fn resolve_endpoint(lookup: &dyn Lookup, endpoint: &str) -> Result<String> {
    let (host, port) = split_host_port(endpoint)?;

    let ips = lookup
        .lookup_ip(host)
        .await
        .map_err(|err| Error::Resolution {
            endpoint: endpoint.to_string(),
            source: Some(Box::new(err)),
            back: Backtrace::new(),
        })?;

    let ip = ips.first().ok_or_else(|| Error::Resolution {
        endpoint: endpoint.to_string(),
        source: None,
        back: Backtrace::new(),
    })?;

    Ok(match (ip, port) {
        (IpAddr::V6(ip), Some(port)) => format!("[{}]:{}", ip, port),
        (ip, Some(port)) => format!("{}:{}", ip, port),
        (ip, None) => ip.to_string(),
    })
}

/// The host part of `endpoint`, brackets stripped.
pub fn endpoint_host(endpoint: &str) -> &str {
    split_host_port(endpoint)
        .map(|(host, _)| host)
        .unwrap_or(endpoint)
}

/// What the exporter knows about its endpoint
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EndpointState {
    configured: String,
    resolved: Option<String>,
    /// Unix seconds at which `resolved` was last set
    last_resolved: i64,
}

impl EndpointState {
    pub fn new<S: Into<String>>(configured: S) -> EndpointState {
        EndpointState {
            configured: configured.into(),
            resolved: None,
            last_resolved: 0,
        }
    }
    pub fn configured(&self) -> &str {
        &self.configured
    }
    pub fn resolved(&self) -> Option<&str> {
        self.resolved.as_deref()
    }
    pub fn last_resolved(&self) -> i64 {
        self.last_resolved
    }
    /// Record a fresh resolution made at `now` (Unix seconds)
    pub fn record<S: Into<String>>(&mut self, resolved: S, now: i64) {
        self.resolved = Some(resolved.into());
        self.last_resolved = now;
    }
    /// True once more than `interval` seconds have passed since the last resolution
    pub fn is_stale(&self, now: i64, interval: u64) -> bool {
        now.saturating_sub(self.last_resolved) > i64::try_from(interval).unwrap_or(i64::MAX)
    }
}

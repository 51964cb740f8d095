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

//! Exporter configuration.
//!
//! The host is responsible for loading these structures (they implement [`serde::Deserialize`],
//! with every field defaulted); this module only defines them & validates them.

use crate::error::{Error, Result};

use serde::Deserialize;

use std::time::Duration;

pub const DEFAULT_ENDPOINT_INIT_BACKOFF: u64 = 10;
pub const DEFAULT_ENDPOINT_INIT_RETRIES: u32 = 5;
pub const DEFAULT_ENDPOINT_REFRESH_INTERVAL: u64 = 60;

/// How often the exporter re-resolves its endpoint & rebuilds its writer.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum RefreshStrategy {
    /// Resolve once, at start
    #[default]
    None,
    /// Re-resolve before a batch once the last resolution is older than the refresh interval
    Interval,
    /// Re-resolve before every single message (round-robin DNS load balancing)
    PerMessage,
}

impl std::fmt::Display for RefreshStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                RefreshStrategy::None => "none",
                RefreshStrategy::Interval => "interval",
                RefreshStrategy::PerMessage => "perMessage",
            }
        )
    }
}

impl std::str::FromStr for RefreshStrategy {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "none" => Ok(RefreshStrategy::None),
            "interval" => Ok(RefreshStrategy::Interval),
            "perMessage" => Ok(RefreshStrategy::PerMessage),
            _ => Err(Error::config("invalid endpoint refresh strategy")),
        }
    }
}

impl std::convert::TryFrom<String> for RefreshStrategy {
    type Error = Error;
    fn try_from(x: String) -> Result<Self> {
        x.parse()
    }
}

/// Settings common to the UDP & TCP exporters
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ExporterConfig {
    /// Address of the GELF input, as `host[:port]`; `host` may be a DNS name
    pub endpoint: String,
    /// Delay, in seconds, between attempts to initialize the writer
    pub endpoint_init_backoff: u64,
    /// Number of attempts made to initialize the writer
    pub endpoint_init_retries: u32,
    /// Seconds between endpoint refreshes; only consulted by [`RefreshStrategy::Interval`]
    pub endpoint_refresh_interval: u64,
    pub endpoint_refresh_strategy: RefreshStrategy,
}

impl std::default::Default for ExporterConfig {
    fn default() -> Self {
        ExporterConfig {
            endpoint: String::new(),
            endpoint_init_backoff: DEFAULT_ENDPOINT_INIT_BACKOFF,
            endpoint_init_retries: DEFAULT_ENDPOINT_INIT_RETRIES,
            endpoint_refresh_interval: DEFAULT_ENDPOINT_REFRESH_INTERVAL,
            endpoint_refresh_strategy: RefreshStrategy::None,
        }
    }
}

impl ExporterConfig {
    pub fn new<S: Into<String>>(endpoint: S) -> ExporterConfig {
        ExporterConfig {
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.endpoint.is_empty() {
            return Err(Error::config("GELF input endpoint must be specified"));
        }
        if self.endpoint_init_retries == 0 {
            return Err(Error::config("endpoint init retries must be at least 1"));
        }
        Ok(())
    }

    pub fn init_backoff(&self) -> Duration {
        Duration::from_secs(self.endpoint_init_backoff)
    }
}

/// TLS settings for the TCP exporter
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EndpointTls {
    pub enabled: bool,
    /// Accept any certificate the peer presents. For testing only.
    pub insecure_skip_verify: bool,
    /// Name to verify the peer certificate against; defaults to the host part of the endpoint
    pub server_name: Option<String>,
}

impl std::default::Default for EndpointTls {
    fn default() -> Self {
        EndpointTls {
            enabled: true,
            insecure_skip_verify: false,
            server_name: None,
        }
    }
}

/// Configuration for the TCP exporter: the common settings plus TLS
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TcpExporterConfig {
    #[serde(flatten)]
    pub exporter: ExporterConfig,
    pub endpoint_tls: EndpointTls,
}

impl TcpExporterConfig {
    pub fn validate(&self) -> Result<()> {
        self.exporter.validate()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = ExporterConfig::default();
        assert_eq!(cfg.endpoint_init_backoff, 10);
        assert_eq!(cfg.endpoint_init_retries, 5);
        assert_eq!(cfg.endpoint_refresh_interval, 60);
        assert_eq!(cfg.endpoint_refresh_strategy, RefreshStrategy::None);
        assert!(TcpExporterConfig::default().endpoint_tls.enabled);
    }

    #[test]
    fn loading() {
        let cfg: ExporterConfig = serde_json::from_str(
            r#"{"endpoint": "localhost:12201", "endpoint_refresh_strategy": "perMessage"}"#,
        )
        .unwrap();
        assert_eq!(cfg.endpoint, "localhost:12201");
        assert_eq!(cfg.endpoint_refresh_interval, 60);
        assert_eq!(cfg.endpoint_refresh_strategy, RefreshStrategy::PerMessage);
        assert!(cfg.validate().is_ok());

        let cfg: ExporterConfig = serde_json::from_str(
            r#"{"endpoint": "localhost:12201", "endpoint_refresh_strategy": "interval",
                "endpoint_refresh_interval": 15}"#,
        )
        .unwrap();
        assert_eq!(cfg.endpoint_refresh_interval, 15);
        assert_eq!(cfg.endpoint_refresh_strategy, RefreshStrategy::Interval);

        let cfg: TcpExporterConfig = serde_json::from_str(
            r#"{"endpoint": "localhost:12201",
                "endpoint_tls": {"insecure_skip_verify": true}}"#,
        )
        .unwrap();
        assert_eq!(cfg.exporter.endpoint, "localhost:12201");
        assert!(cfg.endpoint_tls.enabled);
        assert!(cfg.endpoint_tls.insecure_skip_verify);

        let cfg: TcpExporterConfig = serde_json::from_str(
            r#"{"endpoint": "localhost:12201", "endpoint_tls": {"enabled": false}}"#,
        )
        .unwrap();
        assert!(!cfg.endpoint_tls.enabled);
    }

    #[test]
    fn validation() {
        assert_eq!(
            format!("{}", ExporterConfig::default().validate().unwrap_err()),
            "GELF input endpoint must be specified"
        );

        let err = serde_json::from_str::<ExporterConfig>(
            r#"{"endpoint": "localhost:12201", "endpoint_refresh_strategy": "perChunk"}"#,
        )
        .unwrap_err();
        assert!(format!("{}", err).contains("invalid endpoint refresh strategy"));
        assert!("invalid".parse::<RefreshStrategy>().is_err());

        let mut cfg = ExporterConfig::new("localhost:12201");
        assert!(cfg.validate().is_ok());
        cfg.endpoint_init_retries = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn strategy_names() {
        for s in [
            RefreshStrategy::None,
            RefreshStrategy::Interval,
            RefreshStrategy::PerMessage,
        ] {
            assert_eq!(format!("{}", s).parse::<RefreshStrategy>().unwrap(), s);
        }
    }
}

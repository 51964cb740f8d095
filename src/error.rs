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

//! [otel-gelf-exporter](crate) errors

use backtrace::Backtrace;

/// [otel-gelf-exporter](crate) error type
///
/// This crate eschews libraries like [thiserror] & [anyhow] in favor of a straightforward
/// enumeration, with match arms chosen on the basis of what the caller will need to do in
/// response: fix its configuration, retry initialization, skip a message, or fail the batch.
///
/// [thiserror]: https://docs.rs/thiserror
/// [anyhow]: https://docs.rs/anyhow
#[non_exhaustive]
pub enum Error {
    /// The exporter configuration was rejected
    Config { reason: String, back: Backtrace },
    /// The configured endpoint could not be resolved to an IP address
    Resolution {
        endpoint: String,
        source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
        back: Backtrace,
    },
    /// The TLS gateway could not bind its local listener
    Bind {
        addr: String,
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
        back: Backtrace,
    },
    /// Connecting to the remote peer failed (including the TLS handshake)
    Dial {
        addr: String,
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
        back: Backtrace,
    },
    /// A GELF message could not be serialized
    Encode {
        source: serde_json::Error,
        back: Backtrace,
    },
    /// A single message was too large to be sent on this transport
    MessageTooLarge {
        size: usize,
        max: usize,
        back: Backtrace,
    },
    /// Writing to the wire failed
    Write {
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
        back: Backtrace,
    },
    /// `export()` was called on an exporter whose writer was never initialized
    NotStarted { back: Backtrace },
    /// The writer could not be initialized within the configured number of retries
    Start { retries: u32, back: Backtrace },
    /// A refresh-triggered re-initialization failed; the batch was abandoned
    Refresh { strategy: String, back: Backtrace },
}

impl Error {
    pub(crate) fn config<S: Into<String>>(reason: S) -> Error {
        Error::Config {
            reason: reason.into(),
            back: Backtrace::new(),
        }
    }
}

impl std::fmt::Display for Error {
    // `Error` is non-exhaustive so that adding variants won't be a breaking change to our
    // callers. That means the compiler won't catch us if we miss a variant here, so we
    // always include a `_` arm.
    #[allow(unreachable_patterns)]
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::Config { reason, .. } => write!(f, "{}", reason),
            Error::Resolution {
                endpoint, source, ..
            } => match source {
                Some(source) => write!(
                    f,
                    "failed to resolve IP address for {}: {}",
                    endpoint, source
                ),
                None => write!(
                    f,
                    "failed to resolve IP address for {}: no addresses returned",
                    endpoint
                ),
            },
            Error::Bind { addr, source, .. } => {
                write!(f, "failed to bind local listener on {}: {}", addr, source)
            }
            Error::Dial { addr, source, .. } => write!(f, "failed to dial {}: {}", addr, source),
            Error::Encode { source, .. } => write!(f, "failed to encode GELF message: {}", source),
            Error::MessageTooLarge { size, max, .. } => {
                write!(f, "message too large: {} bytes (max {})", size, max)
            }
            Error::Write { source, .. } => write!(f, "failed to write message: {}", source),
            Error::NotStarted { .. } => write!(f, "the exporter has not been started"),
            Error::Start { retries, .. } => write!(
                f,
                "failed to start exporter: GELF writer not initialized after {} attempt(s)",
                retries
            ),
            Error::Refresh { strategy, .. } => write!(
                f,
                "failed to refresh writer endpoint (strategy '{}')",
                strategy
            ),
            _ => write!(f, "Other otel-gelf-exporter error"),
        }
    }
}

impl std::fmt::Debug for Error {
    #[allow(unreachable_patterns)]
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::Config { back, .. }
            | Error::Resolution { back, .. }
            | Error::Bind { back, .. }
            | Error::Dial { back, .. }
            | Error::Encode { back, .. }
            | Error::MessageTooLarge { back, .. }
            | Error::Write { back, .. }
            | Error::NotStarted { back }
            | Error::Start { back, .. }
            | Error::Refresh { back, .. } => write!(f, "{}\n{:?}", self, back),
            err => write!(f, "otel-gelf-exporter error: {}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Resolution {
                source: Some(source),
                ..
            } => Some(source.as_ref()),
            Error::Bind { source, .. } | Error::Dial { source, .. } | Error::Write { source, .. } => {
                Some(source.as_ref())
            }
            Error::Encode { source, .. } => Some(source),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

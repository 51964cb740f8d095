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

//! Bounded, fixed-delay retries for writer initialization.

use tracing::{debug, error};

use std::{future::Future, time::Duration};

/// Run `init` up to `max_retries` times, sleeping `backoff` between attempts.
///
/// Returns the first successful result, or `None` once every attempt has failed. Each failure is
/// logged. The caller is expected to hold the writer lock for the duration.
pub async fn init_with_retries<T, E, F, Fut>(
    mut init: F,
    max_retries: u32,
    backoff: Duration,
) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    E: std::fmt::Display,
{
    for attempt in 1..=max_retries {
        match init().await {
            Ok(x) => return Some(x),
            Err(err) => {
                error!(attempt, max_retries, error = %err, "failed to initialize GELF writer");
                if attempt < max_retries {
                    debug!("retrying to initialize GELF writer in {:?}", backoff);
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }
    error!(
        "failed to initialize GELF writer after {} attempt(s)",
        max_retries
    );
    None
}

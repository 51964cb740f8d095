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
//! syslog level definitions & the mapping from OpenTelemetry severities.
//!
//! GELF reuses the syslog severity scale for its `level` field. [`Level`] replicates the names
//! used in `<syslog.h>`.

type StdResult<T, E> = std::result::Result<T, E>;

/// RFC [5424] defines eight severity levels for messages. The enumeration values duplicate the
/// constants documented as per the `syslog()` manual [page] & defined in `<syslog.h>`, and are
/// what GELF carries in its `level` field.
///
/// [5424]: https://datatracker.ietf.org/doc/html/rfc5424
/// [page]: https://man7.org/linux/man-pages/man3/syslog.3.html
#[allow(non_camel_case_types)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Level {
    /// system is unusable
    LOG_EMERG = 0,
    /// action must be take immediately
    LOG_ALERT = 1,
    /// critical conditions
    LOG_CRIT = 2,
    /// error conditions
    LOG_ERR = 3,
    /// warning conditions
    LOG_WARNING = 4,
    /// normal, but significant condition
    LOG_NOTICE = 5,
    /// informational message
    LOG_INFO = 6,
    /// debug-level message
    LOG_DEBUG = 7,
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> StdResult<(), std::fmt::Error> {
        write!(
            f,
            "{}",
            match self {
                Level::LOG_EMERG => "LOG_EMERG",
                Level::LOG_ALERT => "LOG_ALERT",
                Level::LOG_CRIT => "LOG_CRIT",
                Level::LOG_ERR => "LOG_ERR",
                Level::LOG_WARNING => "LOG_WARNING",
                Level::LOG_NOTICE => "LOG_NOTICE",
                Level::LOG_INFO => "LOG_INFO",
                Level::LOG_DEBUG => "LOG_DEBUG",
            }
        )
    }
}

/// Map an OpenTelemetry severity number onto the syslog scale.
///
/// OpenTelemetry defines twenty-four severities in six bands of four (TRACE, DEBUG, INFO, WARN,
/// ERROR & FATAL). The mapping is coarse: FATAL goes to [`Level::LOG_EMERG`], TRACE & DEBUG both
/// go to [`Level::LOG_DEBUG`], and [`Level::LOG_ALERT`], [`Level::LOG_CRIT`] &
/// [`Level::LOG_NOTICE`] are never produced.
///
/// # Panics
///
/// `severity` must lie in `1..=24`; anything else is a caller bug.
pub fn syslog_level(severity: i32) -> Level {
    assert!(
        (1..=24).contains(&severity),
        "severity number {} out of range",
        severity
    );
    match severity {
        21.. => Level::LOG_EMERG,
        17.. => Level::LOG_ERR,
        13.. => Level::LOG_WARNING,
        9.. => Level::LOG_INFO,
        _ => Level::LOG_DEBUG,
    }
}

#[cfg(test)]
mod level_tests {
    use super::*;

    #[test]
    fn test_bands() {
        let expected = [
            (1..=8, Level::LOG_DEBUG),
            (9..=12, Level::LOG_INFO),
            (13..=16, Level::LOG_WARNING),
            (17..=20, Level::LOG_ERR),
            (21..=24, Level::LOG_EMERG),
        ];
        for (band, level) in expected {
            for severity in band {
                assert_eq!(syslog_level(severity), level, "severity {}", severity);
            }
        }
    }

    #[test]
    fn test_unreachable_levels() {
        for severity in 1..=24 {
            let level = syslog_level(severity) as u8;
            assert!([0, 3, 4, 6, 7].contains(&level));
        }
        assert_eq!(format!("{}", Level::LOG_WARNING), "LOG_WARNING");
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_zero_rejected() {
        syslog_level(0);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_twenty_five_rejected() {
        syslog_level(25);
    }
}

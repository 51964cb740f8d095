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

//! Test writing plaintext to TCP port 12201 on the local host.

use gelf_test::sample_batch;
use otel_gelf_exporter::{
    config::{EndpointTls, ExporterConfig, TcpExporterConfig},
    converter::log_record_count,
    exporter::Exporter,
};
use tracing::info;

#[tokio::main]
pub async fn main() {
    tracing_subscriber::fmt().init();

    let exporter = Exporter::tcp(TcpExporterConfig {
        exporter: ExporterConfig::new("localhost:12201"),
        endpoint_tls: EndpointTls {
            enabled: false,
            ..Default::default()
        },
    })
    .unwrap();
    exporter.start().await.unwrap();
    let batch = sample_batch("TCP");
    exporter.export(&batch).await.unwrap();
    info!(
        "sent {} record(s) over TCP to localhost:12201",
        log_record_count(&batch)
    );
    exporter.shutdown().await.unwrap();
}

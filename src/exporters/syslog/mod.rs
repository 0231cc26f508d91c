// SPDX-License-Identifier: Apache-2.0

//! Syslog exporter.
//!
//! Sends every line as a BSD syslog message over UDP or TCP, optionally
//! prepending an RFC 3164 header.

pub mod config;
pub mod exporter;
pub mod message;
pub mod writer;

pub use config::{SyslogExporterConfig, SyslogMode, Transport};
pub use exporter::SyslogExporter;

// SPDX-License-Identifier: Apache-2.0

use clap::{Args, ValueEnum};
use std::time::Duration;

use crate::exporters::syslog::config::{
    DEFAULT_FACILITY, DEFAULT_RETRY_INTERVAL_SECS, DEFAULT_SEVERITY,
};
use crate::exporters::syslog::{SyslogExporterConfig, SyslogMode};

#[derive(Copy, Clone, Debug, Default, ValueEnum, PartialEq, Eq)]
pub enum SyslogModeArg {
    /// Send lines unchanged
    #[default]
    Copy,
    /// Add a syslog header to lines that do not carry one
    Relay,
    /// Always add a syslog header
    #[value(name = "force_relay")]
    ForceRelay,
}

impl From<SyslogModeArg> for SyslogMode {
    fn from(m: SyslogModeArg) -> Self {
        match m {
            SyslogModeArg::Copy => SyslogMode::Copy,
            SyslogModeArg::Relay => SyslogMode::Relay,
            SyslogModeArg::ForceRelay => SyslogMode::ForceRelay,
        }
    }
}

#[derive(Debug, Args, Clone)]
pub struct SyslogExporterArgs {
    /// Syslog endpoint, udp://host:port or tcp://host:port
    #[arg(long, env = "DIRSYNC_SYSLOG_EXPORTER_ENDPOINT")]
    pub syslog_exporter_endpoint: Option<String>,

    /// Syslog facility (0-23)
    #[arg(long, env = "DIRSYNC_SYSLOG_EXPORTER_FACILITY", default_value_t = DEFAULT_FACILITY)]
    pub syslog_exporter_facility: u8,

    /// Syslog severity (0-7)
    #[arg(long, env = "DIRSYNC_SYSLOG_EXPORTER_SEVERITY", default_value_t = DEFAULT_SEVERITY)]
    pub syslog_exporter_severity: u8,

    /// Host name used in relayed headers, defaults to the local host name
    #[arg(long, env = "DIRSYNC_SYSLOG_EXPORTER_HOSTNAME")]
    pub syslog_exporter_hostname: Option<String>,

    /// Split UDP messages over 1024 bytes instead of truncating them
    #[arg(long, env = "DIRSYNC_SYSLOG_EXPORTER_SPLIT", default_value = "false")]
    pub syslog_exporter_split: bool,

    /// Message mode: copy, relay, force_relay
    #[arg(
        value_enum,
        long,
        env = "DIRSYNC_SYSLOG_EXPORTER_MODE",
        default_value = "copy"
    )]
    pub syslog_exporter_mode: SyslogModeArg,

    /// Seconds to wait before retrying a failed write
    #[arg(
        long,
        env = "DIRSYNC_SYSLOG_EXPORTER_RETRY_INTERVAL_SECS",
        default_value_t = DEFAULT_RETRY_INTERVAL_SECS
    )]
    pub syslog_exporter_retry_interval_secs: u64,
}

impl SyslogExporterArgs {
    pub fn build_config(&self) -> Result<SyslogExporterConfig, String> {
        let endpoint = self
            .syslog_exporter_endpoint
            .as_ref()
            .ok_or("--syslog-exporter-endpoint is required for the syslog exporter")?;

        let mut config = SyslogExporterConfig::new(endpoint)
            .with_facility(self.syslog_exporter_facility)
            .with_severity(self.syslog_exporter_severity)
            .with_split(self.syslog_exporter_split)
            .with_mode(self.syslog_exporter_mode.into())
            .with_retry_interval(Duration::from_secs(
                self.syslog_exporter_retry_interval_secs,
            ));
        if let Some(hostname) = &self.syslog_exporter_hostname {
            config = config.with_hostname(hostname);
        }

        config.validate()?;
        Ok(config)
    }
}

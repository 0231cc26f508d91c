// SPDX-License-Identifier: Apache-2.0

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_FACILITY: u8 = 1;
pub const DEFAULT_SEVERITY: u8 = 5;
pub const DEFAULT_RETRY_INTERVAL_SECS: u64 = 30;

/// How a line is turned into a syslog message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyslogMode {
    /// Send the line as-is
    #[default]
    Copy,
    /// Prepend a header unless the line already carries a priority
    Relay,
    /// Always prepend a header
    ForceRelay,
}

impl FromStr for SyslogMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "copy" => Ok(SyslogMode::Copy),
            "relay" => Ok(SyslogMode::Relay),
            "force_relay" => Ok(SyslogMode::ForceRelay),
            other => Err(format!("unsupported syslog mode: {}", other)),
        }
    }
}

/// Where messages are sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transport {
    Udp(String),
    Tcp(String),
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Udp(addr) => write!(f, "udp://{}", addr),
            Transport::Tcp(addr) => write!(f, "tcp://{}", addr),
        }
    }
}

impl FromStr for Transport {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (scheme, addr) = s.split_once("://").ok_or_else(|| {
            format!(
                "syslog endpoint must be udp://host:port or tcp://host:port, got {}",
                s
            )
        })?;

        match addr.rsplit_once(':') {
            Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {}
            _ => return Err(format!("syslog endpoint is missing host or port: {}", s)),
        }

        match scheme.to_ascii_lowercase().as_str() {
            "udp" => Ok(Transport::Udp(addr.to_string())),
            "tcp" => Ok(Transport::Tcp(addr.to_string())),
            other => Err(format!("unsupported syslog transport: {}", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SyslogExporterConfig {
    pub endpoint: String,
    pub facility: u8,
    pub severity: u8,
    /// Host name written into relayed headers
    pub hostname: String,
    /// Split oversized UDP messages instead of truncating them
    pub split: bool,
    pub mode: SyslogMode,
    /// Delay before retrying after a failed write
    pub retry_interval: Duration,
}

impl SyslogExporterConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            facility: DEFAULT_FACILITY,
            severity: DEFAULT_SEVERITY,
            hostname: gethostname::gethostname().to_string_lossy().into_owned(),
            split: false,
            mode: SyslogMode::default(),
            retry_interval: Duration::from_secs(DEFAULT_RETRY_INTERVAL_SECS),
        }
    }

    pub fn with_facility(mut self, facility: u8) -> Self {
        self.facility = facility;
        self
    }

    pub fn with_severity(mut self, severity: u8) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }

    pub fn with_split(mut self, split: bool) -> Self {
        self.split = split;
        self
    }

    pub fn with_mode(mut self, mode: SyslogMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_retry_interval(mut self, retry_interval: Duration) -> Self {
        self.retry_interval = retry_interval;
        self
    }

    pub fn transport(&self) -> Result<Transport, String> {
        self.endpoint.parse()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.facility > 23 {
            return Err(format!("facility out of range (0-23): {}", self.facility));
        }
        if self.severity > 7 {
            return Err(format!("severity out of range (0-7): {}", self.severity));
        }
        if self.hostname.is_empty() {
            return Err("syslog hostname must not be empty".to_string());
        }
        self.transport()?;
        Ok(())
    }
}

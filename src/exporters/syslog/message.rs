// SPDX-License-Identifier: Apache-2.0

//! BSD syslog (RFC 3164) message framing.

use chrono::{DateTime, TimeZone};

use super::config::SyslogMode;

/// Syslog datagrams must stay below this size
pub const MAX_UDP_PACKET: usize = 1024;

pub fn priority(facility: u8, severity: u8) -> u16 {
    u16::from(facility) * 8 + u16::from(severity)
}

/// Whether `body` already starts with a `<PRI>` header, PRI being one to
/// three digits.
pub fn has_priority_header(body: &[u8]) -> bool {
    let Some(rest) = body.strip_prefix(b"<") else {
        return false;
    };
    let digits = rest.iter().take_while(|b| b.is_ascii_digit()).count();
    (1..=3).contains(&digits) && rest.get(digits) == Some(&b'>')
}

/// Build the message for one line according to `mode`.
pub fn format_message<Tz>(
    mode: SyslogMode,
    facility: u8,
    severity: u8,
    timestamp: &DateTime<Tz>,
    hostname: &str,
    body: &str,
) -> Vec<u8>
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    let relay = match mode {
        SyslogMode::Copy => false,
        SyslogMode::Relay => !has_priority_header(body.as_bytes()),
        SyslogMode::ForceRelay => true,
    };
    if !relay {
        return body.as_bytes().to_vec();
    }

    format!(
        "<{}>{} {} {}",
        priority(facility, severity),
        timestamp.format("%b %e %H:%M:%S"),
        hostname,
        body
    )
    .into_bytes()
}

/// Cut a message into datagrams. Without `split` only the first
/// `MAX_UDP_PACKET` bytes are kept.
pub fn udp_packets(message: &[u8], split: bool) -> Vec<&[u8]> {
    if message.is_empty() {
        return vec![message];
    }
    if split {
        message.chunks(MAX_UDP_PACKET).collect()
    } else {
        vec![&message[..message.len().min(MAX_UDP_PACKET)]]
    }
}

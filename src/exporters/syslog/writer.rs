// SPDX-License-Identifier: Apache-2.0

use std::io;

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpStream, UdpSocket};
use tracing::{debug, info};

use super::config::Transport;
use super::message::udp_packets;

/// Network side of the syslog exporter
pub enum SyslogWriter {
    Udp {
        socket: UdpSocket,
        split: bool,
    },
    /// The connection is (re)established lazily on the next write after a
    /// failure.
    Tcp {
        addr: String,
        stream: Option<TcpStream>,
    },
}

impl SyslogWriter {
    pub async fn connect(transport: &Transport, split: bool) -> io::Result<Self> {
        match transport {
            Transport::Udp(addr) => {
                let socket = UdpSocket::bind(local_bind_addr(addr)).await?;
                socket.connect(addr).await?;
                debug!(addr, "Syslog UDP socket ready");
                Ok(SyslogWriter::Udp { socket, split })
            }
            Transport::Tcp(addr) => {
                let stream = TcpStream::connect(addr).await?;
                info!(addr, "Connected to syslog server");
                Ok(SyslogWriter::Tcp {
                    addr: addr.clone(),
                    stream: Some(stream),
                })
            }
        }
    }

    pub async fn write(&mut self, message: &[u8]) -> io::Result<()> {
        match self {
            SyslogWriter::Udp { socket, split } => {
                for packet in udp_packets(message, *split) {
                    socket.send(packet).await?;
                }
                Ok(())
            }
            SyslogWriter::Tcp { addr, stream } => {
                if stream.is_none() {
                    *stream = Some(TcpStream::connect(addr.as_str()).await?);
                    info!(addr = addr.as_str(), "Reconnected to syslog server");
                }
                let Some(conn) = stream.as_mut() else {
                    return Err(io::Error::new(io::ErrorKind::NotConnected, "no connection"));
                };

                let written = async {
                    conn.write_all(message).await?;
                    conn.write_all(b"\n").await
                }
                .await;
                if written.is_err() {
                    *stream = None;
                }
                written
            }
        }
    }

    pub async fn close(&mut self) {
        if let SyslogWriter::Tcp { stream, .. } = self {
            if let Some(mut conn) = stream.take() {
                let _ = conn.shutdown().await;
            }
        }
    }
}

fn local_bind_addr(remote: &str) -> &'static str {
    if remote.starts_with('[') {
        "[::]:0"
    } else {
        "0.0.0.0:0"
    }
}

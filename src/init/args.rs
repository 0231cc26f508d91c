// SPDX-License-Identifier: Apache-2.0

use clap::{Args, ValueEnum};

use crate::init::dirsync_receiver::DirSyncReceiverArgs;
use crate::init::syslog_exporter::SyslogExporterArgs;

#[derive(Debug, Args, Clone)]
pub struct AgentRun {
    #[command(flatten)]
    pub dirsync_receiver: DirSyncReceiverArgs,

    /// Exporter that receives the lines
    #[arg(value_enum, long, env = "DIRSYNC_EXPORTER", default_value = "blackhole")]
    pub exporter: Exporter,

    #[command(flatten)]
    pub syslog_exporter: SyslogExporterArgs,

    /// Number of batches buffered between the receiver and the exporter
    #[arg(long, env = "DIRSYNC_SENDING_QUEUE_SIZE", default_value = "100")]
    pub sending_queue_size: usize,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum Exporter {
    /// Discard every line
    #[default]
    Blackhole,
    /// Forward lines to a syslog server
    Syslog,
}

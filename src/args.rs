// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use clap::{Parser, ValueEnum};
use isysrx::store::HistoryPolicy;
use std::{
    fmt,
    net::{IpAddr, SocketAddr},
    path::PathBuf,
};
use tracing::level_filters::LevelFilter;

#[cfg(feature = "zenoh")]
use serde_json::json;
#[cfg(feature = "zenoh")]
use zenoh::config::{Config, WhatAmI};

/// How a recurring frame id is kept in the history.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum History {
    /// Keep every batch received under the id.
    Append,
    /// Keep only the latest batch received under the id.
    Overwrite,
}

impl From<History> for HistoryPolicy {
    fn from(history: History) -> HistoryPolicy {
        match history {
            History::Append => HistoryPolicy::Append,
            History::Overwrite => HistoryPolicy::Overwrite,
        }
    }
}

impl fmt::Display for History {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", HistoryPolicy::from(*self))
    }
}

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// local address receiving the radar datagrams
    #[arg(long, env, default_value = "0.0.0.0:2050")]
    pub bind: SocketAddr,

    /// only accept datagrams sent from this radar address
    #[arg(long, env)]
    pub source: Option<IpAddr>,

    /// how a recurring frame id is kept in the history
    #[arg(long, env, value_enum, default_value_t = History::Append)]
    pub history: History,

    /// load a JSON history file before receiving
    #[arg(long, env)]
    pub import: Option<PathBuf>,

    /// write the JSON history file on exit
    #[arg(long, env)]
    pub export: Option<PathBuf>,

    /// replay a pcapng capture instead of opening the socket, datagrams are
    /// filtered by the port of --bind
    #[cfg(feature = "pcap")]
    #[arg(long, env)]
    pub pcap: Option<PathBuf>,

    /// do not print the target table of each frame
    #[arg(short, long, env)]
    pub quiet: bool,

    /// Application log level
    #[arg(long, env, default_value = "info")]
    pub rust_log: LevelFilter,

    /// Enable Tracy profiler broadcast
    #[arg(long, env)]
    pub tracy: bool,

    /// decoded frame topic name
    #[cfg(feature = "zenoh")]
    #[arg(long, env, default_value = "rt/radar/isys")]
    pub frames_topic: String,

    /// zenoh connection mode
    #[cfg(feature = "zenoh")]
    #[arg(long, env, default_value = "peer")]
    mode: WhatAmI,

    /// connect to zenoh endpoints
    #[cfg(feature = "zenoh")]
    #[arg(long, env)]
    connect: Vec<String>,

    /// listen to zenoh endpoints
    #[cfg(feature = "zenoh")]
    #[arg(long, env)]
    listen: Vec<String>,

    /// disable zenoh multicast scouting
    #[cfg(feature = "zenoh")]
    #[arg(long, env)]
    no_multicast_scouting: bool,
}

#[cfg(feature = "zenoh")]
impl TryFrom<&Args> for Config {
    type Error = zenoh::Error;

    fn try_from(args: &Args) -> Result<Self, Self::Error> {
        let mut config = Config::default();

        config.insert_json5("mode", &json!(args.mode).to_string())?;

        if !args.connect.is_empty() {
            config.insert_json5("connect/endpoints", &json!(args.connect).to_string())?;
        }

        if !args.listen.is_empty() {
            config.insert_json5("listen/endpoints", &json!(args.listen).to_string())?;
        }

        if args.no_multicast_scouting {
            config.insert_json5("scouting/multicast/enabled", &json!(false).to_string())?;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from(["isysrx"]).unwrap();
        assert_eq!(args.bind, "0.0.0.0:2050".parse().unwrap());
        assert_eq!(args.history, History::Append);
        assert_eq!(HistoryPolicy::from(args.history), HistoryPolicy::default());
        assert_eq!(args.source, None);
        assert!(!args.quiet);
    }

    #[test]
    fn test_options() {
        let args = Args::try_parse_from([
            "isysrx",
            "--bind",
            "127.0.0.1:3000",
            "--source",
            "192.168.60.3",
            "--history",
            "overwrite",
            "--export",
            "history.json",
            "-q",
        ])
        .unwrap();
        assert_eq!(args.bind.port(), 3000);
        assert_eq!(args.source, Some("192.168.60.3".parse().unwrap()));
        assert_eq!(HistoryPolicy::from(args.history), HistoryPolicy::Overwrite);
        assert_eq!(args.export, Some(PathBuf::from("history.json")));
        assert!(args.quiet);

        assert!(Args::try_parse_from(["isysrx", "--history", "discard"]).is_err());
    }
}

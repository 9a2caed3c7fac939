// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Offline replay of ISYS traffic recorded with tcpdump or Wireshark.

use crate::{
    assembler::{AssemblerStats, FrameAssembler},
    eth::IsysError,
};
use etherparse::{SlicedPacket, TransportSlice};
use std::{fs::File, path::Path};
use tracing::{debug, instrument, trace, warn};

/// Returns the UDP payload of a raw Ethernet frame, or `None` for anything
/// that is not UDP or, when `port` is set, not addressed to that port.
pub fn udp_payload(frame: &[u8], port: Option<u16>) -> Option<&[u8]> {
    let pkt = match SlicedPacket::from_ethernet(frame) {
        Ok(pkt) => pkt,
        Err(err) => {
            trace!("skipping frame: {:?}", err);
            return None;
        }
    };

    match pkt.transport {
        Some(TransportSlice::Udp(udp)) => match port {
            Some(port) if udp.destination_port() != port => None,
            _ => Some(udp.payload()),
        },
        _ => None,
    }
}

/// Feeds every UDP datagram of a pcapng capture into `assembler` in capture
/// order.  Decode errors are logged and replay continues with the next
/// datagram, the same as a live receiver.
#[instrument(skip_all, fields(path = %path.as_ref().display()))]
pub fn replay<P: AsRef<Path>>(
    path: P,
    port: Option<u16>,
    assembler: &mut FrameAssembler,
) -> Result<AssemblerStats, IsysError> {
    let file = File::open(path.as_ref())?;
    let mut datagrams = 0;

    for cap in pcarp::Capture::new(file) {
        let cap = match cap {
            Ok(cap) => cap,
            Err(err) => {
                warn!("stopping replay at unreadable block: {:?}", err);
                break;
            }
        };

        if let Some(datagram) = udp_payload(&cap.data, port) {
            datagrams += 1;
            if let Err(err) = assembler.push(datagram) {
                warn!("dropping frame: {}", err);
            }
        }
    }

    assembler.reset();
    debug!(datagrams, stats = ?assembler.stats(), "replay complete");
    Ok(assembler.stats())
}

// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Frame assembly from a header datagram and its payload datagrams.
//!
//! The wire protocol carries no handshake tying a payload to its header
//! beyond the frame id prefix, so datagrams are paired strictly by arrival
//! order: the first datagram received while idle is the header and the next
//! `data_packet_count` datagrams are its payloads.  A payload whose prefix
//! names a different frame id is still paired with the pending header; the
//! mismatch is only logged.

use crate::{
    checksum::{verify, Checksum},
    eth::{
        decode_header, FrameHeader, IsysError, PayloadSlice, TargetRecord, SLOTS_PER_PACKET,
        TARGET_LEN,
    },
    store::FrameStore,
};
use kanal::Receiver;
use serde::Serialize;
use std::fmt;
use tracing::{debug, instrument, warn};

/// Depth of the channel handed out by [`FrameAssembler::subscribe`].  Frames
/// are dropped for a subscriber that falls this far behind.
pub const SUBSCRIBER_DEPTH: usize = 64;

/// A frame decoded from one header and its payload datagrams.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DecodedFrame {
    /// Header datagram the frame was assembled from
    pub header: FrameHeader,
    /// Non-padding targets in wire order, empty when the checksum failed
    pub targets: Vec<TargetRecord>,
    /// True when the computed checksum matches the header
    pub checksum_valid: bool,
    /// Checksum calculated over the received target region
    pub computed_checksum: u32,
    /// Number of payload datagrams assembled into this frame
    pub packets: usize,
}

impl DecodedFrame {
    /// Frame id from the header.
    #[inline]
    pub fn frame_id(&self) -> u16 {
        self.header.frame_id
    }

    /// Returns the checksum mismatch of an unverified frame as an error.
    pub fn verify(&self) -> Result<(), IsysError> {
        if self.checksum_valid {
            Ok(())
        } else {
            Err(IsysError::ChecksumMismatch {
                expected: self.header.checksum,
                computed: self.computed_checksum,
            })
        }
    }
}

impl fmt::Display for DecodedFrame {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(
            f,
            "Frame ID: {} Firmware: {} Targets: {}",
            self.header.frame_id,
            self.header.firmware_version(),
            self.header.target_count
        )?;

        if !self.checksum_valid {
            return writeln!(
                f,
                "Checksum: Not Okay (calculated 0x{:08X} expected 0x{:08X})",
                self.computed_checksum, self.header.checksum
            );
        }

        writeln!(f, "Checksum: Okay")?;

        if self.targets.is_empty() {
            return writeln!(f, "Frame ID: {} contains no valid targets.", self.frame_id());
        }

        writeln!(
            f,
            "{:<8} {:<22} {:<12} {:<16} {:<10} {}",
            "Serial", "Signal Strength (dB)", "Range (m)", "Velocity (m/s)", "Direction", "Azimuth (Deg)"
        )?;
        writeln!(f, "{}", "-".repeat(86))?;
        for (idx, target) in self.targets.iter().enumerate() {
            writeln!(
                f,
                "{:<8} {:<22.2} {:<12.2} {:<16.2} {:<10} {:.2}",
                idx + 1,
                target.signal_strength,
                target.range,
                target.velocity,
                target.direction().to_string(),
                target.azimuth
            )?;
        }

        Ok(())
    }
}

/// Decodes a frame transmitted as one header and one payload datagram.
pub fn decode_frame(header: &[u8], payload: &[u8]) -> Result<DecodedFrame, IsysError> {
    decode_frame_packets(header, &[payload])
}

/// Decodes a frame from its header and all of its payload datagrams in
/// arrival order.
#[instrument(skip_all, level = "debug")]
pub fn decode_frame_packets<P: AsRef<[u8]>>(
    header: &[u8],
    payloads: &[P],
) -> Result<DecodedFrame, IsysError> {
    let header = decode_header(header)?;
    header.validate()?;

    if payloads.len() != header.data_packet_count as usize {
        return Err(IsysError::MissingPackets(
            payloads.len(),
            header.data_packet_count as usize,
        ));
    }

    assemble(&header, payloads.iter().map(|p| p.as_ref()))
}

fn assemble<'a, I>(header: &FrameHeader, payloads: I) -> Result<DecodedFrame, IsysError>
where
    I: IntoIterator<Item = &'a [u8]>,
{
    let expected = header.target_bytes();
    let mut remaining = expected;
    let mut checksum = Checksum::new();
    let mut packets = 0;
    let mut slots = Vec::with_capacity(header.data_packet_count as usize * SLOTS_PER_PACKET);

    for payload in payloads {
        let packet = PayloadSlice::from_slice(payload)?;
        packets += 1;

        if packet.frame_id() != header.frame_id {
            warn!(
                header_frame_id = header.frame_id,
                payload_frame_id = packet.frame_id(),
                packet_number = packet.packet_number(),
                "payload frame id does not match the pending header"
            );
        }

        // Each datagram contributes at most its slot capacity to the
        // checksummed region, the remainder is carried by later datagrams.
        let region = packet.payload();
        let covered = remaining.min(SLOTS_PER_PACKET * TARGET_LEN);
        if region.len() < covered {
            return Err(IsysError::IncompleteTargetData(region.len(), covered));
        }

        checksum.update(&region[..covered]);
        remaining -= covered;
        slots.extend(packet.targets()?);
    }

    if remaining > 0 {
        return Err(IsysError::IncompleteTargetData(expected - remaining, expected));
    }

    let computed = checksum.value();
    if !verify(header.checksum, computed) {
        debug!(
            frame_id = header.frame_id,
            "checksum mismatch: calculated 0x{:08X} expected 0x{:08X}", computed, header.checksum
        );
        return Ok(DecodedFrame {
            header: *header,
            targets: Vec::new(),
            checksum_valid: false,
            computed_checksum: computed,
            packets,
        });
    }

    Ok(DecodedFrame {
        header: *header,
        targets: slots.into_iter().filter(|t| !t.is_padding()).collect(),
        checksum_valid: true,
        computed_checksum: computed,
        packets,
    })
}

/// Outcome counters of a [`FrameAssembler`].
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct AssemblerStats {
    /// Frames decoded, including frames flagged with a checksum mismatch
    pub frames: u64,
    /// Frames whose target region failed the checksum
    pub checksum_failures: u64,
    /// Header datagrams shorter than 256 bytes
    pub incomplete_headers: u64,
    /// Headers rejected by [`FrameHeader::validate`]
    pub invalid_headers: u64,
    /// Payload datagrams too short for their share of the target region
    pub incomplete_payloads: u64,
    /// Partial frames discarded by [`FrameAssembler::reset`]
    pub discarded: u64,
}

type Listener = Box<dyn FnMut(&DecodedFrame) + Send>;

/// Stateful assembler fed one datagram at a time by the receiver.
///
/// Verified frames with at least one target are inserted into the attached
/// [`FrameStore`] and every decoded frame is handed to the registered
/// listeners.
pub struct FrameAssembler {
    header: Option<FrameHeader>,
    packets: Vec<Vec<u8>>,
    store: Option<FrameStore>,
    listeners: Vec<Listener>,
    stats: AssemblerStats,
}

impl Default for FrameAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for FrameAssembler {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("FrameAssembler")
            .field("header", &self.header)
            .field("packets", &self.packets.len())
            .field("store", &self.store.is_some())
            .field("listeners", &self.listeners.len())
            .field("stats", &self.stats)
            .finish()
    }
}

impl FrameAssembler {
    /// Creates an idle assembler with no store and no listeners.
    pub fn new() -> FrameAssembler {
        FrameAssembler {
            header: None,
            packets: Vec::new(),
            store: None,
            listeners: Vec::new(),
            stats: AssemblerStats::default(),
        }
    }

    /// Attaches the store receiving verified frames.
    pub fn with_store(mut self, store: FrameStore) -> FrameAssembler {
        self.store = Some(store);
        self
    }

    /// The attached store, if any.
    pub fn store(&self) -> Option<&FrameStore> {
        self.store.as_ref()
    }

    /// Registers a callback invoked with every decoded frame.
    pub fn on_frame<F>(&mut self, listener: F)
    where
        F: FnMut(&DecodedFrame) + Send + 'static,
    {
        self.listeners.push(Box::new(listener));
    }

    /// Returns a channel receiving a copy of every decoded frame.  The
    /// channel closes once the assembler is dropped.
    pub fn subscribe(&mut self) -> Receiver<DecodedFrame> {
        let (tx, rx) = kanal::bounded(SUBSCRIBER_DEPTH);
        self.on_frame(move |frame| match tx.try_send(frame.clone()) {
            Ok(true) => (),
            Ok(false) => warn!(frame_id = frame.frame_id(), "subscriber full, dropping frame"),
            Err(_) => (),
        });
        rx
    }

    /// Counters accumulated since the assembler was created.
    pub fn stats(&self) -> AssemblerStats {
        self.stats
    }

    /// Returns true when no header is waiting for its payloads.
    pub fn is_idle(&self) -> bool {
        self.header.is_none()
    }

    /// Discards a partially received frame.  Returns true if one was pending.
    pub fn reset(&mut self) -> bool {
        self.packets.clear();
        match self.header.take() {
            Some(header) => {
                debug!(frame_id = header.frame_id, "discarding partial frame");
                self.stats.discarded += 1;
                true
            }
            None => false,
        }
    }

    /// This function fires on each UDP datagram so it is only instrumented at
    /// the trace level.
    #[instrument(skip_all, level = "trace", fields(len = datagram.len()))]
    pub fn push(&mut self, datagram: &[u8]) -> Result<Option<DecodedFrame>, IsysError> {
        let header = match self.header {
            Some(header) => header,
            None => return self.start_of_frame(datagram).map(|_| None),
        };

        self.packets.push(datagram.to_vec());
        if self.packets.len() < header.data_packet_count as usize {
            return Ok(None);
        }

        self.header = None;
        let packets = std::mem::take(&mut self.packets);

        match assemble(&header, packets.iter().map(Vec::as_slice)) {
            Ok(frame) => {
                self.end_of_frame(&frame);
                Ok(Some(frame))
            }
            Err(err) => {
                self.stats.incomplete_payloads += 1;
                Err(err)
            }
        }
    }

    fn start_of_frame(&mut self, datagram: &[u8]) -> Result<(), IsysError> {
        let header = match decode_header(datagram) {
            Ok(header) => header,
            Err(err) => {
                self.stats.incomplete_headers += 1;
                return Err(err);
            }
        };

        if let Err(err) = header.validate() {
            self.stats.invalid_headers += 1;
            return Err(err);
        }

        self.header = Some(header);
        Ok(())
    }

    fn end_of_frame(&mut self, frame: &DecodedFrame) {
        self.stats.frames += 1;

        if !frame.checksum_valid {
            self.stats.checksum_failures += 1;
        } else if !frame.targets.is_empty() {
            if let Some(store) = &self.store {
                store.put(frame.frame_id(), frame.targets.clone());
            }
        }

        for listener in self.listeners.iter_mut() {
            listener(frame);
        }
    }
}

// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! ISYS-5021 UDP wire format.
//!
//! A frame is transmitted as a 256 byte header datagram followed by one or
//! more payload datagrams.  Every payload starts with a 4 byte prefix
//! (frame id, packet number) and carries up to 42 target slots of 24 bytes.
//! All fields are little-endian, floats are IEEE-754 single precision.

use crate::cursor::{ByteCursor, ByteWriter};
use serde::{Deserialize, Serialize};
use std::{fmt, io};

/// Size of the header datagram in bytes/octets.
pub const HEADER_LEN: usize = 256;
/// Size of a target record in bytes/octets.
pub const TARGET_LEN: usize = 24;
/// Size of the frame id and packet number prefix of a payload datagram.
pub const PREFIX_LEN: usize = 4;
/// Number of target slots carried by one payload datagram.
pub const SLOTS_PER_PACKET: usize = 42;
/// Size of a fully populated payload datagram.
pub const PAYLOAD_LEN: usize = PREFIX_LEN + SLOTS_PER_PACKET * TARGET_LEN;

/// Errors raised while decoding, assembling or storing ISYS frames.
#[derive(Debug)]
pub enum IsysError {
    /// Socket or file error.
    IoError(io::Error),
    /// Malformed history file.
    JsonError(serde_json::Error),
    /// Bytes required by a read and bytes actually remaining.
    TruncatedBuffer(usize, usize),
    /// Length of the short header datagram.
    IncompleteHeader(usize),
    /// Bytes received and bytes required for the target region.
    IncompleteTargetData(usize, usize),
    /// The target region does not sum to the header checksum.
    ChecksumMismatch {
        /// Checksum carried in the header.
        expected: u32,
        /// Checksum computed over the received target region.
        computed: u32,
    },
    /// Header `bytes_per_target` other than 24.
    InvalidTargetSize(u16),
    /// Header announcing zero payload datagrams.
    InvalidPacketCount(u16),
    /// Payload datagrams received and payload datagrams announced.
    MissingPackets(usize, usize),
    /// Number of targets that does not fit the 16-bit target count.
    TooManyTargets(usize),
}

impl std::error::Error for IsysError {}

impl From<io::Error> for IsysError {
    fn from(err: io::Error) -> IsysError {
        IsysError::IoError(err)
    }
}

impl From<serde_json::Error> for IsysError {
    fn from(err: serde_json::Error) -> IsysError {
        IsysError::JsonError(err)
    }
}

impl fmt::Display for IsysError {
    fn fmt(&self, f: &mut fmt::Formatter) -> std::fmt::Result {
        match self {
            IsysError::IoError(err) => write!(f, "io error: {}", err),
            IsysError::JsonError(err) => write!(f, "json error: {}", err),
            IsysError::TruncatedBuffer(needed, remaining) => {
                write!(f, "truncated buffer: need {} bytes, {} remain", needed, remaining)
            }
            IsysError::IncompleteHeader(len) => {
                write!(f, "incomplete header data [{}/{}]", len, HEADER_LEN)
            }
            IsysError::IncompleteTargetData(len, expect) => {
                write!(f, "incomplete target data [{}/{}]", len, expect)
            }
            IsysError::ChecksumMismatch { expected, computed } => {
                write!(
                    f,
                    "checksum mismatch: calculated 0x{:08X} expected 0x{:08X}",
                    computed, expected
                )
            }
            IsysError::InvalidTargetSize(size) => {
                write!(f, "invalid bytes per target: {}", size)
            }
            IsysError::InvalidPacketCount(count) => {
                write!(f, "invalid data packet count: {}", count)
            }
            IsysError::MissingPackets(len, expect) => {
                write!(f, "missing data packets [{}/{}]", len, expect)
            }
            IsysError::TooManyTargets(count) => {
                write!(f, "too many targets for one frame: {}", count)
            }
        }
    }
}

/// Radial direction of a target derived from the sign of its velocity.
///
/// Protocol contract: positive velocity means the target approaches the
/// sensor, negative velocity means it moves away.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Direction {
    /// Zero velocity.
    Static,
    /// Moving towards the sensor.
    Incoming,
    /// Moving away from the sensor.
    Outgoing,
}

impl Direction {
    /// Classifies a radial velocity.  NaN is reported as `Outgoing`.
    pub fn from_velocity(velocity: f32) -> Direction {
        if velocity == 0.0 {
            Direction::Static
        } else if velocity > 0.0 {
            Direction::Incoming
        } else {
            Direction::Outgoing
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Direction::Static => write!(f, "Static"),
            Direction::Incoming => write!(f, "Incoming"),
            Direction::Outgoing => write!(f, "Outgoing"),
        }
    }
}

/// JSON has no representation for NaN or infinity, so non-finite
/// measurements are written as the strings `"NaN"`, `"inf"` and `"-inf"`.
mod measurement {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f32, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() {
            serializer.serialize_f32(*value)
        } else if value.is_nan() {
            serializer.serialize_str("NaN")
        } else if value.is_sign_positive() {
            serializer.serialize_str("inf")
        } else {
            serializer.serialize_str("-inf")
        }
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Number(f32),
        Text(String),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f32, D::Error> {
        match Repr::deserialize(deserializer)? {
            Repr::Number(value) => Ok(value),
            Repr::Text(text) => text
                .parse::<f32>()
                .map_err(|_| de::Error::invalid_value(de::Unexpected::Str(&text), &"a float")),
        }
    }
}

/// One 24 byte target slot.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetRecord {
    /// Signal strength in dB
    #[serde(with = "measurement")]
    pub signal_strength: f32,
    /// Range in meters
    #[serde(with = "measurement")]
    pub range: f32,
    /// Radial velocity in m/s, see [`Direction`] for the sign convention
    #[serde(with = "measurement")]
    pub velocity: f32,
    /// Azimuth angle in degrees
    #[serde(with = "measurement")]
    pub azimuth: f32,
    /// Unused by current firmware
    #[serde(default)]
    pub reserved1: u32,
    /// Unused by current firmware
    #[serde(default)]
    pub reserved2: u32,
}

impl TargetRecord {
    /// Length of a target record in bytes/octets.
    pub const LEN: usize = TARGET_LEN;

    /// Creates a record with zeroed reserved words.
    pub fn new(signal_strength: f32, range: f32, velocity: f32, azimuth: f32) -> TargetRecord {
        TargetRecord {
            signal_strength,
            range,
            velocity,
            azimuth,
            reserved1: 0,
            reserved2: 0,
        }
    }

    /// Reads one 24 byte slot from `cursor`.
    pub fn decode(cursor: &mut ByteCursor) -> Result<TargetRecord, IsysError> {
        if cursor.remaining() < Self::LEN {
            return Err(IsysError::TruncatedBuffer(Self::LEN, cursor.remaining()));
        }

        Ok(TargetRecord {
            signal_strength: cursor.read_f32()?,
            range: cursor.read_f32()?,
            velocity: cursor.read_f32()?,
            azimuth: cursor.read_f32()?,
            reserved1: cursor.read_u32()?,
            reserved2: cursor.read_u32()?,
        })
    }

    /// Writes the 24 byte slot, reserved words included.
    pub fn encode(&self, writer: &mut ByteWriter) {
        writer.put_f32(self.signal_strength);
        writer.put_f32(self.range);
        writer.put_f32(self.velocity);
        writer.put_f32(self.azimuth);
        writer.put_u32(self.reserved1);
        writer.put_u32(self.reserved2);
    }

    /// Returns true for an unused slot, all four measurements exactly zero.
    #[inline]
    pub fn is_padding(&self) -> bool {
        self.signal_strength == 0.0
            && self.range == 0.0
            && self.velocity == 0.0
            && self.azimuth == 0.0
    }

    /// Direction of travel from the velocity sign.
    #[inline]
    pub fn direction(&self) -> Direction {
        Direction::from_velocity(self.velocity)
    }
}

impl From<&TargetRecord> for [u8; TARGET_LEN] {
    fn from(target: &TargetRecord) -> Self {
        let mut writer = ByteWriter::with_capacity(TARGET_LEN);
        target.encode(&mut writer);

        let mut msg = [0u8; TARGET_LEN];
        msg.copy_from_slice(writer.as_slice());
        msg
    }
}

/// The 256 byte frame header.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct FrameHeader {
    /// Frame counter, repeated in every payload prefix
    pub frame_id: u16,
    /// Firmware major version
    pub fw_major: u16,
    /// Firmware fix version
    pub fw_fix: u16,
    /// Firmware minor version
    pub fw_minor: u16,
    /// Detections reported by the sensor, informational only
    pub detection_count: u16,
    /// Valid target slots across all payload datagrams of the frame
    pub target_count: u16,
    /// Byte-sum of the target region computed by the sensor
    pub checksum: u32,
    /// Size of a target slot, always 24
    pub bytes_per_target: u16,
    /// Number of payload datagrams following the header
    pub data_packet_count: u16,
}

impl FrameHeader {
    /// Length of the header datagram in bytes/octets.
    pub const LEN: usize = HEADER_LEN;
    /// Length of the populated header fields.
    pub const FIELDS_LEN: usize = 20;
    /// Reserved bytes following the header fields.
    pub const RESERVED_LEN: usize = 118;

    /// Reads the header fields from the start of `cursor`, which must hold a
    /// complete header datagram.
    pub fn decode(cursor: &mut ByteCursor) -> Result<FrameHeader, IsysError> {
        if cursor.remaining() < Self::LEN {
            return Err(IsysError::IncompleteHeader(cursor.remaining()));
        }

        let header = FrameHeader {
            frame_id: cursor.read_u16()?,
            fw_major: cursor.read_u16()?,
            fw_fix: cursor.read_u16()?,
            fw_minor: cursor.read_u16()?,
            detection_count: cursor.read_u16()?,
            target_count: cursor.read_u16()?,
            checksum: cursor.read_u32()?,
            bytes_per_target: cursor.read_u16()?,
            data_packet_count: cursor.read_u16()?,
        };
        cursor.skip(Self::LEN - Self::FIELDS_LEN)?;

        Ok(header)
    }

    /// Writes the full 256 byte header datagram.
    pub fn encode(&self, writer: &mut ByteWriter) {
        writer.put_u16(self.frame_id);
        writer.put_u16(self.fw_major);
        writer.put_u16(self.fw_fix);
        writer.put_u16(self.fw_minor);
        writer.put_u16(self.detection_count);
        writer.put_u16(self.target_count);
        writer.put_u32(self.checksum);
        writer.put_u16(self.bytes_per_target);
        writer.put_u16(self.data_packet_count);
        // Reserved region plus the unused tail of the datagram.
        writer.put_zeros(Self::LEN - Self::FIELDS_LEN);
    }

    /// Confirms the header describes a frame this crate can decode.
    pub fn validate(&self) -> Result<(), IsysError> {
        if self.bytes_per_target as usize != TARGET_LEN {
            return Err(IsysError::InvalidTargetSize(self.bytes_per_target));
        }

        if self.data_packet_count == 0 {
            return Err(IsysError::InvalidPacketCount(self.data_packet_count));
        }

        Ok(())
    }

    /// Returns the number of target region bytes covered by the checksum.
    #[inline]
    pub fn target_bytes(&self) -> usize {
        self.target_count as usize * self.bytes_per_target as usize
    }

    /// Returns the firmware version formatted as major.minor.fix.
    pub fn firmware_version(&self) -> String {
        format!("{}.{}.{}", self.fw_major, self.fw_minor, self.fw_fix)
    }
}

impl From<&FrameHeader> for [u8; HEADER_LEN] {
    fn from(header: &FrameHeader) -> Self {
        let mut writer = ByteWriter::with_capacity(HEADER_LEN);
        header.encode(&mut writer);

        let mut msg = [0u8; HEADER_LEN];
        msg.copy_from_slice(writer.as_slice());
        msg
    }
}

impl fmt::Display for FrameHeader {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "FrameHeader {{ frame_id: {}, firmware: {}, detections: {}, targets: {}, \
             bytes_per_target: {}, data_packets: {}, checksum: 0x{:08X} }}",
            self.frame_id,
            self.firmware_version(),
            self.detection_count,
            self.target_count,
            self.bytes_per_target,
            self.data_packet_count,
            self.checksum
        )
    }
}

/// A slice containing an ISYS payload datagram.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PayloadSlice<'a> {
    slice: &'a [u8],
}

impl<'a> PayloadSlice<'a> {
    /// Wraps a payload datagram.  Only the 4 byte prefix is required here,
    /// the target region is checked against the header by the assembler.
    pub fn from_slice(slice: &'a [u8]) -> Result<PayloadSlice<'a>, IsysError> {
        if slice.len() < PREFIX_LEN {
            return Err(IsysError::IncompleteTargetData(slice.len(), PREFIX_LEN));
        }

        Ok(PayloadSlice { slice })
    }

    /// Returns the frame id from the payload prefix.
    #[inline]
    pub fn frame_id(&self) -> u16 {
        u16::from_le_bytes([self.slice[0], self.slice[1]])
    }

    /// Returns the packet number from the payload prefix.
    #[inline]
    pub fn packet_number(&self) -> u16 {
        u16::from_le_bytes([self.slice[2], self.slice[3]])
    }

    /// Returns the target region following the prefix.
    #[inline]
    pub fn payload(&self) -> &'a [u8] {
        &self.slice[PREFIX_LEN..]
    }

    /// Returns the number of complete target slots present, capped at the
    /// datagram capacity.
    #[inline]
    pub fn slots(&self) -> usize {
        (self.payload().len() / TARGET_LEN).min(SLOTS_PER_PACKET)
    }

    /// Decodes every complete slot, padding included, in wire order.
    pub fn targets(&self) -> Result<Vec<TargetRecord>, IsysError> {
        let mut cursor = ByteCursor::new(self.payload());
        (0..self.slots())
            .map(|_| TargetRecord::decode(&mut cursor))
            .collect()
    }
}

/// Decodes a header datagram.
pub fn decode_header(slice: &[u8]) -> Result<FrameHeader, IsysError> {
    FrameHeader::decode(&mut ByteCursor::new(slice))
}

/// Encodes a header datagram, zero-filling the reserved region.
pub fn encode_header(header: &FrameHeader) -> [u8; HEADER_LEN] {
    header.into()
}

/// Decodes a single target slot.
pub fn decode_target(slice: &[u8]) -> Result<TargetRecord, IsysError> {
    TargetRecord::decode(&mut ByteCursor::new(slice))
}

/// Encodes a single target slot.
pub fn encode_target(target: &TargetRecord) -> [u8; TARGET_LEN] {
    target.into()
}

// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Synthetic ISYS traffic for simulators and test fixtures.

use crate::{
    checksum::Checksum,
    cursor::ByteWriter,
    eth::{
        encode_header, FrameHeader, IsysError, TargetRecord, HEADER_LEN, PAYLOAD_LEN, PREFIX_LEN,
        SLOTS_PER_PACKET, TARGET_LEN,
    },
};

/// Builds the datagrams of one frame from a list of targets.
///
/// Targets are split across as many payload datagrams as needed, each
/// zero-padded to the full 42 slots.  The header's target count, packet
/// count and checksum are derived from the targets.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameBuilder {
    frame_id: u16,
    firmware: (u16, u16, u16),
    detection_count: Option<u16>,
    targets: Vec<TargetRecord>,
}

impl FrameBuilder {
    /// Starts an empty frame with firmware 1.0.0.
    pub fn new(frame_id: u16) -> FrameBuilder {
        FrameBuilder {
            frame_id,
            firmware: (1, 0, 0),
            detection_count: None,
            targets: Vec::new(),
        }
    }

    /// Firmware version as major, minor, fix.
    pub fn firmware(mut self, major: u16, minor: u16, fix: u16) -> FrameBuilder {
        self.firmware = (major, minor, fix);
        self
    }

    /// Overrides the informational detection count, which otherwise equals
    /// the number of targets.
    pub fn detection_count(mut self, count: u16) -> FrameBuilder {
        self.detection_count = Some(count);
        self
    }

    /// Appends one target.
    pub fn target(mut self, target: TargetRecord) -> FrameBuilder {
        self.targets.push(target);
        self
    }

    /// Appends every target of `targets` in order.
    pub fn targets<I: IntoIterator<Item = TargetRecord>>(mut self, targets: I) -> FrameBuilder {
        self.targets.extend(targets);
        self
    }

    // A frame without targets still carries one all-padding datagram.
    fn packets(&self) -> usize {
        self.targets.len().div_ceil(SLOTS_PER_PACKET).max(1)
    }

    fn payloads(&self) -> Vec<Vec<u8>> {
        (0..self.packets())
            .map(|n| {
                let start = (n * SLOTS_PER_PACKET).min(self.targets.len());
                let end = (start + SLOTS_PER_PACKET).min(self.targets.len());

                let mut writer = ByteWriter::with_capacity(PAYLOAD_LEN);
                writer.put_u16(self.frame_id);
                writer.put_u16(n as u16 + 1);
                for target in &self.targets[start..end] {
                    target.encode(&mut writer);
                }
                writer.put_zeros(PAYLOAD_LEN - writer.len());
                writer.into_inner()
            })
            .collect()
    }

    /// Returns the header describing the frame this builder produces.  Fails
    /// with [`IsysError::TooManyTargets`] when the target count does not fit
    /// the header.
    pub fn header(&self) -> Result<FrameHeader, IsysError> {
        let target_count = u16::try_from(self.targets.len())
            .map_err(|_| IsysError::TooManyTargets(self.targets.len()))?;

        // The checksummed regions of all payloads, concatenated, are exactly
        // the encoded targets.
        let mut writer = ByteWriter::with_capacity(self.targets.len() * TARGET_LEN);
        for target in &self.targets {
            target.encode(&mut writer);
        }
        let mut checksum = Checksum::new();
        checksum.update(writer.as_slice());

        let (fw_major, fw_minor, fw_fix) = self.firmware;
        Ok(FrameHeader {
            frame_id: self.frame_id,
            fw_major,
            fw_fix,
            fw_minor,
            detection_count: self.detection_count.unwrap_or(target_count),
            target_count,
            checksum: checksum.value(),
            bytes_per_target: TARGET_LEN as u16,
            // At most 65535 targets, so at most 1561 packets.
            data_packet_count: self.packets() as u16,
        })
    }

    /// Returns the header datagram followed by the payload datagrams.
    pub fn build(&self) -> Result<(Vec<u8>, Vec<Vec<u8>>), IsysError> {
        let header: [u8; HEADER_LEN] = encode_header(&self.header()?);
        Ok((header.to_vec(), self.payloads()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assembler::{decode_frame, decode_frame_packets, FrameAssembler},
        checksum::checksum,
        eth::{decode_header, PayloadSlice},
    };

    fn targets(n: usize) -> Vec<TargetRecord> {
        (0..n)
            .map(|i| TargetRecord::new(20.0 + i as f32, 5.0 + i as f32, -1.0, 12.0))
            .collect()
    }

    #[test]
    fn test_single_packet() {
        let builder = FrameBuilder::new(7)
            .firmware(1, 2, 3)
            .detection_count(5)
            .targets(targets(2));
        let (header, payloads) = builder.build().unwrap();

        assert_eq!(header.len(), HEADER_LEN);
        assert_eq!(payloads.len(), 1);
        assert_eq!(payloads[0].len(), PAYLOAD_LEN);

        let decoded = decode_header(&header).unwrap();
        assert_eq!(decoded, builder.header().unwrap());
        assert_eq!(decoded.target_count, 2);
        assert_eq!(decoded.detection_count, 5);
        assert_eq!(decoded.firmware_version(), "1.2.3");
        assert_eq!(
            decoded.checksum,
            checksum(&payloads[0][PREFIX_LEN..PREFIX_LEN + 48])
        );

        let payload = PayloadSlice::from_slice(&payloads[0]).unwrap();
        assert_eq!(payload.frame_id(), 7);
        assert_eq!(payload.packet_number(), 1);

        let frame = decode_frame(&header, &payloads[0]).unwrap();
        assert!(frame.checksum_valid);
        assert_eq!(frame.targets, targets(2));
    }

    #[test]
    fn test_empty_frame() {
        let (header, payloads) = FrameBuilder::new(1).build().unwrap();
        assert_eq!(payloads.len(), 1);
        assert!(payloads[0][PREFIX_LEN..].iter().all(|b| *b == 0));

        let decoded = decode_header(&header).unwrap();
        assert_eq!(decoded.checksum, 0);
        assert_eq!(decoded.data_packet_count, 1);

        let frame = decode_frame(&header, &payloads[0]).unwrap();
        assert!(frame.checksum_valid);
        assert!(frame.targets.is_empty());
    }

    #[test]
    fn test_packet_split() {
        for (count, packets) in [(42, 1), (43, 2), (84, 2), (85, 3)] {
            let (header, payloads) = FrameBuilder::new(3)
                .targets(targets(count))
                .build()
                .unwrap();
            assert_eq!(payloads.len(), packets, "{} targets", count);
            assert_eq!(
                decode_header(&header).unwrap().data_packet_count as usize,
                packets
            );

            for (n, payload) in payloads.iter().enumerate() {
                let slice = PayloadSlice::from_slice(payload).unwrap();
                assert_eq!(slice.packet_number() as usize, n + 1);
            }

            let frame = decode_frame_packets(&header, &payloads).unwrap();
            assert!(frame.checksum_valid);
            assert_eq!(frame.targets, targets(count));
        }
    }

    #[test]
    fn test_target_count_limit() {
        let target = TargetRecord::new(1.0, 2.0, 3.0, 4.0);

        let full = FrameBuilder::new(4).targets(vec![target; u16::MAX as usize]);
        let header = full.header().unwrap();
        assert_eq!(header.target_count, u16::MAX);
        assert_eq!(header.data_packet_count, 1561);

        let over = full.target(target);
        assert!(matches!(
            over.header(),
            Err(IsysError::TooManyTargets(65536))
        ));
        assert!(matches!(
            over.build(),
            Err(IsysError::TooManyTargets(65536))
        ));
    }

    #[test]
    fn test_feeds_assembler() {
        let mut assembler = FrameAssembler::new();
        for frame_id in [u16::MAX, 0, 1] {
            let (header, payloads) = FrameBuilder::new(frame_id)
                .targets(targets(3))
                .build()
                .unwrap();
            assert_eq!(assembler.push(&header).unwrap(), None);
            let frame = assembler.push(&payloads[0]).unwrap().unwrap();
            assert_eq!(frame.frame_id(), frame_id);
            assert_eq!(frame.targets.len(), 3);
        }
        assert_eq!(assembler.stats().frames, 3);
    }
}

// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! ISYS Receiver Library
//!
//! This library decodes the UDP target lists transmitted by InnoSenT
//! ISYS-5021 (150 m) traffic radar sensors.
//!
//! # Features
//!
//! - **Wire Codec** - Header and target record codecs over a bounds-checked
//!   little-endian cursor
//! - **Frame Assembly** - Pairing of header and payload datagrams with
//!   byte-sum checksum validation
//! - **Frame Store** - Shared history of verified target lists with JSON
//!   export
//! - **Networking** - UDP receive loop with cooperative cancellation
//! - **Capture Replay** - Decoding of pcapng captures (feature `pcap`)

#![warn(missing_docs)]

/// Bounds-checked little-endian reader and writer
pub mod cursor;

/// Byte-sum checksum of the target region
pub mod checksum;

/// Header, target record and payload datagram codecs
pub mod eth;

/// Frame assembly and decoded frames
pub mod assembler;

/// Shared frame history
pub mod store;

/// Synthetic traffic generation
pub mod synth;

/// Common socket and scheduler utilities
pub mod common;

/// UDP receive and transmit plumbing
pub mod net;

/// pcapng capture replay
#[cfg(feature = "pcap")]
pub mod pcap;

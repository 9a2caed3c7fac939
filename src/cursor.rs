// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Little-endian byte cursor and writer used by the ISYS codecs.

use crate::eth::IsysError;

/// Bounds-checked little-endian reader over a borrowed datagram.
///
/// Every read either consumes exactly the requested number of bytes or fails
/// with [`IsysError::TruncatedBuffer`] without moving the position.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ByteCursor<'a> {
    slice: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    /// Creates a cursor positioned at the start of `slice`.
    pub fn new(slice: &'a [u8]) -> ByteCursor<'a> {
        ByteCursor { slice, pos: 0 }
    }

    /// Returns the current read offset from the start of the buffer.
    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Returns the number of unread bytes.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.slice.len() - self.pos
    }

    /// Returns the unread bytes without consuming them.
    #[inline]
    pub fn rest(&self) -> &'a [u8] {
        &self.slice[self.pos..]
    }

    /// Consumes and returns the next `n` bytes.  Fails with
    /// [`IsysError::TruncatedBuffer`] when fewer than `n` bytes remain.
    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], IsysError> {
        if n > self.remaining() {
            return Err(IsysError::TruncatedBuffer(n, self.remaining()));
        }

        let bytes = &self.slice[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    /// Advances past `n` bytes, used for reserved fields.
    pub fn skip(&mut self, n: usize) -> Result<(), IsysError> {
        self.read_bytes(n).map(|_| ())
    }

    /// Reads a little-endian `u16`.
    #[inline]
    pub fn read_u16(&mut self) -> Result<u16, IsysError> {
        self.read_array().map(u16::from_le_bytes)
    }

    /// Reads a little-endian `u32`.
    #[inline]
    pub fn read_u32(&mut self) -> Result<u32, IsysError> {
        self.read_array().map(u32::from_le_bytes)
    }

    /// Reads a little-endian IEEE-754 `f32`.  Non-finite values are returned
    /// as-is.
    #[inline]
    pub fn read_f32(&mut self) -> Result<f32, IsysError> {
        self.read_array().map(f32::from_le_bytes)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], IsysError> {
        let mut array = [0u8; N];
        array.copy_from_slice(self.read_bytes(N)?);
        Ok(array)
    }
}

/// Append-only little-endian writer used to synthesize datagrams.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    /// Creates an empty writer.
    pub fn new() -> ByteWriter {
        ByteWriter::default()
    }

    /// Creates an empty writer able to hold `capacity` bytes without
    /// reallocating.
    pub fn with_capacity(capacity: usize) -> ByteWriter {
        ByteWriter {
            buf: Vec::with_capacity(capacity),
        }
    }

    /// Appends a little-endian `u16`.
    #[inline]
    pub fn put_u16(&mut self, value: u16) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Appends a little-endian `u32`.
    #[inline]
    pub fn put_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Appends a little-endian `f32`.
    #[inline]
    pub fn put_f32(&mut self, value: f32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Appends `bytes` unchanged.
    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Appends `n` zero bytes, used for reserved fields and slot padding.
    pub fn put_zeros(&mut self, n: usize) {
        self.buf.resize(self.buf.len() + n, 0);
    }

    /// Number of bytes written so far.
    #[inline]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Returns true if nothing has been written.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Borrows the bytes written so far.
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    /// Consumes the writer and returns the encoded bytes.
    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

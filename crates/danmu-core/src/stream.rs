//! Byte-stream reassembly
//!
//! Stream transports hand over arbitrary chunks; [`Reassembler`] buffers
//! them and yields whole packets using the total-length field at the
//! start of each header.

use crate::header::HEADER_SIZE;
use crate::{Error, Result};
use bytes::{Buf, Bytes, BytesMut};

/// Default upper bound on a single packet (16MB)
pub const DEFAULT_MAX_PACKET_SIZE: usize = 16 * 1024 * 1024;

/// Turns a chunked byte stream into complete packets
#[derive(Debug)]
pub struct Reassembler {
    buf: BytesMut,
    max_packet_size: usize,
}

impl Default for Reassembler {
    fn default() -> Self {
        Self::new()
    }
}

impl Reassembler {
    pub fn new() -> Self {
        Self::with_max_packet_size(DEFAULT_MAX_PACKET_SIZE)
    }

    pub fn with_max_packet_size(max_packet_size: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(8192),
            max_packet_size,
        }
    }

    /// Bytes held back waiting for the rest of a packet
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Append a chunk and drain every packet it completes
    ///
    /// A declared length below the header size or above the maximum can
    /// never complete; the buffer is discarded and an error returned, so
    /// the stream has to be closed or resynchronized by the caller.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<Bytes>> {
        self.buf.extend_from_slice(chunk);

        let mut packets = Vec::new();
        while self.buf.len() >= 4 {
            let len = (&self.buf[..4]).get_u32() as usize;

            if len < HEADER_SIZE {
                let declared = len as u32;
                let available = self.buf.len();
                self.buf.clear();
                return Err(Error::InvalidPacketLength {
                    declared,
                    offset: 0,
                    available,
                });
            }
            if len > self.max_packet_size {
                self.buf.clear();
                return Err(Error::FrameTooLarge(len, self.max_packet_size));
            }
            if self.buf.len() < len {
                break;
            }

            packets.push(self.buf.split_to(len).freeze());
        }

        Ok(packets)
    }

    /// Drop any partial packet
    pub fn reset(&mut self) {
        self.buf.clear();
    }
}

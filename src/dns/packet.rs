//! Fixed-capacity datagram buffer.

use std::mem::MaybeUninit;
use std::net::SocketAddr;

use socket2::Socket;

use crate::dns::consts::MAX_PACKET_SIZE;
use crate::error::EncodeError;

/// A single mDNS datagram: a fixed-capacity byte buffer with the current
/// length and the source address captured at receive time.
pub struct Packet {
    len: usize,
    src: Option<SocketAddr>,
    buf: Box<[u8; MAX_PACKET_SIZE]>,
}

impl Packet {
    /// Create an empty packet buffer.
    pub fn new() -> Self {
        Self {
            len: 0,
            src: None,
            buf: Box::new([0u8; MAX_PACKET_SIZE]),
        }
    }

    /// Create a packet holding a copy of `bytes`.
    ///
    /// Panics if `bytes` exceeds the maximum packet size.
    pub fn from_slice(bytes: &[u8]) -> Self {
        let mut packet = Self::new();
        packet.buf[..bytes.len()].copy_from_slice(bytes);
        packet.len = bytes.len();
        packet
    }

    /// The received/assembled bytes.
    pub fn data(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    /// Current byte length.
    pub fn len(&self) -> usize {
        self.len
    }

    /// True when the buffer holds no datagram.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Source address of the last received datagram.
    pub fn src(&self) -> Option<SocketAddr> {
        self.src
    }

    /// Source address formatted for log messages.
    pub fn src_display(&self) -> String {
        match self.src {
            Some(addr) => addr.ip().to_string(),
            None => "unknown".to_string(),
        }
    }

    /// Set the assembled length (encoder use).
    pub(crate) fn set_len(&mut self, len: usize) {
        self.len = len;
    }

    /// Copy `bytes` into the buffer at `offset`, returning the offset
    /// just past the copy.
    pub(crate) fn put(&mut self, offset: usize, bytes: &[u8]) -> Result<usize, EncodeError> {
        let end = offset + bytes.len();
        if end > MAX_PACKET_SIZE {
            return Err(EncodeError::Oversize);
        }
        self.buf[offset..end].copy_from_slice(bytes);
        Ok(end)
    }

    /// Receive one datagram from `socket` into the buffer, recording the
    /// source address.
    pub fn recv_from(&mut self, socket: &Socket) -> std::io::Result<usize> {
        // Safety: the cast only narrows initialization guarantees and
        // recv_from writes exactly the bytes it reports.
        let uninit = unsafe {
            &mut *(self.buf.as_mut() as *mut [u8; MAX_PACKET_SIZE]
                as *mut [MaybeUninit<u8>; MAX_PACKET_SIZE])
        };
        let (len, addr) = socket.recv_from(uninit)?;
        self.len = len;
        self.src = addr.as_socket();
        Ok(len)
    }
}

impl Default for Packet {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_slice_roundtrip() {
        let packet = Packet::from_slice(b"\x00\x01\x02\x03");
        assert_eq!(packet.len(), 4);
        assert_eq!(packet.data(), b"\x00\x01\x02\x03");
        assert!(packet.src().is_none());
        assert_eq!(packet.src_display(), "unknown");
    }

    #[test]
    fn test_put_bounds() {
        let mut packet = Packet::new();
        assert_eq!(packet.put(0, b"abc").unwrap(), 3);
        assert_eq!(packet.put(MAX_PACKET_SIZE - 1, b"z").unwrap(), MAX_PACKET_SIZE);
        assert_eq!(
            packet.put(MAX_PACKET_SIZE - 1, b"zz"),
            Err(EncodeError::Oversize)
        );
    }
}

//! Host protocol framing.
//!
//! Every request and reply is a 4-byte header (application id, verb, payload
//! length little endian) followed by the payload.

use core::fmt::{self, Write as _};

use byteorder::{ByteOrder, LittleEndian};

use crate::error::LinkError;

pub const HEADER_LEN: usize = 4;

/// Size of the shared payload buffer. Longer payloads are read and dropped.
pub const PAYLOAD_CAPACITY: usize = 256;

/// Reply verb for a failed request.
pub const NOK: u8 = 0x7E;

/// Application id and verb of a debug text frame.
pub const DEBUG_APP: u8 = 0xFF;
pub const DEBUG_STR: u8 = 0xFF;

const DEBUG_LINE_LEN: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub app: u8,
    pub verb: u8,
    pub len: u16,
}

impl Header {
    pub fn parse(bytes: &[u8; HEADER_LEN]) -> Self {
        Header {
            app: bytes[0],
            verb: bytes[1],
            len: LittleEndian::read_u16(&bytes[2..]),
        }
    }

    pub fn to_bytes(self) -> [u8; HEADER_LEN] {
        let mut bytes = [self.app, self.verb, 0, 0];
        LittleEndian::write_u16(&mut bytes[2..], self.len);
        bytes
    }
}

/// Where handlers send their reply frames.
pub trait ReplySink {
    /// Write one complete frame.
    fn send(&mut self, app: u8, verb: u8, payload: &[u8]) -> Result<(), LinkError>;

    fn nok(&mut self, app: u8) -> Result<(), LinkError> {
        self.send(app, NOK, &[])
    }

    /// Formatted debug text, truncated to 64 bytes.
    fn debug_fmt(&mut self, args: fmt::Arguments<'_>) -> Result<(), LinkError> {
        let mut line = DebugLine::new();
        let _ = line.write_fmt(args);
        self.send(DEBUG_APP, DEBUG_STR, line.as_bytes())
    }
}

struct DebugLine {
    buf: [u8; DEBUG_LINE_LEN],
    len: usize,
}

impl DebugLine {
    fn new() -> Self {
        DebugLine {
            buf: [0; DEBUG_LINE_LEN],
            len: 0,
        }
    }

    fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }
}

impl fmt::Write for DebugLine {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let room = DEBUG_LINE_LEN - self.len;
        let take = s.len().min(room);
        self.buf[self.len..self.len + take].copy_from_slice(&s.as_bytes()[..take]);
        self.len += take;
        if take < s.len() {
            Err(fmt::Error)
        } else {
            Ok(())
        }
    }
}

/// Exclusive use of the payload buffer for one request/reply cycle.
///
/// The request payload is read from the buffer and the reply is built in the same
/// place. Only one `Exchange` can exist at a time, since it holds the buffer's
/// only mutable borrow.
pub struct Exchange<'a> {
    buf: &'a mut [u8; PAYLOAD_CAPACITY],
    len: usize,
}

impl<'a> Exchange<'a> {
    pub fn new(buf: &'a mut [u8; PAYLOAD_CAPACITY], len: usize) -> Self {
        Exchange {
            buf,
            len: len.min(PAYLOAD_CAPACITY),
        }
    }

    /// The request payload.
    pub fn payload(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    /// The whole buffer, for building the reply.
    pub fn buffer_mut(&mut self) -> &mut [u8; PAYLOAD_CAPACITY] {
        &mut *self.buf
    }

    /// Send the first `len` bytes of the buffer as the reply payload.
    pub fn reply(
        &self,
        sink: &mut dyn ReplySink,
        app: u8,
        verb: u8,
        len: usize,
    ) -> Result<(), LinkError> {
        sink.send(app, verb, &self.buf[..len.min(PAYLOAD_CAPACITY)])
    }
}

//! The host-facing loop: frame assembly, dispatch by application id, replies.

use hal::serial;
use log::{debug, trace, warn};

use crate::config::Config;
use crate::error::{FramingError, LinkError};
use crate::frame::{Exchange, Header, ReplySink, HEADER_LEN, PAYLOAD_CAPACITY};
use crate::timer::Countdown;

/// A host application, selected by the first header byte.
pub trait Handler {
    fn app(&self) -> u8;

    /// Serve one request. `exchange` holds the request payload and is where the reply
    /// is built; any number of frames may be sent to `replies`.
    fn handle(
        &mut self,
        verb: u8,
        exchange: Exchange<'_>,
        replies: &mut dyn ReplySink,
    ) -> Result<(), LinkError>;
}

/// Frames replies onto the byte link.
pub struct Replies<'a, S> {
    link: &'a mut S,
}

impl<'a, S: serial::Write<u8>> Replies<'a, S> {
    pub fn new(link: &'a mut S) -> Self {
        Replies { link }
    }
}

impl<S: serial::Write<u8>> ReplySink for Replies<'_, S> {
    fn send(&mut self, app: u8, verb: u8, payload: &[u8]) -> Result<(), LinkError> {
        let header = Header {
            app,
            verb,
            len: payload.len() as u16,
        };
        for &byte in header.to_bytes().iter().chain(payload) {
            nb::block!(self.link.write(byte)).map_err(|_| LinkError)?;
        }
        nb::block!(self.link.flush()).map_err(|_| LinkError)
    }
}

/// Reads frames from a byte link and hands them to the registered handlers.
///
/// Every byte wait is bounded by the countdown, so a host that disappears in the
/// middle of a frame only costs one timeout.
pub struct Adapter<S, T> {
    link: S,
    timer: T,
    config: Config,
    header: [u8; HEADER_LEN],
    filled: usize,
    /// A header abort is answered with NOK once at least this many bytes were
    /// received. Starts at 0 so the first idle timeout announces the adapter.
    nok_threshold: usize,
    buffer: [u8; PAYLOAD_CAPACITY],
}

impl<S, T> Adapter<S, T>
where
    S: serial::Read<u8> + serial::Write<u8>,
    T: Countdown,
{
    pub fn new(link: S, timer: T, config: Config) -> Self {
        Adapter {
            link,
            timer,
            config,
            header: [0; HEADER_LEN],
            filled: 0,
            nok_threshold: 0,
            buffer: [0; PAYLOAD_CAPACITY],
        }
    }

    pub fn link(&self) -> &S {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut S {
        &mut self.link
    }

    pub fn free(self) -> (S, T) {
        (self.link, self.timer)
    }

    /// Wait for one byte, polling until the countdown expires.
    fn fetch(&mut self) -> Result<u8, FramingError> {
        self.timer.arm(self.config.rx_timeout_ticks);
        loop {
            match self.link.read() {
                Ok(byte) => return Ok(byte),
                Err(nb::Error::WouldBlock) => {
                    if self.timer.expired() {
                        return Err(FramingError::Timeout);
                    }
                }
                Err(nb::Error::Other(_)) => return Err(FramingError::Transport),
            }
        }
    }

    fn nok(&mut self, app: u8) -> Result<(), LinkError> {
        Replies::new(&mut self.link).nok(app)
    }

    /// Read a declared payload into the buffer. Everything is consumed so the
    /// stream stays in step, even when it does not fit.
    fn receive_payload(&mut self, len: u16) -> Result<(), FramingError> {
        let mut result = Ok(());
        for i in 0..usize::from(len) {
            let byte = self.fetch()?;
            if i < PAYLOAD_CAPACITY {
                self.buffer[i] = byte;
            } else {
                result = Err(FramingError::Oversized(len));
            }
        }
        result
    }

    /// One turn of the loop: take one header byte and, once the header is complete,
    /// receive, dispatch and answer the whole frame.
    pub fn poll(&mut self, handlers: &mut [&mut dyn Handler]) -> Result<(), LinkError> {
        let byte = match self.fetch() {
            Ok(byte) => byte,
            Err(e) => {
                let partial = self.filled;
                self.filled = 0;
                if partial >= self.nok_threshold {
                    debug!("dropping {} header bytes: {}", partial, e);
                    self.nok_threshold = 1;
                    let app = self.config.default_app;
                    return self.nok(app);
                }
                return Ok(());
            }
        };

        self.header[self.filled] = byte;
        self.filled += 1;
        if self.filled < HEADER_LEN {
            return Ok(());
        }
        self.filled = 0;

        let header = Header::parse(&self.header);
        trace!("frame {:?}", header);
        self.timer.indicate(self.config.indicator_ticks);
        match self.receive_payload(header.len) {
            Ok(()) => self.dispatch(header, handlers),
            Err(e) => {
                warn!("dropping frame for app {:#04x}: {}", header.app, e);
                self.nok(header.app)
            }
        }
    }

    fn dispatch(&mut self, header: Header, handlers: &mut [&mut dyn Handler]) -> Result<(), LinkError> {
        let mut replies = Replies::new(&mut self.link);
        let exchange = Exchange::new(&mut self.buffer, usize::from(header.len));
        match handlers.iter_mut().find(|h| h.app() == header.app) {
            Some(handler) => handler.handle(header.verb, exchange, &mut replies),
            None => {
                debug!("no application {:#04x}", header.app);
                replies.nok(header.app)
            }
        }
    }

    /// Serve the host forever. Errors are logged and the loop carries on.
    pub fn run(&mut self, handlers: &mut [&mut dyn Handler]) -> ! {
        loop {
            if let Err(e) = self.poll(handlers) {
                warn!("{}", e);
            }
        }
    }
}

//! The JTAG host application.

use byteorder::{ByteOrder, LittleEndian};
use log::warn;

use crate::adapter::Handler;
use crate::error::{LinkError, TapError, TapResult};
use crate::frame::{Exchange, ReplySink};
use crate::pins::JtagPins;
use crate::tap::{ShiftFlags, TapEngine};
use crate::timer::TickGate;

pub const JTAG_APP: u8 = 0x10;

/// Shift-IR. Payload `[bits, flags, data...]`, data little endian.
pub const IR_SHIFT: u8 = 0x80;
/// Shift-DR, same payload as [`IR_SHIFT`].
pub const DR_SHIFT: u8 = 0x81;
pub const RESET_TAP: u8 = 0x82;
pub const RESET_TARGET: u8 = 0x83;
pub const DETECT_IR_WIDTH: u8 = 0x84;
pub const DETECT_CHAIN_LENGTH: u8 = 0x85;
pub const GET_DEVICE_ID: u8 = 0x86;
/// Continue a DR_SHIFT that was sent with the hold flag, for registers wider than 32 bits.
pub const DR_SHIFT_MORE: u8 = 0x87;

/// Configure the pins.
pub const SETUP: u8 = 0x10;
/// Configure the pins and reset the TAP.
pub const START: u8 = 0x20;
/// Release the pins.
pub const STOP: u8 = 0x21;

/// Reply payload of a probe that found nothing.
pub const NOT_FOUND: u16 = 0xFFFF;

enum Outcome {
    /// Reply with the same verb and this many bytes of the buffer.
    Reply(usize),
    /// The request itself was malformed.
    Nok,
}

pub struct JtagApp<P, G = ()> {
    tap: TapEngine<P, G>,
}

impl<P: JtagPins, G: TickGate> JtagApp<P, G> {
    pub fn new(tap: TapEngine<P, G>) -> Self {
        JtagApp { tap }
    }

    pub fn tap(&mut self) -> &mut TapEngine<P, G> {
        &mut self.tap
    }

    pub fn free(self) -> TapEngine<P, G> {
        self.tap
    }

    fn shift(&mut self, verb: u8, exchange: &mut Exchange<'_>) -> TapResult<Outcome, P::Error> {
        let payload = exchange.payload();
        if payload.len() < 2 {
            return Ok(Outcome::Nok);
        }
        let bits = payload[0];
        let flags = ShiftFlags::from_bits_truncate(payload[1]);
        if bits == 0 || bits > 32 {
            return Err(TapError::BitCount(bits));
        }

        let bytes = (usize::from(bits) + 7) / 8;
        let mut data = [0u8; 4];
        let given = (payload.len() - 2).min(bytes);
        data[..given].copy_from_slice(&payload[2..2 + given]);
        let word = LittleEndian::read_u32(&data);

        let captured = match verb {
            IR_SHIFT => self.tap.shift_ir(word, bits, flags)?,
            DR_SHIFT => self.tap.shift_dr(word, bits, flags)?,
            _ => self.tap.shift_dr_more(word, bits, flags)?,
        };

        LittleEndian::write_u32(&mut data, captured);
        exchange.buffer_mut()[2..2 + bytes].copy_from_slice(&data[..bytes]);
        Ok(Outcome::Reply(2 + bytes))
    }

    fn probe_reply(exchange: &mut Exchange<'_>, found: Option<u16>) -> Outcome {
        LittleEndian::write_u16(exchange.buffer_mut(), found.unwrap_or(NOT_FOUND));
        Outcome::Reply(2)
    }

    fn run(&mut self, verb: u8, exchange: &mut Exchange<'_>) -> TapResult<Outcome, P::Error> {
        match verb {
            IR_SHIFT | DR_SHIFT | DR_SHIFT_MORE => self.shift(verb, exchange),
            RESET_TAP => {
                self.tap.reset_tap()?;
                Ok(Outcome::Reply(0))
            }
            RESET_TARGET => {
                self.tap.pulse_target_reset()?;
                Ok(Outcome::Reply(0))
            }
            DETECT_IR_WIDTH => {
                let width = self.tap.probe_ir_width()?;
                Ok(Self::probe_reply(exchange, width))
            }
            DETECT_CHAIN_LENGTH => {
                let length = self.tap.probe_chain_length()?;
                Ok(Self::probe_reply(exchange, length))
            }
            GET_DEVICE_ID => {
                let chip = match exchange.payload() {
                    [] => return Ok(Outcome::Nok),
                    [index] => u16::from(*index),
                    index => LittleEndian::read_u16(index),
                };
                let id = self.tap.read_device_id(chip)?;
                LittleEndian::write_u32(exchange.buffer_mut(), id);
                Ok(Outcome::Reply(4))
            }
            SETUP => {
                self.tap.initialize_pins()?;
                Ok(Outcome::Reply(0))
            }
            START => {
                self.tap.initialize_pins()?;
                self.tap.reset_tap()?;
                Ok(Outcome::Reply(0))
            }
            STOP => {
                self.tap.release_pins()?;
                Ok(Outcome::Reply(0))
            }
            _ => Ok(Outcome::Nok),
        }
    }
}

impl<P: JtagPins, G: TickGate> Handler for JtagApp<P, G> {
    fn app(&self) -> u8 {
        JTAG_APP
    }

    fn handle(
        &mut self,
        verb: u8,
        mut exchange: Exchange<'_>,
        replies: &mut dyn ReplySink,
    ) -> Result<(), LinkError> {
        match self.run(verb, &mut exchange) {
            Ok(Outcome::Reply(len)) => exchange.reply(replies, JTAG_APP, verb, len),
            Ok(Outcome::Nok) => {
                warn!("malformed or unknown JTAG request {:#04x}", verb);
                replies.nok(JTAG_APP)
            }
            Err(e) => {
                warn!("JTAG request {:#04x} failed: {}", verb, e);
                if let TapError::Transition { .. } | TapError::NotShifting(_) = e {
                    replies.debug_fmt(format_args!("{}", e))?;
                }
                replies.nok(JTAG_APP)
            }
        }
    }
}

//! Bit-banged TAP controller.
//!
//! [`TapEngine`] owns the only copy of the TAP state and is the only thing that
//! clocks TCK, so the tracked state follows the physical one edge for edge.
//! Operations whose precondition does not hold fail with
//! [`TapError::Transition`] or [`TapError::NotShifting`] before any pin moves.

use bitflags::bitflags;
use log::trace;

use crate::config::Config;
use crate::error::{TapError, TapResult};
use crate::pins::{JtagPins, Signal};
use crate::state::TapState;
use crate::timer::TickGate;

bitflags! {
    /// Options for [`TapEngine::shift_bits`]. The wire encoding is the raw bits.
    pub struct ShiftFlags: u8 {
        /// Most significant bit first (the default, no bits set).
        const MSB = 0x0;
        /// Least significant bit first.
        const LSB = 0x1;
        /// Stay in Shift-IR/Shift-DR after the last bit so a later call can continue.
        const HOLD = 0x2;
        /// Stop in Update-IR/Update-DR instead of returning to Run-Test/Idle.
        const NO_RETURN_IDLE = 0x4;
    }
}

pub struct TapEngine<P, G = ()> {
    pub(crate) pins: P,
    gate: G,
    pub(crate) config: Config,
    state: TapState,
    tms: bool,
    pub(crate) tdi: bool,
}

impl<P: JtagPins, G: TickGate> TapEngine<P, G> {
    /// The TAP state is unknown until [`reset_tap`](Self::reset_tap) is called.
    pub fn new(pins: P, gate: G, config: Config) -> Self {
        TapEngine {
            pins,
            gate,
            config,
            state: TapState::Unknown,
            tms: false,
            tdi: false,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self) -> TapState {
        self.state
    }

    pub fn in_dr(&self) -> bool {
        self.state.is_dr()
    }

    pub fn in_ir(&self) -> bool {
        self.state.is_ir()
    }

    pub fn in_run_idle(&self) -> bool {
        self.state == TapState::RunIdle
    }

    pub fn in_state(&self, state: TapState) -> bool {
        self.state == state
    }

    /// Forget the TAP state, e.g. after the lines were released.
    pub(crate) fn lose_state(&mut self) {
        self.state = TapState::Unknown;
    }

    pub fn pins(&self) -> &P {
        &self.pins
    }

    /// Give the pins back.
    pub fn free(self) -> P {
        self.pins
    }

    /// Run `f` with the tick source suspended.
    pub(crate) fn quiet<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> TapResult<T, P::Error>,
    ) -> TapResult<T, P::Error> {
        self.gate.suspend();
        let result = f(self);
        self.gate.resume();
        result
    }

    pub(crate) fn delay(&mut self, us: u32) {
        if us != 0 {
            self.pins.delay_us(us);
        }
    }

    pub(crate) fn set_tdi(&mut self, high: bool) -> TapResult<(), P::Error> {
        self.pins.drive(Signal::Tdi, high)?;
        self.tdi = high;
        Ok(())
    }

    pub(crate) fn set_tms(&mut self, high: bool) -> TapResult<(), P::Error> {
        self.pins.drive(Signal::Tms, high)?;
        self.tms = high;
        Ok(())
    }

    /// One full TCK period: rising edge, half period, falling edge, half period.
    ///
    /// The TAP advances on the rising edge according to the current TMS level.
    /// Ticks are suspended for the period.
    pub fn pulse_clock(&mut self) -> TapResult<(), P::Error> {
        let half = self.config.tck_half_period_us;
        self.quiet(|tap| {
            tap.pins.drive(Signal::Tck, true)?;
            tap.state = tap.state.advance(tap.tms);
            tap.delay(half);
            tap.pins.drive(Signal::Tck, false)?;
            tap.delay(half);
            Ok(())
        })
    }

    /// Clock once with TMS at `tms`.
    pub fn clock_tms(&mut self, tms: bool) -> TapResult<(), P::Error> {
        self.set_tms(tms)?;
        self.pulse_clock()
    }

    /// Put the TAP into Run-Test/Idle from any state, including an unknown one.
    pub fn reset_tap(&mut self) -> TapResult<(), P::Error> {
        self.quiet(|tap| {
            tap.set_tms(true)?;
            for _ in 0..5 {
                tap.pulse_clock()?;
            }
            // Five TMS=1 clocks reach Test-Logic-Reset from anywhere.
            tap.state = TapState::Reset;
            tap.clock_tms(false)
        })?;
        trace!("TAP reset");
        Ok(())
    }

    fn walk_to(&mut self, to: TapState) -> TapResult<(), P::Error> {
        let from = self.state;
        let path = from
            .path_to(to)
            .ok_or(TapError::Transition { from, to })?;
        self.quiet(|tap| {
            for tms in path.levels() {
                tap.clock_tms(tms)?;
            }
            Ok(())
        })?;
        debug_assert_eq!(self.state, to);
        Ok(())
    }

    /// Move to Capture-DR. Only valid from Run-Test/Idle, an Update state or Select-DR-Scan.
    pub fn enter_capture_dr(&mut self) -> TapResult<(), P::Error> {
        match self.state {
            TapState::RunIdle | TapState::UpdateDR | TapState::UpdateIR | TapState::SelectDR => {
                self.walk_to(TapState::CaptureDR)
            }
            from => Err(TapError::Transition {
                from,
                to: TapState::CaptureDR,
            }),
        }
    }

    /// Move to Capture-IR. Valid where Capture-DR is, and from Select-IR-Scan.
    pub fn enter_capture_ir(&mut self) -> TapResult<(), P::Error> {
        match self.state {
            TapState::RunIdle
            | TapState::UpdateDR
            | TapState::UpdateIR
            | TapState::SelectDR
            | TapState::SelectIR => self.walk_to(TapState::CaptureIR),
            from => Err(TapError::Transition {
                from,
                to: TapState::CaptureIR,
            }),
        }
    }

    /// Capture-IR/Capture-DR to the matching Shift state.
    pub fn enter_shift(&mut self) -> TapResult<(), P::Error> {
        match self.state {
            TapState::CaptureDR | TapState::CaptureIR => self.clock_tms(false),
            from => Err(TapError::Transition {
                from,
                to: if from.is_ir() {
                    TapState::ShiftIR
                } else {
                    TapState::ShiftDR
                },
            }),
        }
    }

    /// Back to Run-Test/Idle by the shortest path that avoids Test-Logic-Reset.
    pub fn return_to_idle(&mut self) -> TapResult<(), P::Error> {
        self.walk_to(TapState::RunIdle)
    }

    /// Shift `bits` bits of `word` through the selected register, returning what came out.
    ///
    /// The result has the same orientation as `word`. Without [`ShiftFlags::HOLD`]
    /// TMS goes high with the last bit and the TAP continues through Update
    /// (and on to Run-Test/Idle unless [`ShiftFlags::NO_RETURN_IDLE`] is set).
    /// The TDI level from before the shift is restored afterwards.
    pub fn shift_bits(&mut self, word: u32, bits: u8, flags: ShiftFlags) -> TapResult<u32, P::Error> {
        if bits == 0 || bits > 32 {
            return Err(TapError::BitCount(bits));
        }
        if !self.state.is_shift() {
            return Err(TapError::NotShifting(self.state));
        }

        let lsb_first = flags.contains(ShiftFlags::LSB);
        let exit = !flags.contains(ShiftFlags::HOLD);

        self.quiet(|tap| {
            let saved_tclk = tap.tdi;
            let mut captured = 0u32;

            tap.set_tms(false)?;
            for i in 0..bits {
                let pos = if lsb_first { i } else { bits - 1 - i };
                tap.set_tdi(word & (1 << pos) != 0)?;
                if exit && i == bits - 1 {
                    tap.set_tms(true)?;
                }
                if tap.pins.tdo()? {
                    captured |= 1 << pos;
                }
                tap.pulse_clock()?;
            }
            tap.set_tdi(saved_tclk)?;

            if exit {
                // Exit1 -> Update
                tap.clock_tms(true)?;
                if !flags.contains(ShiftFlags::NO_RETURN_IDLE) {
                    tap.clock_tms(false)?;
                }
            }
            Ok(captured)
        })
    }

    /// Shift 8 bits MSB first; the TAP must already be in a Shift state.
    pub fn shift_byte(&mut self, byte: u8) -> TapResult<u8, P::Error> {
        Ok(self.shift_bits(byte.into(), 8, ShiftFlags::MSB)? as u8)
    }

    /// Shift 16 bits MSB first; the TAP must already be in a Shift state.
    pub fn shift_word(&mut self, word: u16) -> TapResult<u16, P::Error> {
        Ok(self.shift_bits(word.into(), 16, ShiftFlags::MSB)? as u16)
    }

    /// Capture-IR, Shift-IR, then shift `bits` bits.
    pub fn shift_ir(&mut self, word: u32, bits: u8, flags: ShiftFlags) -> TapResult<u32, P::Error> {
        self.enter_capture_ir()?;
        self.enter_shift()?;
        self.shift_bits(word, bits, flags)
    }

    /// Capture-DR, Shift-DR, then shift `bits` bits.
    pub fn shift_dr(&mut self, word: u32, bits: u8, flags: ShiftFlags) -> TapResult<u32, P::Error> {
        self.enter_capture_dr()?;
        self.enter_shift()?;
        self.shift_bits(word, bits, flags)
    }

    /// Continue a data register scan left in Shift-DR by [`ShiftFlags::HOLD`].
    pub fn shift_dr_more(&mut self, word: u32, bits: u8, flags: ShiftFlags) -> TapResult<u32, P::Error> {
        if self.state != TapState::ShiftDR {
            return Err(TapError::Transition {
                from: self.state,
                to: TapState::ShiftDR,
            });
        }
        self.shift_bits(word, bits, flags)
    }

    /// Full 8-bit instruction scan, ending in Run-Test/Idle.
    pub fn shift_instruction8(&mut self, instruction: u8) -> TapResult<u8, P::Error> {
        self.enter_capture_ir()?;
        self.enter_shift()?;
        self.shift_byte(instruction)
    }

    /// Full 16-bit data scan, ending in Run-Test/Idle.
    pub fn shift_data16(&mut self, data: u16) -> TapResult<u16, P::Error> {
        self.enter_capture_dr()?;
        self.enter_shift()?;
        self.shift_word(data)
    }
}

//! Target-side pin control: setup, release, reset and the auxiliary programming clock.

use log::debug;

use crate::error::TapResult;
use crate::pins::{JtagPins, Signal};
use crate::tap::TapEngine;
use crate::timer::TickGate;

impl<P: JtagPins, G: TickGate> TapEngine<P, G> {
    /// Drive every JTAG line to its idle level. Safe to call repeatedly.
    ///
    /// TCK idles low, TMS and TDI high, the test strap low and reset deasserted.
    pub fn initialize_pins(&mut self) -> TapResult<(), P::Error> {
        self.pins.drive(Signal::Tck, false)?;
        self.set_tms(true)?;
        self.set_tdi(true)?;
        self.pins.drive(Signal::TestStrap, false)?;
        self.pins.drive(Signal::Reset, true)?;
        debug!("JTAG pins initialized");
        Ok(())
    }

    /// Let go of the target. The TAP state is unknown afterwards.
    pub fn release_pins(&mut self) -> TapResult<(), P::Error> {
        self.pins.release()?;
        self.tdi = false;
        self.lose_state();
        debug!("JTAG pins released");
        Ok(())
    }

    /// Hold the (active-low) target reset for the configured time.
    pub fn pulse_target_reset(&mut self) -> TapResult<(), P::Error> {
        self.pins.drive(Signal::Reset, false)?;
        let hold = self.config.reset_pulse_us;
        self.delay(hold);
        self.pins.drive(Signal::Reset, true)?;
        Ok(())
    }

    pub fn set_test_strap(&mut self, high: bool) -> TapResult<(), P::Error> {
        self.pins.drive(Signal::TestStrap, high)?;
        Ok(())
    }

    /// Drive the auxiliary programming clock, which shares the TDI line.
    ///
    /// The level is remembered and restored after every shift.
    pub fn set_tclk(&mut self, high: bool) -> TapResult<(), P::Error> {
        self.set_tdi(high)
    }

    pub fn tclk(&self) -> bool {
        self.tdi
    }

    /// Emit `count` programming clock periods on TDI with ticks suspended, then put
    /// the line back where it was.
    pub fn tclk_flash_pulses(&mut self, count: u32) -> TapResult<(), P::Error> {
        let half = self.config.flash_half_period_us;
        self.quiet(|tap| {
            let saved_tclk = tap.tdi;
            for _ in 0..count {
                tap.pins.drive(Signal::Tdi, true)?;
                tap.delay(half);
                tap.pins.drive(Signal::Tdi, false)?;
                tap.delay(half);
            }
            tap.set_tdi(saved_tclk)
        })
    }
}

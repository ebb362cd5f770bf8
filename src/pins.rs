//! The GPIO capability the TAP engine drives.

use core::fmt;

use hal::blocking::delay::DelayUs;
use hal::digital::v2::{InputPin, OutputPin};

/// The output signals an adapter drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Tms,
    /// Also used as the auxiliary programming clock (TCLK) on some targets.
    Tdi,
    Tck,
    /// Target reset, active low.
    Reset,
    /// Test-mode strap (MSP430 `TEST`).
    TestStrap,
}

/// Named JTAG signals plus a busy-wait delay.
///
/// Boards whose pins can be switched to high impedance at run time should
/// implement this directly so that [`release`](JtagPins::release) really lets go of
/// the lines; [`GpioPins`] covers the common case of plain embedded-hal pins.
pub trait JtagPins {
    type Error: fmt::Debug;

    fn drive(&mut self, signal: Signal, high: bool) -> Result<(), Self::Error>;

    /// Sample TDO.
    fn tdo(&mut self) -> Result<bool, Self::Error>;

    fn delay_us(&mut self, us: u32);

    /// Put every line in its released (non-debug) state.
    fn release(&mut self) -> Result<(), Self::Error>;
}

/// [`JtagPins`] over embedded-hal digital pins sharing one error type.
/// The pins can be any pins you want, just make sure you assign them correctly.
pub struct GpioPins<
    E,
    TMS: OutputPin<Error = E>,
    TDI: OutputPin<Error = E>,
    TDO: InputPin<Error = E>,
    TCK: OutputPin<Error = E>,
    RST: OutputPin<Error = E>,
    TST: OutputPin<Error = E>,
    D: DelayUs<u32>,
> {
    tms: TMS,
    tdi: TDI,
    tdo: TDO,
    tck: TCK,
    rst: RST,
    tst: TST,
    delay: D,
}

impl<E, TMS, TDI, TDO, TCK, RST, TST, D> GpioPins<E, TMS, TDI, TDO, TCK, RST, TST, D>
where
    TMS: OutputPin<Error = E>,
    TDI: OutputPin<Error = E>,
    TDO: InputPin<Error = E>,
    TCK: OutputPin<Error = E>,
    RST: OutputPin<Error = E>,
    TST: OutputPin<Error = E>,
    D: DelayUs<u32>,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(tms: TMS, tdi: TDI, tdo: TDO, tck: TCK, rst: RST, tst: TST, delay: D) -> Self {
        GpioPins {
            tms,
            tdi,
            tdo,
            tck,
            rst,
            tst,
            delay,
        }
    }

    /// Give the pins back.
    pub fn free(self) -> (TMS, TDI, TDO, TCK, RST, TST, D) {
        (
            self.tms, self.tdi, self.tdo, self.tck, self.rst, self.tst, self.delay,
        )
    }
}

fn set<P: OutputPin>(pin: &mut P, high: bool) -> Result<(), P::Error> {
    if high {
        pin.set_high()
    } else {
        pin.set_low()
    }
}

impl<E, TMS, TDI, TDO, TCK, RST, TST, D> JtagPins for GpioPins<E, TMS, TDI, TDO, TCK, RST, TST, D>
where
    E: fmt::Debug,
    TMS: OutputPin<Error = E>,
    TDI: OutputPin<Error = E>,
    TDO: InputPin<Error = E>,
    TCK: OutputPin<Error = E>,
    RST: OutputPin<Error = E>,
    TST: OutputPin<Error = E>,
    D: DelayUs<u32>,
{
    type Error = E;

    #[inline]
    fn drive(&mut self, signal: Signal, high: bool) -> Result<(), E> {
        match signal {
            Signal::Tms => set(&mut self.tms, high),
            Signal::Tdi => set(&mut self.tdi, high),
            Signal::Tck => set(&mut self.tck, high),
            Signal::Reset => set(&mut self.rst, high),
            Signal::TestStrap => set(&mut self.tst, high),
        }
    }

    #[inline]
    fn tdo(&mut self) -> Result<bool, E> {
        self.tdo.is_high()
    }

    #[inline]
    fn delay_us(&mut self, us: u32) {
        self.delay.delay_us(us);
    }

    /// Plain push-pull pins cannot float, so park them low with reset deasserted.
    fn release(&mut self) -> Result<(), E> {
        self.tms.set_low()?;
        self.tdi.set_low()?;
        self.tck.set_low()?;
        self.tst.set_low()?;
        self.rst.set_high()
    }
}

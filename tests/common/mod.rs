//! A simulated JTAG scan chain behind embedded-hal pins, and a scripted host link.
#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::convert::Infallible;
use std::rc::Rc;

use embedded_hal::blocking::delay::DelayUs;
use embedded_hal::digital::v2::{InputPin, OutputPin};
use embedded_hal::serial;

use goodfet_jtag::frame::{Header, HEADER_LEN};
use goodfet_jtag::timer::{Countdown, TickGate};
use goodfet_jtag::{Config, GpioPins, SlowTimer, TapEngine, TapState};

pub const IDCODE: u64 = 0x1;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Test configuration: no delays, short probes.
pub fn config() -> Config {
    Config {
        tck_half_period_us: 0,
        probe_limit: 64,
        reset_pulse_us: 10,
        ..Config::default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Chain,
    /// TDO follows TDI with no register in between.
    Loopback,
    StuckHigh,
}

/// One TAP in the chain.
#[derive(Debug, Clone)]
pub struct Device {
    pub ir_len: u8,
    pub idcode: Option<u32>,
    instruction: u64,
    ir: u64,
    dr: u64,
    dr_len: u8,
}

impl Device {
    pub fn new(ir_len: u8, idcode: Option<u32>) -> Self {
        let mut device = Device {
            ir_len,
            idcode,
            instruction: 0,
            ir: 0,
            dr: 0,
            dr_len: 1,
        };
        device.reset();
        device
    }

    fn reset(&mut self) {
        self.instruction = if self.idcode.is_some() {
            IDCODE
        } else {
            self.bypass()
        };
    }

    fn bypass(&self) -> u64 {
        (1 << self.ir_len) - 1
    }

    pub fn instruction(&self) -> u64 {
        self.instruction
    }

    fn capture_dr(&mut self) {
        match self.idcode {
            Some(id) if self.instruction == IDCODE => {
                self.dr = id.into();
                self.dr_len = 32;
            }
            _ => {
                self.dr = 0;
                self.dr_len = 1;
            }
        }
    }

    fn capture_ir(&mut self) {
        self.ir = 0b01;
    }

    fn shift(reg: &mut u64, len: u8, tdi: bool) -> bool {
        let out = *reg & 1 != 0;
        *reg = (*reg >> 1) | (u64::from(tdi) << (len - 1));
        out
    }
}

/// Everything on the far side of the pins.
pub struct Chain {
    pub mode: Mode,
    /// Ordered from the TDO end.
    pub devices: Vec<Device>,
    pub state: TapState,
    tms: bool,
    pub tdi: bool,
    tck: bool,
    tdo: bool,
    pub reset: bool,
    pub test_strap: bool,
    /// Rising TDI edges while TCK was low.
    pub tdi_pulses: usize,
    pub reset_pulses: usize,
    pub clocks: usize,
    pub delay_us: u64,
    timer: Option<&'static SlowTimer>,
    /// Rising TCK edges seen while the tick source was running.
    pub unsuspended_clocks: usize,
}

impl Chain {
    pub fn new(devices: Vec<Device>) -> Self {
        Chain {
            mode: Mode::Chain,
            devices,
            state: TapState::Reset,
            tms: false,
            tdi: false,
            tck: false,
            tdo: false,
            reset: true,
            test_strap: false,
            tdi_pulses: 0,
            reset_pulses: 0,
            clocks: 0,
            delay_us: 0,
            timer: None,
            unsuspended_clocks: 0,
        }
    }

    pub fn with_mode(mode: Mode) -> Self {
        Chain {
            mode,
            ..Chain::new(Vec::new())
        }
    }

    pub fn watch(&mut self, timer: &'static SlowTimer) {
        self.timer = Some(timer);
    }

    fn tdo(&self) -> bool {
        match self.mode {
            Mode::Chain => self.tdo,
            Mode::Loopback => self.tdi,
            Mode::StuckHigh => true,
        }
    }

    fn drive(&mut self, pin: Pin, high: bool) {
        match pin {
            Pin::Tms => self.tms = high,
            Pin::Tdi => {
                if high && !self.tdi && !self.tck {
                    self.tdi_pulses += 1;
                }
                self.tdi = high;
            }
            Pin::Tck => {
                match (self.tck, high) {
                    (false, true) => self.rising(),
                    (true, false) => self.falling(),
                    _ => {}
                }
                self.tck = high;
            }
            Pin::Reset => {
                if self.reset && !high {
                    self.reset_pulses += 1;
                }
                self.reset = high;
            }
            Pin::TestStrap => self.test_strap = high,
        }
    }

    fn shift_chain(&mut self, ir: bool) {
        let mut carry = self.tdi;
        for device in self.devices.iter_mut().rev() {
            carry = if ir {
                Device::shift(&mut device.ir, device.ir_len, carry)
            } else {
                let len = device.dr_len;
                Device::shift(&mut device.dr, len, carry)
            };
        }
    }

    fn rising(&mut self) {
        self.clocks += 1;
        if let Some(timer) = self.timer {
            if !timer.is_suspended() {
                self.unsuspended_clocks += 1;
            }
        }

        match self.state {
            TapState::CaptureDR => self.devices.iter_mut().for_each(Device::capture_dr),
            TapState::CaptureIR => self.devices.iter_mut().for_each(Device::capture_ir),
            TapState::ShiftDR => self.shift_chain(false),
            TapState::ShiftIR => self.shift_chain(true),
            _ => {}
        }

        self.state = self.state.advance(self.tms);
        match self.state {
            TapState::Reset => self.devices.iter_mut().for_each(Device::reset),
            TapState::UpdateIR => {
                for device in self.devices.iter_mut() {
                    device.instruction = device.ir & device.bypass();
                }
            }
            _ => {}
        }
    }

    fn falling(&mut self) {
        self.tdo = match (self.state, self.devices.first()) {
            (TapState::ShiftDR, Some(device)) => device.dr & 1 != 0,
            (TapState::ShiftIR, Some(device)) => device.ir & 1 != 0,
            (TapState::ShiftDR, None) | (TapState::ShiftIR, None) => self.tdi,
            _ => false,
        };
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Pin {
    Tms,
    Tdi,
    Tck,
    Reset,
    TestStrap,
}

pub type Shared = Rc<RefCell<Chain>>;

pub struct SimPin {
    chain: Shared,
    pin: Pin,
}

impl OutputPin for SimPin {
    type Error = Infallible;

    fn set_low(&mut self) -> Result<(), Infallible> {
        self.chain.borrow_mut().drive(self.pin, false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        self.chain.borrow_mut().drive(self.pin, true);
        Ok(())
    }
}

pub struct SimTdo(Shared);

impl InputPin for SimTdo {
    type Error = Infallible;

    fn is_high(&self) -> Result<bool, Infallible> {
        Ok(self.0.borrow().tdo())
    }

    fn is_low(&self) -> Result<bool, Infallible> {
        Ok(!self.0.borrow().tdo())
    }
}

pub struct SimDelay(Shared);

impl DelayUs<u32> for SimDelay {
    fn delay_us(&mut self, us: u32) {
        self.0.borrow_mut().delay_us += u64::from(us);
    }
}

pub type SimPins = GpioPins<Infallible, SimPin, SimPin, SimTdo, SimPin, SimPin, SimPin, SimDelay>;

pub fn pins(chain: &Shared) -> SimPins {
    let pin = |pin| SimPin {
        chain: chain.clone(),
        pin,
    };
    GpioPins::new(
        pin(Pin::Tms),
        pin(Pin::Tdi),
        SimTdo(chain.clone()),
        pin(Pin::Tck),
        pin(Pin::Reset),
        pin(Pin::TestStrap),
        SimDelay(chain.clone()),
    )
}

pub fn engine(chain: Chain) -> (Shared, TapEngine<SimPins>) {
    let chain = Rc::new(RefCell::new(chain));
    let tap = TapEngine::new(pins(&chain), (), config());
    (chain, tap)
}

/// An engine whose tick gate is `timer`, which the chain watches.
pub fn gated_engine<G: TickGate>(chain: Chain, gate: G) -> (Shared, TapEngine<SimPins, G>) {
    let chain = Rc::new(RefCell::new(chain));
    let tap = TapEngine::new(pins(&chain), gate, config());
    (chain, tap)
}

pub fn leak_timer() -> &'static SlowTimer {
    Box::leak(Box::new(SlowTimer::new()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Item {
    Byte(u8),
    /// The host stays quiet until the receive countdown runs out.
    Silence,
    Fault,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fault;

/// Serial link fed from a script. Waiting ticks the timer.
pub struct ScriptLink {
    pub script: VecDeque<Item>,
    pub tx: Vec<u8>,
    timer: &'static SlowTimer,
}

impl ScriptLink {
    pub fn new(timer: &'static SlowTimer) -> Self {
        ScriptLink {
            script: VecDeque::new(),
            tx: Vec::new(),
            timer,
        }
    }

    pub fn bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.script.extend(bytes.iter().map(|&b| Item::Byte(b)));
        self
    }

    pub fn push(&mut self, item: Item) -> &mut Self {
        self.script.push_back(item);
        self
    }

    /// Take every frame written so far.
    pub fn frames(&mut self) -> Vec<(u8, u8, Vec<u8>)> {
        let tx = std::mem::take(&mut self.tx);
        let mut frames = Vec::new();
        let mut rest = &tx[..];
        while rest.len() >= HEADER_LEN {
            let mut header = [0; HEADER_LEN];
            header.copy_from_slice(&rest[..HEADER_LEN]);
            let header = Header::parse(&header);
            let end = HEADER_LEN + usize::from(header.len);
            frames.push((header.app, header.verb, rest[HEADER_LEN..end].to_vec()));
            rest = &rest[end..];
        }
        assert!(rest.is_empty(), "trailing bytes {:?}", rest);
        frames
    }
}

impl serial::Read<u8> for ScriptLink {
    type Error = Fault;

    fn read(&mut self) -> nb::Result<u8, Fault> {
        match self.script.front().copied() {
            Some(Item::Byte(b)) => {
                self.script.pop_front();
                Ok(b)
            }
            Some(Item::Fault) => {
                self.script.pop_front();
                Err(nb::Error::Other(Fault))
            }
            Some(Item::Silence) | None => {
                self.timer.tick();
                if self.timer.expired() && !self.script.is_empty() {
                    self.script.pop_front();
                }
                Err(nb::Error::WouldBlock)
            }
        }
    }
}

impl serial::Write<u8> for ScriptLink {
    type Error = Fault;

    fn write(&mut self, word: u8) -> nb::Result<(), Fault> {
        self.tx.push(word);
        Ok(())
    }

    fn flush(&mut self) -> nb::Result<(), Fault> {
        Ok(())
    }
}

/// A countdown that has always run out, for driving the adapter without a script.
pub struct Expired;

impl Countdown for Expired {
    fn arm(&self, _ticks: u8) {}

    fn expired(&self) -> bool {
        true
    }
}

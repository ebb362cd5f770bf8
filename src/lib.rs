//! Firmware core of a GoodFET-style JTAG adapter.
//!
//! The host talks to the adapter in frames of `[app, verb, len_lo, len_hi, payload...]`
//! over any byte link. [`Adapter`] assembles the frames and hands them to the
//! registered [`Handler`]s; [`JtagApp`] is the JTAG application, which drives a
//! bit-banged [`TapEngine`] over a set of [`JtagPins`].
//!
//! ```ignore
//! static TIMER: SlowTimer = SlowTimer::new();
//!
//! let pins = GpioPins::new(tms, tdi, tdo, tck, rst, tst, delay);
//! let config = Config::default();
//! let mut jtag = JtagApp::new(TapEngine::new(pins, &TIMER, config));
//! let link = UsbLink::new(&usb_bus, GOODFET_USB_VID_PID);
//! Adapter::new(link, &TIMER, config).run(&mut [&mut jtag]);
//! ```
#![cfg_attr(not(test), no_std)]
#![forbid(unsafe_code)]

extern crate embedded_hal as hal;

pub mod adapter;
pub mod config;
pub mod error;
pub mod frame;
pub mod jtag;
pub mod pins;
pub mod probe;
pub mod state;
pub mod tap;
mod target;
pub mod timer;
pub mod usb;

use usb_device::prelude::UsbVidPid;

/// FT232-compatible ids, which the GoodFET host tools look for.
pub const GOODFET_USB_VID_PID: UsbVidPid = UsbVidPid(0x0403, 0x6001);

pub use adapter::{Adapter, Handler};
pub use config::Config;
pub use error::{FramingError, LinkError, TapError, TapResult};
pub use jtag::JtagApp;
pub use pins::{GpioPins, JtagPins, Signal};
pub use probe::ChainTopology;
pub use state::TapState;
pub use tap::{ShiftFlags, TapEngine};
pub use timer::SlowTimer;
pub use usb::UsbLink;

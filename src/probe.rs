//! Scan chain discovery.
//!
//! All probes start from a TAP reset and end in Run-Test/Idle with every device
//! back on its reset instruction, so they can be run in any order.

use log::{debug, warn};

use crate::error::{TapError, TapResult};
use crate::pins::JtagPins;
use crate::tap::{ShiftFlags, TapEngine};
use crate::timer::TickGate;

/// How many identifiers [`TapEngine::probe_topology`] records.
pub const MAX_CHAIN_DEVICES: usize = 16;

/// What one probe cycle found out about the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainTopology {
    /// Total instruction register length of the chain.
    pub ir_width: Option<u16>,
    pub devices: Option<u16>,
    ids: [u32; MAX_CHAIN_DEVICES],
    id_count: usize,
}

impl ChainTopology {
    /// Identifiers from the TDO end of the chain; 0 for devices without one.
    pub fn ids(&self) -> &[u32] {
        &self.ids[..self.id_count]
    }
}

impl<P: JtagPins, G: TickGate> TapEngine<P, G> {
    /// Measure the instruction register length.
    ///
    /// Floods Shift-IR with zeros, then feeds ones and counts clocks until the
    /// first one comes out. `None` if nothing came out within the probe limit or TDO
    /// was high straight away.
    pub fn probe_ir_width(&mut self) -> TapResult<Option<u16>, P::Error> {
        self.reset_tap()?;
        let limit = self.config.probe_limit;
        let width = self.quiet(|tap| {
            tap.enter_capture_ir()?;
            tap.enter_shift()?;
            let width = tap.count_delay(limit)?;
            tap.clock_tms(true)?;
            Ok(width)
        })?;
        // the IR now holds probe garbage; reload the defaults
        self.reset_tap()?;
        debug!("IR width: {:?}", width);
        Ok(width)
    }

    /// Count the devices in the chain.
    ///
    /// Every device gets the all-ones BYPASS instruction, after which each one
    /// adds exactly one bit of delay to the data path.
    pub fn probe_chain_length(&mut self) -> TapResult<Option<u16>, P::Error> {
        self.reset_tap()?;
        let limit = self.config.probe_limit.max(1);
        let length = self.quiet(|tap| {
            tap.enter_capture_ir()?;
            tap.enter_shift()?;
            tap.set_tdi(true)?;
            tap.set_tms(false)?;
            for i in 0..limit {
                if i == limit - 1 {
                    tap.set_tms(true)?;
                }
                tap.pulse_clock()?;
            }
            // Exit1-IR -> Update-IR
            tap.clock_tms(true)?;

            tap.enter_capture_dr()?;
            tap.enter_shift()?;
            let length = tap.count_delay(limit)?;
            tap.clock_tms(true)?;
            Ok(length)
        })?;
        self.reset_tap()?;
        debug!("chain length: {:?}", length);
        Ok(length)
    }

    /// Zero flush followed by a one; clocks until the one shows up on TDO.
    fn count_delay(&mut self, limit: u16) -> TapResult<Option<u16>, P::Error> {
        let saved_tclk = self.tdi;
        self.set_tms(false)?;
        self.set_tdi(false)?;
        for _ in 0..limit {
            self.pulse_clock()?;
        }

        self.set_tdi(true)?;
        let mut found = None;
        for count in 0..limit {
            if self.pins.tdo()? {
                found = Some(count);
                break;
            }
            self.pulse_clock()?;
        }
        self.set_tdi(saved_tclk)?;

        if found.is_none() {
            warn!("nothing came out of the chain after {} clocks", limit);
        }
        Ok(found.filter(|&n| n != 0))
    }

    /// Read the next register on the data path after a reset: a 32-bit identifier
    /// (which always starts with a one) or a one-bit BYPASS register.
    fn next_id(&mut self) -> TapResult<u32, P::Error> {
        let first = self.shift_bits(u32::MAX, 1, ShiftFlags::LSB | ShiftFlags::HOLD)?;
        if first & 1 == 0 {
            return Ok(0);
        }
        let rest = self.shift_bits(u32::MAX, 31, ShiftFlags::LSB | ShiftFlags::HOLD)?;
        Ok((rest << 1) | 1)
    }

    /// Identifier of the device `chip` positions from the TDO end of the chain.
    ///
    /// Test-Logic-Reset selects IDCODE (or BYPASS if it has none) on every device;
    /// the registers in front of `chip` are skipped. Devices without an identifier
    /// read as 0.
    pub fn read_device_id(&mut self, chip: u16) -> TapResult<u32, P::Error> {
        let count = self.probe_chain_length()?.unwrap_or(0);
        if chip >= count {
            return Err(TapError::ChipIndex { index: chip, count });
        }

        self.reset_tap()?;
        let id = self.quiet(|tap| {
            tap.enter_capture_dr()?;
            tap.enter_shift()?;
            let mut id = 0;
            for _ in 0..=chip {
                id = tap.next_id()?;
            }
            tap.return_to_idle()?;
            Ok(id)
        })?;

        if id == u32::MAX {
            return Err(TapError::Unresponsive);
        }
        debug!("device {} id: {:#010x}", chip, id);
        Ok(id)
    }

    /// Run every probe and collect the results.
    pub fn probe_topology(&mut self) -> TapResult<ChainTopology, P::Error> {
        let ir_width = self.probe_ir_width()?;
        let devices = self.probe_chain_length()?;
        let mut topology = ChainTopology {
            ir_width,
            devices,
            ids: [0; MAX_CHAIN_DEVICES],
            id_count: 0,
        };

        let count = match devices {
            Some(n) => usize::from(n).min(MAX_CHAIN_DEVICES),
            None => return Ok(topology),
        };

        self.reset_tap()?;
        self.quiet(|tap| {
            tap.enter_capture_dr()?;
            tap.enter_shift()?;
            for slot in topology.ids[..count].iter_mut() {
                *slot = tap.next_id()?;
            }
            tap.return_to_idle()
        })?;
        topology.id_count = count;
        Ok(topology)
    }
}

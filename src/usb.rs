//! USB byte pipe to the host, enumerating as an FT232-style serial converter.
//!
//! The host's FTDI driver strips two status bytes from the front of every IN
//! packet and talks to the chip through vendor control requests, so both are
//! provided here. OUT packets carry raw data.

use hal::serial;
use log::debug;
use usb_device::class_prelude::*;
use usb_device::control::RequestType;
use usb_device::device::{UsbDevice, UsbDeviceBuilder, UsbDeviceState, UsbVidPid};

/// Full-speed bulk packet size.
pub const PACKET_SIZE: usize = 64;

/// Modem and line status leading every IN packet.
const STATUS_LEN: usize = 2;
/// Payload bytes per IN packet.
pub const PACKET_PAYLOAD: usize = PACKET_SIZE - STATUS_LEN;

/// See [ftdi_sio.h](https://github.com/torvalds/linux/blob/master/drivers/usb/serial/ftdi_sio.h#L541)
const MODEM_STATUS_IDLE: u8 = 0b0000_0001;
/// Transmitter holding register and transmitter empty.
const LINE_STATUS_IDLE: u8 = 0b0110_0000;
pub const FTDI_STATUS: [u8; STATUS_LEN] = [MODEM_STATUS_IDLE, LINE_STATUS_IDLE];

const VENDOR_CLASS: u8 = 0xFF;

/// What changed on the bus since the last [`PacketPipe::poll`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PipeStatus {
    pub configured: bool,
    /// The host asked for the receive side to be flushed.
    pub purge_rx: bool,
    /// The host asked for the transmit side to be flushed.
    pub purge_tx: bool,
}

/// A packet-oriented duplex endpoint pair.
pub trait PacketPipe {
    type Error;

    /// Service the bus.
    fn poll(&mut self) -> PipeStatus;

    /// Read one OUT packet. `WouldBlock` when none is pending.
    fn read_packet(&mut self, buf: &mut [u8]) -> nb::Result<usize, Self::Error>;

    /// Queue one IN packet, returning how many bytes were taken.
    fn write_packet(&mut self, data: &[u8]) -> nb::Result<usize, Self::Error>;
}

/// Vendor-specific interface with one bulk OUT and one bulk IN endpoint, answering
/// the FTDI vendor requests.
pub struct PipeClass<'a, B: UsbBus> {
    iface: InterfaceNumber,
    read_ep: EndpointOut<'a, B>,
    write_ep: EndpointIn<'a, B>,
    purge_rx: bool,
    purge_tx: bool,
}

impl<'a, B: UsbBus> PipeClass<'a, B> {
    pub fn new(alloc: &'a UsbBusAllocator<B>) -> Self {
        PipeClass {
            iface: alloc.interface(),
            read_ep: alloc.bulk(PACKET_SIZE as u16),
            write_ep: alloc.bulk(PACKET_SIZE as u16),
            purge_rx: false,
            purge_tx: false,
        }
    }

    pub fn read(&mut self, data: &mut [u8]) -> usb_device::Result<usize> {
        self.read_ep.read(data)
    }

    pub fn write(&mut self, data: &[u8]) -> usb_device::Result<usize> {
        self.write_ep.write(data)
    }
}

impl<B: UsbBus> UsbClass<B> for PipeClass<'_, B> {
    fn get_configuration_descriptors(&self, w: &mut DescriptorWriter) -> usb_device::Result<()> {
        w.interface(self.iface, VENDOR_CLASS, VENDOR_CLASS, VENDOR_CLASS)?;
        w.endpoint(&self.write_ep)?;
        w.endpoint(&self.read_ep)
    }

    fn reset(&mut self) {
        self.purge_rx = true;
        self.purge_tx = true;
    }

    fn control_in(&mut self, xfer: ControlIn<B>) {
        /// [Get modem status](https://github.com/lipro/libftdi/blob/master/src/ftdi.c#L2049)
        const GET_MODEM_STATUS: u8 = 0x05;
        /// [Get latency timer](https://github.com/torvalds/linux/blob/master/drivers/usb/serial/ftdi_sio.h#L302)
        const GET_LATENCY_TIMER: u8 = 0x0A;
        /// [Read EEPROM location](https://github.com/lipro/libftdi/blob/master/src/ftdi.c#L4025)
        const READ_EEPROM: u8 = 0x90;

        /// The driver default, in milliseconds.
        const LATENCY_TIMER: [u8; 1] = [16];
        /// No EEPROM: every word reads as erased.
        const BLANK_EEPROM_WORD: [u8; 2] = [0xFF, 0xFF];

        let req = *xfer.request();
        if req.request_type != RequestType::Vendor {
            return;
        }
        let accepted = match req.request {
            GET_MODEM_STATUS => xfer.accept_with_static(&FTDI_STATUS),
            GET_LATENCY_TIMER => xfer.accept_with_static(&LATENCY_TIMER),
            READ_EEPROM => xfer.accept_with_static(&BLANK_EEPROM_WORD),
            _ => xfer.accept_with_static(&[0u8; 2]),
        };
        if accepted.is_err() {
            debug!("vendor IN request failed");
        }
    }

    fn control_out(&mut self, xfer: ControlOut<B>) {
        /// See [Linux kernel ftdi_sio.h](https://github.com/torvalds/linux/blob/master/drivers/usb/serial/ftdi_sio.h#L74)
        const RESET: u8 = 0x00;
        const RESET_SIO: u16 = 0x0000;
        const RESET_PURGE_RX: u16 = 0x0001;
        const RESET_PURGE_TX: u16 = 0x0002;
        /// Writing or erasing the (absent) EEPROM is refused.
        const WRITE_EEPROM: u8 = 0x91;
        const ERASE_EEPROM: u8 = 0x92;

        let req = *xfer.request();
        if req.request_type != RequestType::Vendor {
            return;
        }
        let done = match (req.request, req.value) {
            (RESET, RESET_SIO) => {
                self.purge_rx = true;
                self.purge_tx = true;
                xfer.accept()
            }
            (RESET, RESET_PURGE_RX) => {
                self.purge_rx = true;
                xfer.accept()
            }
            (RESET, RESET_PURGE_TX) => {
                self.purge_tx = true;
                xfer.accept()
            }
            (RESET, _) | (WRITE_EEPROM, _) | (ERASE_EEPROM, _) => xfer.reject(),
            // baud rate, line settings, flow control, latency and bit mode do not
            // apply to a byte pipe
            _ => xfer.accept(),
        };
        if done.is_err() {
            debug!("vendor OUT request {:#04x} failed", req.request);
        }
    }
}

/// The USB device together with its one class.
pub struct UsbPipe<'a, B: UsbBus> {
    device: UsbDevice<'a, B>,
    class: PipeClass<'a, B>,
}

impl<'a, B: UsbBus> UsbPipe<'a, B> {
    pub fn new(alloc: &'a UsbBusAllocator<B>, vid_pid: UsbVidPid) -> Self {
        // the class must claim its endpoints before the device is built
        let class = PipeClass::new(alloc);
        let device = UsbDeviceBuilder::new(alloc, vid_pid)
            .manufacturer("GoodFET")
            .product("GoodFET JTAG adapter")
            .serial_number("0001")
            .device_class(VENDOR_CLASS)
            .build();
        UsbPipe { device, class }
    }

    pub fn state(&self) -> UsbDeviceState {
        self.device.state()
    }
}

fn nb_usb<T>(result: usb_device::Result<T>) -> nb::Result<T, UsbError> {
    result.map_err(|e| match e {
        UsbError::WouldBlock => nb::Error::WouldBlock,
        e => nb::Error::Other(e),
    })
}

impl<B: UsbBus> PacketPipe for UsbPipe<'_, B> {
    type Error = UsbError;

    fn poll(&mut self) -> PipeStatus {
        self.device.poll(&mut [&mut self.class]);
        let status = PipeStatus {
            configured: self.device.state() == UsbDeviceState::Configured,
            purge_rx: self.class.purge_rx,
            purge_tx: self.class.purge_tx,
        };
        self.class.purge_rx = false;
        self.class.purge_tx = false;
        status
    }

    fn read_packet(&mut self, buf: &mut [u8]) -> nb::Result<usize, UsbError> {
        nb_usb(self.class.read(buf))
    }

    fn write_packet(&mut self, data: &[u8]) -> nb::Result<usize, UsbError> {
        nb_usb(self.class.write(data))
    }
}

/// The host link as an embedded-hal serial port over a [`PacketPipe`].
///
/// Waiting for a byte also keeps the bus serviced. Written bytes are collected
/// into packets behind the FTDI status bytes and go out on `flush` or when a
/// packet fills up.
pub struct FtdiLink<P> {
    pipe: P,
    recv_buffer: [u8; PACKET_SIZE],
    recv_len: usize,
    recv_pos: usize,
    /// Status bytes followed by `send_len` payload bytes.
    send_buffer: [u8; PACKET_SIZE],
    send_len: usize,
}

/// The USB flavour of [`FtdiLink`].
pub type UsbLink<'a, B> = FtdiLink<UsbPipe<'a, B>>;

impl<'a, B: UsbBus> FtdiLink<UsbPipe<'a, B>> {
    pub fn new(alloc: &'a UsbBusAllocator<B>, vid_pid: UsbVidPid) -> Self {
        FtdiLink::with_pipe(UsbPipe::new(alloc, vid_pid))
    }

    pub fn state(&self) -> UsbDeviceState {
        self.pipe.state()
    }
}

impl<P: PacketPipe> FtdiLink<P> {
    pub fn with_pipe(pipe: P) -> Self {
        let mut send_buffer = [0; PACKET_SIZE];
        send_buffer[..STATUS_LEN].copy_from_slice(&FTDI_STATUS);
        FtdiLink {
            pipe,
            recv_buffer: [0; PACKET_SIZE],
            recv_len: 0,
            recv_pos: 0,
            send_buffer,
            send_len: 0,
        }
    }

    pub fn pipe(&self) -> &P {
        &self.pipe
    }

    pub fn pipe_mut(&mut self) -> &mut P {
        &mut self.pipe
    }

    /// Service the bus. Returns whether the host has configured the device.
    pub fn poll(&mut self) -> bool {
        let status = self.pipe.poll();
        // anything buffered belongs to a session that is gone
        if status.purge_rx || !status.configured {
            self.recv_len = 0;
            self.recv_pos = 0;
        }
        if status.purge_tx || !status.configured {
            self.send_len = 0;
        }
        status.configured
    }
}

impl<P: PacketPipe> serial::Read<u8> for FtdiLink<P> {
    type Error = P::Error;

    fn read(&mut self) -> nb::Result<u8, P::Error> {
        if self.recv_pos == self.recv_len {
            if !self.poll() {
                return Err(nb::Error::WouldBlock);
            }
            match self.pipe.read_packet(&mut self.recv_buffer)? {
                0 => return Err(nb::Error::WouldBlock),
                amount => {
                    self.recv_len = amount;
                    self.recv_pos = 0;
                }
            }
        }
        let byte = self.recv_buffer[self.recv_pos];
        self.recv_pos += 1;
        Ok(byte)
    }
}

impl<P: PacketPipe> serial::Write<u8> for FtdiLink<P> {
    type Error = P::Error;

    fn write(&mut self, word: u8) -> nb::Result<(), P::Error> {
        if self.send_len == PACKET_PAYLOAD {
            self.flush()?;
        }
        self.send_buffer[STATUS_LEN + self.send_len] = word;
        self.send_len += 1;
        Ok(())
    }

    fn flush(&mut self) -> nb::Result<(), P::Error> {
        // nothing is left to send once the host is gone
        self.poll();
        if self.send_len == 0 {
            return Ok(());
        }
        let end = STATUS_LEN + self.send_len;
        let amount = self.pipe.write_packet(&self.send_buffer[..end])?;
        // a packet that did not even carry the status bytes carried no data
        let sent = amount.saturating_sub(STATUS_LEN).min(self.send_len);
        self.send_buffer.copy_within(STATUS_LEN + sent..end, STATUS_LEN);
        self.send_len -= sent;
        if self.send_len == 0 {
            Ok(())
        } else {
            Err(nb::Error::WouldBlock)
        }
    }
}

/// Run-time configuration of the adapter, chosen once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Delay after each TCK edge, in microseconds.
    pub tck_half_period_us: u32,
    /// How many slow-timer ticks to wait for each incoming byte.
    ///
    /// The default of 25 is roughly 450 ms with a ~55 Hz tick.
    pub rx_timeout_ticks: u8,
    /// How many ticks the activity indicator stays on.
    pub indicator_ticks: u8,
    /// Upper bound on clocks spent in each phase of a chain probe.
    pub probe_limit: u16,
    /// How long the target reset line is held asserted, in microseconds.
    pub reset_pulse_us: u32,
    /// Half period of the auxiliary programming clock burst, in microseconds.
    ///
    /// 1 µs gives the ~350 kHz flash timing generator clock MSP430 parts expect.
    pub flash_half_period_us: u32,
    /// Application id used for NOK replies when no header could be decoded.
    pub default_app: u8,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            tck_half_period_us: 1,
            rx_timeout_ticks: 25,
            indicator_ticks: 5,
            probe_limit: 1024,
            reset_pulse_us: 1000,
            flash_half_period_us: 1,
            default_app: crate::jtag::JTAG_APP,
        }
    }
}

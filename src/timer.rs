//! Slow periodic tick source shared between the tick interrupt and the main loop.
//!
//! The interrupt handler calls [`SlowTimer::tick`]; everything else only arms or
//! polls the countdowns. Every counter has a single writer per direction, so only
//! atomic `load`/`store` is used and the timer builds for cores without
//! compare-and-swap, such as `thumbv6m-none-eabi` (Cortex-M0+).

use core::sync::atomic::{AtomicU8, Ordering};

/// What happened on a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickEvent {
    /// Nothing to do, or ticks are suspended.
    Idle,
    /// The activity indicator countdown ran out; switch the indicator off.
    IndicatorExpired,
}

/// Countdown used by the frame loop to bound every byte wait.
pub trait Countdown {
    /// Start counting down from `ticks`.
    fn arm(&self, ticks: u8);
    fn expired(&self) -> bool;

    /// Traffic was seen; keep the activity indicator on for `ticks`.
    fn indicate(&self, _ticks: u8) {}
}

/// Suspends the tick source around timing-critical sequences.
///
/// Calls nest: ticks resume once every `suspend` has been matched by a `resume`.
pub trait TickGate {
    fn suspend(&self);
    fn resume(&self);
}

/// No tick source to suspend.
impl TickGate for () {
    fn suspend(&self) {}
    fn resume(&self) {}
}

impl<T: TickGate + ?Sized> TickGate for &T {
    fn suspend(&self) {
        (**self).suspend()
    }
    fn resume(&self) {
        (**self).resume()
    }
}

impl<T: Countdown + ?Sized> Countdown for &T {
    fn arm(&self, ticks: u8) {
        (**self).arm(ticks)
    }
    fn expired(&self) -> bool {
        (**self).expired()
    }
    fn indicate(&self, ticks: u8) {
        (**self).indicate(ticks)
    }
}

/// Receive-timeout and indicator countdowns, decremented from the tick interrupt.
///
/// Meant to live in a `static`:
///
/// ```
/// use goodfet_jtag::timer::SlowTimer;
/// static TIMER: SlowTimer = SlowTimer::new();
/// // in the timer overflow interrupt:
/// TIMER.tick();
/// ```
#[derive(Debug, Default)]
pub struct SlowTimer {
    rx: AtomicU8,
    indicator: AtomicU8,
    suspended: AtomicU8,
}

impl SlowTimer {
    pub const fn new() -> Self {
        SlowTimer {
            rx: AtomicU8::new(0),
            indicator: AtomicU8::new(0),
            suspended: AtomicU8::new(0),
        }
    }

    /// Advance all countdowns by one tick. Call from the periodic interrupt.
    ///
    /// The indicator is armed by the frame loop on traffic; drive the LED from
    /// [`indicator_active`](Self::indicator_active) and switch it off on
    /// [`TickEvent::IndicatorExpired`].
    pub fn tick(&self) -> TickEvent {
        if self.suspended.load(Ordering::Acquire) != 0 {
            return TickEvent::Idle;
        }

        let rx = self.rx.load(Ordering::Acquire);
        if rx != 0 {
            self.rx.store(rx - 1, Ordering::Release);
        }

        match self.indicator.load(Ordering::Acquire) {
            0 => TickEvent::Idle,
            1 => {
                self.indicator.store(0, Ordering::Release);
                TickEvent::IndicatorExpired
            }
            n => {
                self.indicator.store(n - 1, Ordering::Release);
                TickEvent::Idle
            }
        }
    }

    /// Keep the activity indicator lit for `ticks`.
    ///
    /// Returns `true` if the indicator was idle and should be switched on now; a
    /// running countdown is left alone so that busy traffic still blinks.
    pub fn flash_indicator(&self, ticks: u8) -> bool {
        // the tick interrupt only writes a running countdown, never an idle one
        if self.indicator.load(Ordering::Acquire) != 0 {
            return false;
        }
        self.indicator.store(ticks.max(1), Ordering::Release);
        true
    }

    pub fn indicator_active(&self) -> bool {
        self.indicator.load(Ordering::Acquire) != 0
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended.load(Ordering::Acquire) != 0
    }
}

impl Countdown for SlowTimer {
    fn arm(&self, ticks: u8) {
        self.rx.store(ticks, Ordering::Release);
    }

    fn expired(&self) -> bool {
        self.rx.load(Ordering::Acquire) == 0
    }

    fn indicate(&self, ticks: u8) {
        self.flash_indicator(ticks);
    }
}

/// The suspension depth is only written from the main loop.
impl TickGate for SlowTimer {
    fn suspend(&self) {
        let depth = self.suspended.load(Ordering::Acquire);
        self.suspended.store(depth.saturating_add(1), Ordering::Release);
    }

    fn resume(&self) {
        let depth = self.suspended.load(Ordering::Acquire);
        self.suspended.store(depth.saturating_sub(1), Ordering::Release);
    }
}

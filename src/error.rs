use core::fmt;

use crate::state::TapState;

pub type TapResult<T, E> = Result<T, TapError<E>>;

/// Errors raised by TAP-level operations.
///
/// `E` is the error type of the underlying [`JtagPins`](crate::pins::JtagPins).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapError<E> {
    /// Driving or sampling a signal failed. The TAP state is no longer trustworthy.
    Pin(E),

    /// The requested transition has no edge from the current TAP state.
    ///
    /// This is a caller bug, e.g. asking for Capture-DR while in the middle of an
    /// instruction scan. Nothing was clocked.
    Transition { from: TapState, to: TapState },

    /// A shift was requested while the TAP is not in Shift-IR or Shift-DR.
    NotShifting(TapState),

    /// A shift must move between 1 and 32 bits.
    BitCount(u8),

    /// The requested chain position does not exist.
    ChipIndex { index: u16, count: u16 },

    /// The chain returned an implausible identifier (TDO stuck high).
    Unresponsive,
}

impl<E> From<E> for TapError<E> {
    fn from(e: E) -> Self {
        TapError::Pin(e)
    }
}

impl<E: fmt::Debug> fmt::Display for TapError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TapError::Pin(e) => write!(f, "pin access failed: {:?}", e),
            TapError::Transition { from, to } => {
                write!(f, "no TAP transition from {:?} to {:?}", from, to)
            }
            TapError::NotShifting(state) => {
                write!(f, "not in Shift-IR or Shift-DR state ({:?})", state)
            }
            TapError::BitCount(bits) => write!(f, "cannot shift {} bits at once", bits),
            TapError::ChipIndex { index, count } => {
                write!(f, "invalid part index {} (chain has {})", index, count)
            }
            TapError::Unresponsive => f.write_str("target is not responding"),
        }
    }
}

/// Reasons an incoming frame is dropped and answered with NOK.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramingError {
    /// No byte arrived before the receive countdown expired.
    Timeout,
    /// The byte transport reported an error.
    Transport,
    /// The declared payload did not fit into the payload buffer.
    Oversized(u16),
}

impl fmt::Display for FramingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FramingError::Timeout => f.write_str("timed out waiting for a byte"),
            FramingError::Transport => f.write_str("transport error"),
            FramingError::Oversized(len) => write!(f, "payload of {} bytes is too large", len),
        }
    }
}

/// Writing a reply frame to the host failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkError;

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("failed to write to the host link")
    }
}

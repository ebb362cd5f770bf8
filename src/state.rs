//! The IEEE 1149.1 TAP controller state graph.

/// All states of the JTAG TAP, plus `Unknown` for a TAP that has not been reset yet.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[repr(u8)]
pub enum TapState {
    Reset,
    RunIdle,
    SelectDR,
    CaptureDR,
    ShiftDR,
    Exit1DR,
    PauseDR,
    Exit2DR,
    UpdateDR,
    SelectIR,
    CaptureIR,
    ShiftIR,
    Exit1IR,
    PauseIR,
    Exit2IR,
    UpdateIR,
    Unknown,
}
use TapState::*;

impl TapState {
    const STATE_MACHINE: [[Self; 2]; 17] = [
        /*-State-      -tms= '0'-  -tms= '1'- */
        /*RESET     */ [RunIdle, Reset],
        /*RUNIDLE   */ [RunIdle, SelectDR],
        /*SELECT_DR */ [CaptureDR, SelectIR],
        /*CAPTURE_DR*/ [ShiftDR, Exit1DR],
        /*SHIFT_DR  */ [ShiftDR, Exit1DR],
        /*EXIT1_DR  */ [PauseDR, UpdateDR],
        /*PAUSE_DR  */ [PauseDR, Exit2DR],
        /*EXIT2_DR  */ [ShiftDR, UpdateDR],
        /*UPDATE_DR */ [RunIdle, SelectDR],
        /*SELECT_IR */ [CaptureIR, Reset],
        /*CAPTURE_IR*/ [ShiftIR, Exit1IR],
        /*SHIFT_IR  */ [ShiftIR, Exit1IR],
        /*EXIT1_IR  */ [PauseIR, UpdateIR],
        /*PAUSE_IR  */ [PauseIR, Exit2IR],
        /*EXIT2_IR  */ [ShiftIR, UpdateIR],
        /*UPDATE_IR */ [RunIdle, SelectDR],
        /*UNKNOWN   */ [Unknown, Unknown],
    ];

    const ALL: [Self; 17] = [
        Reset, RunIdle, SelectDR, CaptureDR, ShiftDR, Exit1DR, PauseDR, Exit2DR, UpdateDR,
        SelectIR, CaptureIR, ShiftIR, Exit1IR, PauseIR, Exit2IR, UpdateIR, Unknown,
    ];

    /// The state the TAP moves to on a rising TCK edge with the given TMS level.
    pub fn advance(self, tms: bool) -> Self {
        Self::STATE_MACHINE[self as usize][tms as usize]
    }

    /// Capture-DR through Update-DR.
    pub fn is_dr(self) -> bool {
        matches!(self, CaptureDR | ShiftDR | Exit1DR | PauseDR | Exit2DR | UpdateDR)
    }

    /// Capture-IR through Update-IR.
    pub fn is_ir(self) -> bool {
        matches!(self, CaptureIR | ShiftIR | Exit1IR | PauseIR | Exit2IR | UpdateIR)
    }

    pub fn is_shift(self) -> bool {
        matches!(self, ShiftDR | ShiftIR)
    }

    /// Shortest TMS sequence from `self` to `to` that never passes through Test-Logic-Reset.
    ///
    /// Returns `None` if no such path exists, which is the case from `Unknown` and for
    /// `to == Reset` (unless already there).
    pub fn path_to(self, to: Self) -> Option<TmsPath> {
        if self == to {
            return Some(TmsPath::EMPTY);
        }
        if self == Unknown || to == Reset || to == Unknown {
            return None;
        }

        // Breadth-first search over the 16 real states.
        let mut parent: [Option<(TapState, bool)>; 16] = [None; 16];
        let mut seen = [false; 16];
        let mut queue = [Reset; 16];
        let (mut head, mut tail) = (0, 0);

        seen[self as usize] = true;
        queue[tail] = self;
        tail += 1;

        while head < tail {
            let current = queue[head];
            head += 1;
            for &tms in &[false, true] {
                let next = current.advance(tms);
                if next == Reset || seen[next as usize] {
                    continue;
                }
                seen[next as usize] = true;
                parent[next as usize] = Some((current, tms));
                if next == to {
                    return Some(Self::unwind(&parent, self, to));
                }
                queue[tail] = next;
                tail += 1;
            }
        }
        None
    }

    fn unwind(parent: &[Option<(TapState, bool)>; 16], from: Self, to: Self) -> TmsPath {
        let mut reversed = TmsPath::EMPTY;
        let mut at = to;
        while at != from {
            match parent[at as usize] {
                Some((prev, tms)) => {
                    reversed.push(tms);
                    at = prev;
                }
                None => break,
            }
        }
        reversed.reversed()
    }

    /// Iterate over every state, including `Unknown`.
    pub fn all() -> impl Iterator<Item = TapState> {
        Self::ALL.into_iter()
    }
}

impl Default for TapState {
    fn default() -> Self {
        Unknown
    }
}

/// A short sequence of TMS levels, first level in bit 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TmsPath {
    bits: u16,
    len: u8,
}

impl TmsPath {
    pub const EMPTY: TmsPath = TmsPath { bits: 0, len: 0 };

    /// Build a path from explicit levels.
    pub fn from_levels(levels: &[bool]) -> Self {
        let mut path = Self::EMPTY;
        for &tms in levels {
            path.push(tms);
        }
        path
    }

    fn push(&mut self, tms: bool) {
        debug_assert!(self.len < 16);
        self.bits |= (tms as u16) << self.len;
        self.len += 1;
    }

    fn reversed(self) -> Self {
        let mut out = Self::EMPTY;
        for i in (0..self.len).rev() {
            out.push(self.bits & (1 << i) != 0);
        }
        out
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn levels(self) -> impl Iterator<Item = bool> {
        (0..self.len).map(move |i| self.bits & (1 << i) != 0)
    }
}

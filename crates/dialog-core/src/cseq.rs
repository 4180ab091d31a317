/// First CSeq number used on a dialog
pub const INITIAL_CSEQ: u32 = 100;

/// Largest CSeq number ever issued (2^31 - 1)
pub const MAX_CSEQ: u32 = (1 << 31) - 1;

/// Per-dialog source of outbound CSeq numbers.
///
/// Yields 100, 101, 102, ... and wraps back to 100 instead of going past
/// [`MAX_CSEQ`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CSeqCounter {
    next: u32,
}

impl CSeqCounter {
    pub fn new() -> Self {
        Self::starting_at(INITIAL_CSEQ)
    }

    /// Counter whose next value is `value`, clamped to the valid range
    pub fn starting_at(value: u32) -> Self {
        let next = if value > MAX_CSEQ { INITIAL_CSEQ } else { value };
        Self { next }
    }

    /// Value the next call to [`next_seq`](Self::next_seq) returns
    pub fn peek(&self) -> u32 {
        self.next
    }

    pub fn next_seq(&mut self) -> u32 {
        let current = self.next;
        self.next = if current >= MAX_CSEQ {
            INITIAL_CSEQ
        } else {
            current + 1
        };
        current
    }
}

impl Default for CSeqCounter {
    fn default() -> Self {
        Self::new()
    }
}

//! Error taxonomy for the harness.
//!
//! Everything here is fatal for the run. A result that does not match its
//! reference vector is not an error; it is recorded as a
//! [`Mismatch`](crate::sequencer::Mismatch) in the run report.

use crate::bus::BitRange;
use crate::codec::Phase;
use thiserror::Error;

/// Fatal protocol error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// A drive request does not fit the addressed range (or the range is off the bus).
    #[error("value 0x{value:X} does not fit {range} ({width} bits)")]
    OutOfRange {
        range: BitRange,
        value: u64,
        width: u8,
    },

    /// The peer did not produce the expected acknowledgement within the cycle budget.
    #[error(
        "handshake timeout in {phase:?} phase{} after {cycles} cycles (waiting for ack={expected})",
        .vector.map(|v| format!(" of vector #{v}")).unwrap_or_default()
    )]
    HandshakeTimeout {
        phase: Phase,
        vector: Option<usize>,
        expected: u8,
        cycles: u64,
    },

    /// The phase selector field holds a value no phase uses.
    #[error("unknown phase selector 0b{0:03b}")]
    UnknownPhase(u8),

    /// The opcode field holds a value the coprocessor does not implement.
    #[error("unknown opcode 0b{0:03b}")]
    UnknownOpcode(u8),
}

pub type Result<T> = std::result::Result<T, ProtocolError>;

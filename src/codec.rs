//! Phase/command codec.
//!
//! A command is what the controller places on the bus for one phase. Each
//! command has a canonical raw encoding (the 38-bit bus word it produces on
//! an otherwise idle bus) and a list of sub-range writes that put it on a
//! live bus. The two agree except for `Control`, which only overwrites the
//! opcode and rounding sub-fields and leaves the rest of the data range
//! holding operand 2.

use crate::bus::{self, BitRange, GpioBus};
use crate::error::{ProtocolError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Value of the phase selector `[37:35]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Phase {
    ModeSelect = 0b000,
    Operand1 = 0b010,
    Operand2 = 0b110,
    Control = 0b100,
    Result = 0b101,
}

impl Phase {
    /// Per-vector phase order in full mode.
    pub const SEQUENCE: [Phase; 4] = [
        Phase::Operand1,
        Phase::Operand2,
        Phase::Control,
        Phase::Result,
    ];

    pub const fn selector(self) -> u8 {
        self as u8
    }

    pub fn from_selector(bits: u8) -> Result<Self> {
        match bits {
            0b000 => Ok(Phase::ModeSelect),
            0b010 => Ok(Phase::Operand1),
            0b110 => Ok(Phase::Operand2),
            0b100 => Ok(Phase::Control),
            0b101 => Ok(Phase::Result),
            _ => Err(ProtocolError::UnknownPhase(bits)),
        }
    }

    /// Phase that follows this one within a vector; `None` after `Result`.
    pub fn next(self) -> Option<Phase> {
        match self {
            Phase::ModeSelect => Some(Phase::Operand1),
            Phase::Operand1 => Some(Phase::Operand2),
            Phase::Operand2 => Some(Phase::Control),
            Phase::Control => Some(Phase::Result),
            Phase::Result => None,
        }
    }
}

/// FPU operation selected by the opcode field `[31:29]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum Opcode {
    Add = 0b000,
    Multiply = 0b001,
    Divide = 0b010,
    /// Unary operation on operand 1; operand 2 is a don't-care and
    /// conventionally zero.
    Round = 0b011,
}

impl Opcode {
    pub const fn bits(self) -> u8 {
        self as u8
    }

    pub fn from_bits(bits: u8) -> Result<Self> {
        match bits {
            0b000 => Ok(Opcode::Add),
            0b001 => Ok(Opcode::Multiply),
            0b010 => Ok(Opcode::Divide),
            0b011 => Ok(Opcode::Round),
            _ => Err(ProtocolError::UnknownOpcode(bits)),
        }
    }

    /// Operator symbol used in log lines.
    pub fn symbol(self) -> char {
        match self {
            Opcode::Add => '+',
            Opcode::Multiply => '*',
            Opcode::Divide => '/',
            Opcode::Round => 'r',
        }
    }

    pub fn is_unary(self) -> bool {
        self == Opcode::Round
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// Rounding-mode field `[27:25]`. The harness always sends the same policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RoundingMode(pub u8);

impl RoundingMode {
    pub const DEFAULT: RoundingMode = RoundingMode(0b001);
}

impl Default for RoundingMode {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Test-mode constant carried by `ModeSelect` in `[34:32]`.
pub const DIRECT_CONTROL_MODE: u8 = 0b001;

/// One phase worth of controller output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    ModeSelect(u8),
    Operand1(u32),
    Operand2(u32),
    Control { opcode: Opcode, rounding: RoundingMode },
    Result,
}

/// A single write to the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusOp {
    Drive(BitRange, u64),
    Release(BitRange),
}

impl Command {
    pub fn phase(&self) -> Phase {
        match self {
            Command::ModeSelect(_) => Phase::ModeSelect,
            Command::Operand1(_) => Phase::Operand1,
            Command::Operand2(_) => Phase::Operand2,
            Command::Control { .. } => Phase::Control,
            Command::Result => Phase::Result,
        }
    }

    /// Level of the strobe bit while this command is on the bus.
    /// It is lowered by `Operand1` and raised by `Control`; `Operand2` holds
    /// it low and `Result` keeps it high.
    pub fn strobe(&self) -> bool {
        match self {
            Command::ModeSelect(mode) => mode & 1 != 0,
            Command::Operand1(_) | Command::Operand2(_) => false,
            Command::Control { .. } | Command::Result => true,
        }
    }

    /// Canonical raw bus word for this command.
    pub fn encode(&self) -> u64 {
        let raw = bus::PHASE_SELECT.insert(0, self.phase().selector() as u64);
        match *self {
            Command::ModeSelect(mode) => bus::MODE_SELECT.insert(raw, mode as u64),
            Command::Operand1(data) | Command::Operand2(data) => bus::DATA.insert(raw, data as u64),
            Command::Control { opcode, rounding } => {
                let raw = bus::STROBE.insert(raw, 1);
                let raw = bus::OPCODE.insert(raw, opcode.bits() as u64);
                bus::ROUNDING.insert(raw, rounding.0 as u64)
            }
            Command::Result => bus::STROBE.insert(raw, 1),
        }
    }

    /// Interpret a raw bus word as the command the controller is presenting.
    pub fn decode(raw: u64) -> Result<Self> {
        let phase = Phase::from_selector(bus::PHASE_SELECT.extract(raw) as u8)?;
        Ok(match phase {
            Phase::ModeSelect => Command::ModeSelect(bus::MODE_SELECT.extract(raw) as u8),
            Phase::Operand1 => Command::Operand1(decode_data(raw)),
            Phase::Operand2 => Command::Operand2(decode_data(raw)),
            Phase::Control => Command::Control {
                opcode: Opcode::from_bits(bus::OPCODE.extract(raw) as u8)?,
                rounding: RoundingMode(bus::ROUNDING.extract(raw) as u8),
            },
            Phase::Result => Command::Result,
        })
    }

    /// Sub-range writes that present this command on a live bus.
    pub fn bus_ops(&self) -> Vec<BusOp> {
        let phase = BusOp::Drive(bus::PHASE_SELECT, self.phase().selector() as u64);
        match *self {
            Command::ModeSelect(mode) => vec![phase, BusOp::Drive(bus::MODE_SELECT, mode as u64)],
            Command::Operand1(data) => vec![
                BusOp::Drive(bus::STROBE, 0),
                phase,
                BusOp::Drive(bus::DATA, data as u64),
            ],
            Command::Operand2(data) => vec![phase, BusOp::Drive(bus::DATA, data as u64)],
            Command::Control { opcode, rounding } => vec![
                phase,
                BusOp::Drive(bus::OPCODE, opcode.bits() as u64),
                BusOp::Drive(bus::ROUNDING, rounding.0 as u64),
                BusOp::Drive(bus::STROBE, 1),
            ],
            Command::Result => vec![
                phase,
                BusOp::Drive(bus::STROBE, 1),
                BusOp::Release(bus::DATA),
            ],
        }
    }

    /// Put this command on the bus.
    pub fn apply(&self, bus: &mut GpioBus) -> Result<()> {
        for op in self.bus_ops() {
            match op {
                BusOp::Drive(range, value) => bus.drive(range, value)?,
                BusOp::Release(range) => bus.release(range),
            }
        }
        Ok(())
    }
}

/// Data range of a raw bus word as an unsigned 32-bit pattern.
pub fn decode_data(raw: u64) -> u32 {
    bus::DATA.extract(raw) as u32
}

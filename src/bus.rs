//! Model of the 38-line GPIO bus shared by the controller and the coprocessor.
//!
//! Each line can be driven by the controller, driven by the device, or left
//! floating. Both sides write through sub-ranges; whatever was last written
//! to a range is held until it is overwritten or released.
//!
//! ```text
//!  37    35 34  32 31                           0
//! +--------+------+-------------------------------+
//! | phase  | mode |             data              |
//! +--------+------+-------------------------------+
//!             ^ bit 32 doubles as the strobe
//! ```
//!
//! The handshake acknowledgement is not part of the 38 lines. It is the
//! management line, driven only by the device.

use crate::error::{ProtocolError, Result};
use std::fmt;

/// Number of switchable lines.
pub const BUS_WIDTH: u8 = 38;

/// Inclusive bit range `[hi:lo]` on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BitRange {
    pub hi: u8,
    pub lo: u8,
}

impl BitRange {
    pub const fn new(hi: u8, lo: u8) -> Self {
        assert!(hi >= lo);
        Self { hi, lo }
    }

    pub const fn bit(n: u8) -> Self {
        Self::new(n, n)
    }

    pub const fn width(&self) -> u8 {
        self.hi - self.lo + 1
    }

    /// Largest value the range can hold.
    pub const fn max_value(&self) -> u64 {
        if self.width() >= 64 {
            u64::MAX
        } else {
            (1u64 << self.width()) - 1
        }
    }

    /// Mask of the range in bus position.
    pub const fn mask(&self) -> u64 {
        self.max_value() << self.lo
    }

    pub const fn on_bus(&self) -> bool {
        self.hi < BUS_WIDTH
    }

    /// Extract this range from a raw bus word.
    pub const fn extract(&self, raw: u64) -> u64 {
        (raw >> self.lo) & self.max_value()
    }

    /// Place `value` into this range of a raw bus word, leaving other bits alone.
    /// Bits of `value` beyond the range width are dropped.
    pub const fn insert(&self, raw: u64, value: u64) -> u64 {
        (raw & !self.mask()) | ((value & self.max_value()) << self.lo)
    }
}

impl fmt::Display for BitRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.hi == self.lo {
            write!(f, "IO[{}]", self.hi)
        } else {
            write!(f, "IO[{}:{}]", self.hi, self.lo)
        }
    }
}

/// Control range: phase selector plus mode select / strobe.
pub const CONTROL: BitRange = BitRange::new(37, 32);
pub const PHASE_SELECT: BitRange = BitRange::new(37, 35);
pub const MODE_SELECT: BitRange = BitRange::new(34, 32);
pub const STROBE: BitRange = BitRange::bit(32);
/// Data range: operand / result payload.
pub const DATA: BitRange = BitRange::new(31, 0);
pub const OPCODE: BitRange = BitRange::new(31, 29);
pub const ROUNDING: BitRange = BitRange::new(27, 25);

/// One side's contribution to the bus: the values it holds and which lines it drives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Driver {
    value: u64,
    enable: u64,
}

impl Driver {
    fn drive(&mut self, range: BitRange, value: u64) -> Result<()> {
        if !range.on_bus() || value > range.max_value() {
            return Err(ProtocolError::OutOfRange {
                range,
                value,
                width: range.width(),
            });
        }
        self.value = range.insert(self.value, value);
        self.enable |= range.mask();
        Ok(())
    }

    fn release(&mut self, range: BitRange) {
        self.enable &= !range.mask();
        self.value &= !range.mask();
    }
}

/// The shared bus.
#[derive(Debug, Clone, Default)]
pub struct GpioBus {
    controller: Driver,
    device: Driver,
    ack: Option<bool>,
}

impl GpioBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Controller: write `value` onto `range` and hold it.
    pub fn drive(&mut self, range: BitRange, value: u64) -> Result<()> {
        log::trace!("controller: drive {range} = 0x{value:X}");
        self.controller.drive(range, value)
    }

    /// Controller: stop driving `range`.
    pub fn release(&mut self, range: BitRange) {
        log::trace!("controller: release {range}");
        self.controller.release(range);
    }

    /// Device: write `value` onto `range` and hold it.
    pub fn device_drive(&mut self, range: BitRange, value: u64) -> Result<()> {
        log::trace!("    device: drive {range} = 0x{value:X}");
        self.device.drive(range, value)
    }

    /// Device: put a result word on the data range. Every `u32` fits.
    pub fn device_present(&mut self, value: u32) {
        log::trace!("    device: drive {DATA} = 0x{value:X}");
        self.device.value = DATA.insert(self.device.value, u64::from(value));
        self.device.enable |= DATA.mask();
    }

    /// Device: stop driving `range`.
    pub fn device_release(&mut self, range: BitRange) {
        log::trace!("    device: release {range}");
        self.device.release(range);
    }

    /// Resolved state of all 38 lines. Floating lines read 0.
    pub fn raw(&self) -> u64 {
        let device_only = self.device.enable & !self.controller.enable;
        (self.controller.value & self.controller.enable) | (self.device.value & device_only)
    }

    /// Sample `range`. Never blocks.
    pub fn monitor(&self, range: BitRange) -> u64 {
        range.extract(self.raw())
    }

    /// Render `range` as a binary string, most significant bit first.
    pub fn binstr(&self, range: BitRange) -> String {
        format!(
            "{:0width$b}",
            self.monitor(range),
            width = range.width() as usize
        )
    }

    /// Lines both sides drive with different values.
    pub fn contention(&self) -> u64 {
        self.controller.enable & self.device.enable & (self.controller.value ^ self.device.value)
    }

    /// Lines currently driven by the controller.
    pub fn controller_enable(&self) -> u64 {
        self.controller.enable
    }

    /// Device: set the management (acknowledgement) line.
    pub fn set_ack(&mut self, level: bool) {
        log::trace!("    device: ack <- {}", u8::from(level));
        self.ack = Some(level);
    }

    /// Current level of the acknowledgement line; `None` while nothing drives it.
    pub fn ack(&self) -> Option<bool> {
        self.ack
    }
}

//! Clocked testbench: the bus, the device side, and a cycle counter.
//!
//! The controller and the device never run at the same time. The controller
//! acts on the bus, then yields by calling [`Testbench::step`], which lets the
//! device react for exactly one clock cycle.

use crate::bus::GpioBus;

/// Device side of the bus.
pub trait Peer {
    /// Advance the device by one clock cycle.
    fn on_clock(&mut self, bus: &mut GpioBus);
}

impl<P: Peer + ?Sized> Peer for Box<P> {
    fn on_clock(&mut self, bus: &mut GpioBus) {
        (**self).on_clock(bus)
    }
}

/// The bus together with the device attached to it.
#[derive(Debug)]
pub struct Testbench<P> {
    bus: GpioBus,
    peer: P,
    cycle: u64,
    contention_cycles: u64,
}

impl<P: Peer> Testbench<P> {
    pub fn new(peer: P) -> Self {
        Self {
            bus: GpioBus::new(),
            peer,
            cycle: 0,
            contention_cycles: 0,
        }
    }

    /// Advance the clock one cycle.
    pub fn step(&mut self) {
        self.peer.on_clock(&mut self.bus);
        self.cycle += 1;

        let contention = self.bus.contention();
        if contention != 0 {
            self.contention_cycles += 1;
            log::warn!("cycle {}: bus contention on lines 0x{:010X}", self.cycle, contention);
        }
    }

    pub fn bus(&self) -> &GpioBus {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut GpioBus {
        &mut self.bus
    }

    pub fn peer(&self) -> &P {
        &self.peer
    }

    pub fn into_peer(self) -> P {
        self.peer
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// Cycles that ended with both sides driving a line to different levels.
    pub fn contention_cycles(&self) -> u64 {
        self.contention_cycles
    }
}

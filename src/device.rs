//! Reference peer: the coprocessor side of the handshake.
//!
//! The peer boots, acknowledges the mode select, and then acknowledges every
//! phase the controller presents after a random number of cycles. In
//! autonomous mode it ignores the phase selector and works through its own
//! program, presenting one result per acknowledgement.
//!
//! Arithmetic uses the host's binary32 operations, which round to nearest
//! even. Every NaN is replaced by the canonical quiet NaN.

use crate::bench::Peer;
use crate::bus::{self, GpioBus};
use crate::codec::{Command, Opcode, Phase};
use crate::config::{DeviceConfig, ProtocolConfig};
use crate::vectors::CANONICAL_NAN;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Compute what the coprocessor returns for `opcode` on two bit patterns.
///
/// The unary opcode takes the square root of operand 1, which is what the
/// reference vectors for it hold; operand 2 is ignored. Division by either
/// zero yields the canonical NaN rather than an infinity.
pub fn execute(opcode: Opcode, operand1: u32, operand2: u32) -> u32 {
    let (x, y) = (f32::from_bits(operand1), f32::from_bits(operand2));
    let r = match opcode {
        Opcode::Add => x + y,
        Opcode::Multiply => x * y,
        Opcode::Divide if y == 0.0 => f32::NAN,
        Opcode::Divide => x / y,
        Opcode::Round => x.sqrt(),
    };
    if r.is_nan() {
        CANONICAL_NAN
    } else {
        r.to_bits()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Booting,
    ModeSelect { acks_left: u8 },
    /// Direct mode: waiting for the controller to present this phase.
    Awaiting(Phase),
    /// Autonomous mode: about to present the next program result.
    Computing,
    /// A result is on the bus; waiting to hand the data range back.
    Releasing,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Boot,
    AckMode(u8),
    Latch(Command),
    PresentResult,
    Release,
    Complete,
}

#[derive(Debug, Clone, Copy)]
struct Pending {
    remaining: u32,
    action: Action,
}

/// Reference FPU peer.
#[derive(Debug)]
pub struct FpuDevice {
    config: DeviceConfig,
    mode_select: u8,
    mode_acks: u8,
    release_ack: bool,
    completion_ack: bool,
    /// `Some` in autonomous mode.
    program: Option<Vec<(Opcode, u32, u32)>>,
    rng: StdRng,

    stage: Stage,
    pending: Option<Pending>,
    level: Option<bool>,
    operand1: u32,
    operand2: u32,
    result: u32,
    served: usize,
    driving_data: bool,

    result_xor: u32,
    stall_after: Option<usize>,

    seen: Vec<Command>,
    acks: Vec<bool>,
}

impl FpuDevice {
    /// Peer for direct control: every phase is driven by the controller.
    pub fn new(config: &DeviceConfig, protocol: &ProtocolConfig) -> Self {
        Self {
            config: config.clone(),
            mode_select: protocol.mode_select,
            mode_acks: protocol.mode_acks.max(1),
            release_ack: protocol.release_ack,
            completion_ack: protocol.completion_ack,
            program: None,
            rng: StdRng::seed_from_u64(config.seed),
            stage: Stage::Booting,
            pending: None,
            level: None,
            operand1: 0,
            operand2: 0,
            result: 0,
            served: 0,
            driving_data: false,
            result_xor: 0,
            stall_after: None,
            seen: Vec::new(),
            acks: Vec::new(),
        }
    }

    /// Peer that runs its own program and only reports results.
    pub fn autonomous(
        config: &DeviceConfig,
        protocol: &ProtocolConfig,
        program: impl IntoIterator<Item = (Opcode, u32, u32)>,
    ) -> Self {
        Self {
            program: Some(program.into_iter().collect()),
            ..Self::new(config, protocol)
        }
    }

    /// Flip these bits of every result before presenting it.
    pub fn with_result_xor(mut self, mask: u32) -> Self {
        self.result_xor = mask;
        self
    }

    /// Stop acknowledging after `acks` toggles.
    pub fn stall_after(mut self, acks: usize) -> Self {
        self.stall_after = Some(acks);
        self
    }

    /// Commands acknowledged so far, in order.
    pub fn seen(&self) -> &[Command] {
        &self.seen
    }

    /// Levels driven on the acknowledgement line, in order.
    pub fn acks(&self) -> &[bool] {
        &self.acks
    }

    pub fn is_done(&self) -> bool {
        self.stage == Stage::Done
    }

    fn latency(&mut self) -> u32 {
        let (a, b) = (self.config.min_latency, self.config.max_latency);
        self.rng.gen_range(a.min(b)..=a.max(b))
    }

    fn toggle(&mut self, bus: &mut GpioBus) {
        let level = self.level.map_or(false, |l| !l);
        self.level = Some(level);
        self.acks.push(level);
        bus.set_ack(level);
    }

    fn stalled(&self) -> bool {
        self.stall_after.is_some_and(|n| self.acks.len() >= n)
    }

    fn after_mode(&self) -> Stage {
        match self.program {
            Some(_) => Stage::Computing,
            None => Stage::Awaiting(Phase::Operand1),
        }
    }

    /// Decide what to do next from the current bus state.
    fn next_action(&mut self, bus: &mut GpioBus) -> Option<(Action, u32)> {
        let command = Command::decode(bus.raw());

        // Without a release acknowledgement the data range is handed back
        // as soon as the controller leaves the result phase.
        if self.driving_data && self.program.is_none() && !matches!(command, Ok(Command::Result))
        {
            bus.device_release(bus::DATA);
            self.driving_data = false;
        }

        let action = match self.stage {
            Stage::Booting => return Some((Action::Boot, self.config.boot_cycles)),
            Stage::ModeSelect { acks_left } => match command {
                Ok(Command::ModeSelect(mode)) if mode == self.mode_select => {
                    Action::AckMode(acks_left)
                }
                _ => return None,
            },
            Stage::Awaiting(phase) => match (phase, command) {
                (Phase::Operand1, Ok(cmd @ Command::Operand1(_)))
                | (Phase::Operand2, Ok(cmd @ Command::Operand2(_))) => Action::Latch(cmd),
                (Phase::Control, Ok(cmd @ Command::Control { .. }))
                    if bus.monitor(bus::STROBE) == 1 =>
                {
                    Action::Latch(cmd)
                }
                (Phase::Result, Ok(Command::Result)) => Action::PresentResult,
                // Mode select after at least one result ends the run.
                (Phase::Operand1, Ok(Command::ModeSelect(_)))
                    if self.completion_ack && self.served > 0 =>
                {
                    Action::Complete
                }
                _ => return None,
            },
            Stage::Computing => {
                let total = self.program.as_ref().map_or(0, Vec::len);
                if self.served < total {
                    Action::PresentResult
                } else if self.completion_ack {
                    Action::Complete
                } else {
                    self.stage = Stage::Done;
                    return None;
                }
            }
            Stage::Releasing => Action::Release,
            Stage::Done => return None,
        };
        Some((action, self.latency()))
    }

    fn perform(&mut self, action: Action, bus: &mut GpioBus) {
        match action {
            Action::Boot => {
                log::debug!("    device: booted");
                self.stage = if self.mode_acks > 1 {
                    Stage::ModeSelect { acks_left: self.mode_acks - 1 }
                } else {
                    self.after_mode()
                };
            }
            Action::AckMode(acks_left) => {
                log::debug!("    device: <- mode 0b{:03b}", self.mode_select);
                self.seen.push(Command::ModeSelect(self.mode_select));
                self.stage = if acks_left > 1 {
                    Stage::ModeSelect { acks_left: acks_left - 1 }
                } else {
                    self.after_mode()
                };
            }
            Action::Latch(cmd) => {
                log::debug!("    device: <- {cmd:?}");
                self.seen.push(cmd);
                self.stage = match cmd {
                    Command::Operand1(value) => {
                        self.operand1 = value;
                        Stage::Awaiting(Phase::Operand2)
                    }
                    Command::Operand2(value) => {
                        self.operand2 = value;
                        Stage::Awaiting(Phase::Control)
                    }
                    Command::Control { opcode, .. } => {
                        self.result = execute(opcode, self.operand1, self.operand2);
                        Stage::Awaiting(Phase::Result)
                    }
                    _ => self.stage,
                };
            }
            Action::PresentResult => {
                if let Some(program) = &self.program {
                    let (opcode, a, b) = program[self.served];
                    self.result = execute(opcode, a, b);
                }
                let value = self.result ^ self.result_xor;
                log::debug!("    device: result 0x{value:08x} ->");
                bus.device_present(value);
                self.driving_data = true;
                self.seen.push(Command::Result);
                self.served += 1;
                self.stage = if self.release_ack {
                    Stage::Releasing
                } else {
                    self.after_mode()
                };
            }
            Action::Release => {
                bus.device_release(bus::DATA);
                self.driving_data = false;
                self.stage = self.after_mode();
            }
            Action::Complete => {
                log::debug!("    device: run complete after {} results", self.served);
                self.stage = Stage::Done;
            }
        }
        self.toggle(bus);
    }
}

impl Peer for FpuDevice {
    fn on_clock(&mut self, bus: &mut GpioBus) {
        match self.pending.take() {
            Some(Pending { remaining, action }) if remaining > 0 => {
                self.pending = Some(Pending { remaining: remaining - 1, action });
            }
            Some(pending) if self.stalled() => {
                self.pending = Some(pending);
            }
            Some(Pending { action, .. }) => self.perform(action, bus),
            None => {
                if let Some((action, remaining)) = self.next_action(bus) {
                    self.pending = Some(Pending { remaining, action });
                }
            }
        }
    }
}

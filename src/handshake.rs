//! Handshake state machine.
//!
//! ```text
//! Idle -> AwaitModeAck -> [ Enter(Operand1) -> AwaitPhaseAck(Operand1)
//!                           -> ... -> Enter(Result) -> AwaitPhaseAck(Result)
//!                           -> AwaitReleaseAck ]*  -> AwaitCompletionAck -> Done
//! ```
//!
//! The machine never blocks. [`Handshake::step`] does as much as it can
//! without the clock and returns [`Step::Yield`] when it is waiting on the
//! acknowledgement line; the caller advances the clock one cycle and steps
//! again.
//!
//! The acknowledgement toggles once per completed phase. The controller only
//! accepts the opposite of the last level it consumed, so a level left over
//! from the previous phase can never be taken for a new acknowledgement.

use crate::bus::{self, GpioBus};
use crate::codec::{decode_data, Command, Phase};
use crate::config::{ProtocolConfig, ProtocolMode};
use crate::error::{ProtocolError, Result};
use crate::vectors::TestVector;

/// What an acknowledgement completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckKind {
    /// Boot-ready and configuration-ok after mode select.
    Mode,
    /// One data/control/result phase of a vector.
    Phase,
    /// The device handed the data range back after a result.
    Release,
    /// End of run.
    Completion,
}

/// One consumed acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckRecord {
    pub kind: AckKind,
    pub phase: Phase,
    pub vector: Option<usize>,
    pub level: bool,
    pub cycle: u64,
}

/// Mutable state of one run.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub phase: Phase,
    pub expected_ack: bool,
    pub vector_index: usize,
    pub cycles: u64,
    pub acks: Vec<AckRecord>,
}

impl RunContext {
    pub fn new() -> Self {
        Self {
            phase: Phase::ModeSelect,
            expected_ack: false,
            vector_index: 0,
            cycles: 0,
            acks: Vec::new(),
        }
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    Idle,
    AwaitModeAck { remaining: u8 },
    Enter(Phase),
    AwaitPhaseAck(Phase),
    AwaitReleaseAck,
    AwaitCompletionAck,
    Done,
}

/// Outcome of one call to [`Handshake::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Waiting on the peer; advance the clock before stepping again.
    Yield,
    /// Progress was made; step again without advancing the clock.
    Continue,
    /// The result of a vector was sampled from the data range.
    Sampled { index: usize, actual: u32 },
    /// Terminal state reached.
    Done,
}

pub struct Handshake<'a> {
    config: &'a ProtocolConfig,
    vectors: &'a [TestVector],
    state: HandshakeState,
}

impl<'a> Handshake<'a> {
    pub fn new(config: &'a ProtocolConfig, vectors: &'a [TestVector]) -> Self {
        Self {
            config,
            vectors,
            state: HandshakeState::Idle,
        }
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// Phase each vector starts with.
    fn first_phase(&self) -> Phase {
        match self.config.mode {
            ProtocolMode::Full => Phase::Operand1,
            ProtocolMode::ResultOnly => Phase::Result,
        }
    }

    fn command(&self, phase: Phase, vector: &TestVector) -> Command {
        match phase {
            Phase::ModeSelect => Command::ModeSelect(self.config.mode_select),
            Phase::Operand1 => Command::Operand1(vector.operand1),
            Phase::Operand2 => Command::Operand2(vector.operand2),
            Phase::Control => Command::Control {
                opcode: vector.opcode,
                rounding: self.config.rounding(),
            },
            Phase::Result => Command::Result,
        }
    }

    pub fn step(&mut self, ctx: &mut RunContext, bus: &mut GpioBus) -> Result<Step> {
        match self.state {
            HandshakeState::Idle => {
                let command = Command::ModeSelect(self.config.mode_select);
                log::debug!("controller: {command:?} ->");
                command.apply(bus)?;
                ctx.phase = Phase::ModeSelect;
                self.state = if self.config.mode_acks > 0 {
                    HandshakeState::AwaitModeAck { remaining: self.config.mode_acks }
                } else {
                    self.start_vector(ctx, bus)?
                };
            }
            HandshakeState::AwaitModeAck { remaining } => {
                if !self.poll(ctx, bus, AckKind::Mode)? {
                    return Ok(Step::Yield);
                }
                self.state = if remaining > 1 {
                    HandshakeState::AwaitModeAck { remaining: remaining - 1 }
                } else {
                    self.start_vector(ctx, bus)?
                };
            }
            HandshakeState::Enter(phase) => {
                let vector = &self.vectors[ctx.vector_index];
                if self.config.mode == ProtocolMode::Full {
                    let command = self.command(phase, vector);
                    log::debug!("controller: {command:?} ->");
                    command.apply(bus)?;
                }
                ctx.phase = phase;
                self.state = HandshakeState::AwaitPhaseAck(phase);
            }
            HandshakeState::AwaitPhaseAck(phase) => {
                if !self.poll(ctx, bus, AckKind::Phase)? {
                    return Ok(Step::Yield);
                }
                log::debug!(
                    "controller: <- {phase:?} IO[37:32] = 0b{}, IO[31:0] = 0x{:08x}",
                    bus.binstr(bus::CONTROL),
                    bus.monitor(bus::DATA)
                );
                match phase.next() {
                    Some(next) => self.state = HandshakeState::Enter(next),
                    None => {
                        let index = ctx.vector_index;
                        let actual = decode_data(bus.raw());
                        self.state = if self.config.release_ack {
                            HandshakeState::AwaitReleaseAck
                        } else {
                            self.next_vector(ctx, bus)?
                        };
                        return Ok(Step::Sampled { index, actual });
                    }
                }
            }
            HandshakeState::AwaitReleaseAck => {
                if !self.poll(ctx, bus, AckKind::Release)? {
                    return Ok(Step::Yield);
                }
                self.state = self.next_vector(ctx, bus)?;
            }
            HandshakeState::AwaitCompletionAck => {
                if !self.poll(ctx, bus, AckKind::Completion)? {
                    return Ok(Step::Yield);
                }
                self.state = HandshakeState::Done;
            }
            HandshakeState::Done => return Ok(Step::Done),
        }
        Ok(Step::Continue)
    }

    fn next_vector(&self, ctx: &mut RunContext, bus: &mut GpioBus) -> Result<HandshakeState> {
        ctx.vector_index += 1;
        self.start_vector(ctx, bus)
    }

    fn start_vector(&self, ctx: &mut RunContext, bus: &mut GpioBus) -> Result<HandshakeState> {
        if ctx.vector_index < self.vectors.len() {
            return Ok(HandshakeState::Enter(self.first_phase()));
        }
        if !self.config.completion_ack {
            return Ok(HandshakeState::Done);
        }
        // Hand the bus back to mode select; the device answers with a final toggle.
        if self.config.mode == ProtocolMode::Full {
            let command = Command::ModeSelect(self.config.mode_select);
            log::debug!("controller: {command:?} ->");
            command.apply(bus)?;
        }
        ctx.phase = Phase::ModeSelect;
        Ok(HandshakeState::AwaitCompletionAck)
    }

    /// Consume the expected acknowledgement if it is on the line.
    fn poll(&self, ctx: &mut RunContext, bus: &GpioBus, kind: AckKind) -> Result<bool> {
        let vector = (ctx.phase != Phase::ModeSelect && ctx.vector_index < self.vectors.len())
            .then_some(ctx.vector_index);

        if bus.ack() == Some(ctx.expected_ack) {
            log::trace!("controller: <- ack {} ({kind:?})", u8::from(ctx.expected_ack));
            ctx.acks.push(AckRecord {
                kind,
                phase: ctx.phase,
                vector,
                level: ctx.expected_ack,
                cycle: ctx.cycles,
            });
            ctx.expected_ack = !ctx.expected_ack;
            return Ok(true);
        }

        if ctx.cycles >= self.config.timeout_cycles {
            return Err(ProtocolError::HandshakeTimeout {
                phase: ctx.phase,
                vector,
                expected: u8::from(ctx.expected_ack),
                cycles: ctx.cycles,
            });
        }
        Ok(false)
    }
}

//! fpu-harness library
//!
//! Drives test vectors into a floating-point coprocessor over a 38-line GPIO
//! bus and checks its results. Commands are split into phases that share the
//! bus; a single toggling acknowledgement line paces each phase.

pub mod bench;
pub mod bus;
pub mod codec;
pub mod config;
pub mod device;
pub mod error;
pub mod handshake;
pub mod sequencer;
pub mod vectors;

pub use bench::{Peer, Testbench};
pub use bus::{BitRange, GpioBus};
pub use codec::{Command, Opcode, Phase};
pub use config::{HarnessConfig, ProtocolConfig, ProtocolMode};
pub use device::FpuDevice;
pub use error::ProtocolError;
pub use sequencer::{RunReport, Sequencer};
pub use vectors::TestVector;

//! Stimulus/verification sequencer.
//!
//! Drives every vector through the handshake machine, compares each sampled
//! result bit-for-bit with its reference, and collects the outcomes. A
//! mismatch is recorded and the run continues; only a protocol error ends it.

use crate::bench::{Peer, Testbench};
use crate::bus;
use crate::config::ProtocolConfig;
use crate::error::Result;
use crate::handshake::{AckRecord, Handshake, RunContext, Step};
use crate::vectors::TestVector;
use std::fmt;

/// Result comparison. Equality of raw bit patterns: a NaN result only
/// matches the exact NaN encoding it is expected to have.
pub fn bits_match(actual: u32, expected: u32) -> bool {
    actual == expected
}

/// Outcome of one vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VectorResult {
    pub index: usize,
    pub vector: TestVector,
    pub actual: u32,
}

impl VectorResult {
    pub fn passed(&self) -> bool {
        bits_match(self.actual, self.vector.expected)
    }

    pub fn mismatch(&self) -> Option<Mismatch> {
        (!self.passed()).then_some(Mismatch {
            index: self.index,
            expected: self.vector.expected,
            actual: self.actual,
        })
    }
}

/// A result that differs from its reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mismatch {
    pub index: usize,
    pub expected: u32,
    pub actual: u32,
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "vector #{}: IO[31:0] = 0x{:08x}, expected 0x{:08x}",
            self.index, self.actual, self.expected
        )
    }
}

/// Everything a completed run produced.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub results: Vec<VectorResult>,
    pub cycles: u64,
    pub acks: Vec<AckRecord>,
}

impl RunReport {
    pub fn pass_count(&self) -> usize {
        self.results.iter().filter(|r| r.passed()).count()
    }

    pub fn fail_count(&self) -> usize {
        self.results.len() - self.pass_count()
    }

    pub fn mismatches(&self) -> Vec<Mismatch> {
        self.results.iter().filter_map(VectorResult::mismatch).collect()
    }

    /// Overall verdict: every vector matched.
    pub fn passed(&self) -> bool {
        self.fail_count() == 0
    }
}

pub struct Sequencer<'a> {
    config: &'a ProtocolConfig,
}

impl<'a> Sequencer<'a> {
    pub fn new(config: &'a ProtocolConfig) -> Self {
        Self { config }
    }

    /// Run all `vectors` against the device attached to `bench`.
    pub fn run<P: Peer>(
        &self,
        bench: &mut Testbench<P>,
        vectors: &[TestVector],
    ) -> Result<RunReport> {
        let mut machine = Handshake::new(self.config, vectors);
        let mut ctx = RunContext::new();
        let mut results = Vec::with_capacity(vectors.len());

        log::info!("Control:    IO[37:32] = '{}'", bench.bus().binstr(bus::CONTROL));
        log::info!("Switchable: IO[31:0]  = '{}'", bench.bus().binstr(bus::DATA));

        loop {
            let step = machine.step(&mut ctx, bench.bus_mut()).map_err(|e| {
                log::error!("{e}");
                e
            })?;
            match step {
                Step::Yield => {
                    bench.step();
                    ctx.cycles += 1;
                }
                Step::Continue => {}
                Step::Sampled { index, actual } => {
                    let result = VectorResult {
                        index,
                        vector: vectors[index],
                        actual,
                    };
                    report(&result);
                    results.push(result);
                }
                Step::Done => break,
            }
        }

        let report = RunReport {
            results,
            cycles: ctx.cycles,
            acks: ctx.acks,
        };
        if report.passed() {
            log::info!(
                "[TEST PASSED] {} vectors in {} cycles",
                report.results.len(),
                report.cycles
            );
        } else {
            log::error!(
                "[TEST FAILED] {} of {} vectors mismatched",
                report.fail_count(),
                report.results.len()
            );
        }
        Ok(report)
    }
}

fn report(result: &VectorResult) {
    let v = &result.vector;
    log::info!("Operation #{}: {}", result.index, v);
    match result.mismatch() {
        None => log::info!(
            "[TEST PASS] IO[31:0]  = 0x{:08x}     expected = 0x{:08x}",
            result.actual,
            v.expected
        ),
        Some(m) => log::error!(
            "[TEST FAIL] IO[31:0]  = 0x{:08x}     expected = 0x{:08x}",
            m.actual,
            m.expected
        ),
    }
}

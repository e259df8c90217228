//! End-to-end runs of the sequencer against the reference peer.

use fpu_harness::bench::{Peer, Testbench};
use fpu_harness::bus::GpioBus;
use fpu_harness::codec::{Command, Opcode, Phase};
use fpu_harness::config::{DeviceConfig, ProtocolConfig, ProtocolMode};
use fpu_harness::device::FpuDevice;
use fpu_harness::error::ProtocolError;
use fpu_harness::handshake::AckKind;
use fpu_harness::sequencer::{Mismatch, RunReport, Sequencer};
use fpu_harness::vectors::{TestVector, CANONICAL_NAN, REFERENCE_SUITE};

const ADD: TestVector = TestVector::new(0x43187d07, 0x439af94e, Opcode::Add, 0x43e737d2);
const DIVIDE: TestVector = TestVector::new(0xc38dc2c6, 0xc3983be4, Opcode::Divide, 0x3f6e6360);
const ROUND_NAN: TestVector =
    TestVector::new(0xc3fb5d7a, 0x00000000, Opcode::Round, CANONICAL_NAN);

fn device_config(seed: u64) -> DeviceConfig {
    DeviceConfig {
        seed,
        ..DeviceConfig::default()
    }
}

fn run_full(protocol: &ProtocolConfig, vectors: &[TestVector]) -> (RunReport, FpuDevice, u64) {
    let device = FpuDevice::new(&device_config(3), protocol);
    let mut bench = Testbench::new(device);
    let report = Sequencer::new(protocol).run(&mut bench, vectors).unwrap();
    let contention = bench.contention_cycles();
    (report, bench.into_peer(), contention)
}

#[test]
fn scenario_add_passes() {
    let (report, _, _) = run_full(&ProtocolConfig::default(), &[ADD]);
    assert!(report.passed());
    assert_eq!(report.results[0].actual, 0x43e737d2);
}

#[test]
fn scenario_divide_passes() {
    let (report, _, _) = run_full(&ProtocolConfig::default(), &[DIVIDE]);
    assert!(report.passed());
    assert_eq!(report.results[0].actual, 0x3f6e6360);
}

#[test]
fn scenario_nan_passes_by_bit_pattern() {
    let (report, _, _) = run_full(&ProtocolConfig::default(), &[ROUND_NAN]);
    assert!(report.passed());
    let actual = report.results[0].actual;
    assert_eq!(actual, CANONICAL_NAN);
    // The same result would fail a numeric comparison.
    assert!(f32::from_bits(actual).is_nan());
    assert!(f32::from_bits(actual).partial_cmp(&f32::from_bits(CANONICAL_NAN)).is_none());
}

#[test]
fn divide_by_zero_matches_canonical_nan() {
    let by_zero = TestVector::new(0xc38dc2c6, 0x0000_0000, Opcode::Divide, CANONICAL_NAN);
    let by_neg_zero = TestVector { operand2: 0x8000_0000, ..by_zero };
    let (report, _, _) = run_full(&ProtocolConfig::default(), &[by_zero, by_neg_zero]);

    assert!(report.passed(), "{:?}", report.mismatches());
    for result in &report.results {
        assert_eq!(result.actual, CANONICAL_NAN);
        // A numeric comparison would have failed this vector.
        assert!(f32::from_bits(result.actual) != f32::from_bits(result.vector.expected));
    }
}

#[test]
fn scenario_injected_mismatch_completes_run() {
    let wrong = TestVector { expected: 0x0000_0000, ..ADD };
    let (report, device, _) = run_full(&ProtocolConfig::default(), &[wrong, DIVIDE]);

    assert!(!report.passed());
    assert_eq!(report.results.len(), 2);
    assert_eq!(
        report.mismatches(),
        [Mismatch { index: 0, expected: 0, actual: 0x43e737d2 }]
    );
    assert!(report.results[1].passed());
    assert!(device.is_done());
}

#[test]
fn reference_suite_passes_in_full_mode() {
    let (report, _, contention) = run_full(&ProtocolConfig::default(), &REFERENCE_SUITE);
    assert!(report.passed(), "{:?}", report.mismatches());
    assert_eq!(report.pass_count(), REFERENCE_SUITE.len());
    assert_eq!(contention, 0);
}

#[test]
fn reference_suite_passes_without_optional_acks() {
    let protocol = ProtocolConfig {
        release_ack: false,
        completion_ack: false,
        ..ProtocolConfig::default()
    };
    let (report, _, contention) = run_full(&protocol, &REFERENCE_SUITE);
    assert!(report.passed(), "{:?}", report.mismatches());
    assert_eq!(contention, 0);
    assert!(report.acks.iter().all(|a| a.kind != AckKind::Release));
}

#[test]
fn reference_suite_passes_in_result_only_mode() {
    for (release_ack, completion_ack) in [(true, true), (false, false)] {
        let protocol = ProtocolConfig {
            mode: ProtocolMode::ResultOnly,
            release_ack,
            completion_ack,
            ..ProtocolConfig::default()
        };
        let program = REFERENCE_SUITE.iter().map(|v| (v.opcode, v.operand1, v.operand2));
        let device = FpuDevice::autonomous(&device_config(11), &protocol, program);
        let mut bench = Testbench::new(device);
        let report = Sequencer::new(&protocol).run(&mut bench, &REFERENCE_SUITE).unwrap();
        assert!(report.passed(), "{:?}", report.mismatches());
        assert_eq!(report.results.len(), REFERENCE_SUITE.len());

        // Only the mode select was ever driven.
        let phases: Vec<Phase> = bench
            .peer()
            .seen()
            .iter()
            .map(Command::phase)
            .filter(|p| *p != Phase::ModeSelect)
            .collect();
        assert_eq!(phases, vec![Phase::Result; REFERENCE_SUITE.len()]);
    }
}

#[test]
fn acknowledgements_alternate_from_zero() {
    for seed in 0..4 {
        let protocol = ProtocolConfig::default();
        let device = FpuDevice::new(&device_config(seed), &protocol);
        let mut bench = Testbench::new(device);
        let report = Sequencer::new(&protocol).run(&mut bench, &REFERENCE_SUITE).unwrap();

        let levels: Vec<bool> = report.acks.iter().map(|a| a.level).collect();
        assert_eq!(levels.first(), Some(&false));
        for pair in levels.windows(2) {
            assert_eq!(pair[1], !pair[0]);
        }
        // What the controller consumed is exactly what the device drove.
        assert_eq!(levels, bench.peer().acks());

        // 2 mode + 9 * (4 phases + release) + completion
        assert_eq!(levels.len(), 2 + REFERENCE_SUITE.len() * 5 + 1);
    }
}

#[test]
fn phases_arrive_in_order() {
    let (_, device, _) = run_full(&ProtocolConfig::default(), &[ADD, DIVIDE, ROUND_NAN]);
    let seen = device.seen();
    assert_eq!(seen[0], Command::ModeSelect(0b001));

    let phases: Vec<Phase> = seen[1..].iter().map(Command::phase).collect();
    for chunk in phases.chunks(4) {
        assert_eq!(chunk, Phase::SEQUENCE);
    }
    assert_eq!(phases.len(), 12);

    assert_eq!(seen[1], Command::Operand1(ADD.operand1));
    assert_eq!(seen[2], Command::Operand2(ADD.operand2));
    assert!(matches!(seen[3], Command::Control { opcode: Opcode::Add, .. }));
    assert!(matches!(seen[11], Command::Control { opcode: Opcode::Round, .. }));
}

#[test]
fn different_nan_payload_fails() {
    let protocol = ProtocolConfig::default();
    let device = FpuDevice::new(&device_config(5), &protocol).with_result_xor(0x0000_0001);
    let mut bench = Testbench::new(device);
    let report = Sequencer::new(&protocol).run(&mut bench, &[ROUND_NAN]).unwrap();

    assert_eq!(report.results[0].actual, 0x7fc0_0001);
    assert!(f32::from_bits(report.results[0].actual).is_nan());
    assert!(!report.passed());
}

#[test]
fn swapped_latency_bounds_still_run() {
    let protocol = ProtocolConfig::default();
    let config = DeviceConfig {
        min_latency: 5,
        max_latency: 2,
        ..device_config(0)
    };
    let device = FpuDevice::new(&config, &protocol);
    let mut bench = Testbench::new(device);
    let report = Sequencer::new(&protocol).run(&mut bench, &[ADD, DIVIDE]).unwrap();
    assert!(report.passed());
}

/// A device that never touches the acknowledgement line.
struct Silent;

impl Peer for Silent {
    fn on_clock(&mut self, _bus: &mut GpioBus) {}
}

#[test]
fn silent_peer_times_out_within_budget() {
    let protocol = ProtocolConfig {
        timeout_cycles: 500,
        ..ProtocolConfig::default()
    };
    let mut bench = Testbench::new(Silent);
    let err = Sequencer::new(&protocol).run(&mut bench, &[ADD]).unwrap_err();

    assert_eq!(
        err,
        ProtocolError::HandshakeTimeout {
            phase: Phase::ModeSelect,
            vector: None,
            expected: 0,
            cycles: 500,
        }
    );
    assert!(bench.cycle() <= 500);
}

#[test]
fn stalled_peer_times_out_mid_vector() {
    let protocol = ProtocolConfig {
        timeout_cycles: 2_000,
        ..ProtocolConfig::default()
    };
    // Boot, config-ok, then all five acks of vector 0, then Operand1 and
    // Operand2 of vector 1.
    let device = FpuDevice::new(&device_config(1), &protocol).stall_after(2 + 5 + 2);
    let mut bench = Testbench::new(device);
    let err = Sequencer::new(&protocol).run(&mut bench, &[ADD, DIVIDE]).unwrap_err();

    match err {
        ProtocolError::HandshakeTimeout { phase, vector, cycles, .. } => {
            assert_eq!(phase, Phase::Control);
            assert_eq!(vector, Some(1));
            assert!(cycles <= 2_000);
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert!(bench.cycle() <= 2_000);
}

#[test]
fn out_of_range_mode_select_aborts() {
    let protocol = ProtocolConfig {
        mode_select: 0b1000,
        ..ProtocolConfig::default()
    };
    let mut bench = Testbench::new(Silent);
    let err = Sequencer::new(&protocol).run(&mut bench, &[ADD]).unwrap_err();
    assert!(matches!(err, ProtocolError::OutOfRange { width: 3, .. }));
    assert_eq!(bench.cycle(), 0);
}

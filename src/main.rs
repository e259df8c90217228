//! fpu-harness: run FPU test vectors over the GPIO handshake protocol.

use anyhow::bail;
use clap::Parser;
use fpu_harness::vectors::{self, REFERENCE_SUITE};
use fpu_harness::{FpuDevice, HarnessConfig, ProtocolMode, Sequencer, Testbench};
use std::path::PathBuf;

/// Run FPU test vectors against the reference peer.
#[derive(Debug, Parser)]
#[command(name = "fpu-harness", version)]
struct Args {
    /// Load configuration from FILE (default: ./fpu-harness.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Load test vectors from FILE (default: built-in reference suite)
    #[arg(long, value_name = "FILE")]
    vectors: Option<PathBuf>,

    /// Device advances phases itself; only read results
    #[arg(long)]
    result_only: bool,

    /// Seed for the device latency generator
    #[arg(long, value_name = "N")]
    seed: Option<u64>,

    /// Global cycle budget
    #[arg(long, value_name = "N")]
    timeout: Option<u64>,

    /// Flip these bits of every device result (hex)
    #[arg(
        long = "inject-fault",
        value_name = "MASK",
        value_parser = parse_hex_mask,
        default_value = "0"
    )]
    fault_mask: u32,
}

fn parse_hex_mask(s: &str) -> Result<u32, String> {
    let digits = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
    u32::from_str_radix(digits, 16).map_err(|e| format!("not a 32-bit hex mask: {e}"))
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let mut config = HarnessConfig::load(args.config.as_deref())?;
    if args.result_only {
        config.protocol.mode = ProtocolMode::ResultOnly;
    }
    if let Some(seed) = args.seed {
        config.device.seed = seed;
    }
    if let Some(timeout) = args.timeout {
        config.protocol.timeout_cycles = timeout;
    }
    config.validate()?;

    let vectors = match &args.vectors {
        Some(path) => vectors::from_file(path)?,
        None => REFERENCE_SUITE.to_vec(),
    };
    log::info!(
        "Running {} vectors in {:?} mode (timeout {} cycles)",
        vectors.len(),
        config.protocol.mode,
        config.protocol.timeout_cycles
    );

    let device = match config.protocol.mode {
        ProtocolMode::Full => FpuDevice::new(&config.device, &config.protocol),
        ProtocolMode::ResultOnly => FpuDevice::autonomous(
            &config.device,
            &config.protocol,
            vectors.iter().map(|v| (v.opcode, v.operand1, v.operand2)),
        ),
    }
    .with_result_xor(args.fault_mask);

    let mut bench = Testbench::new(device);
    let report = Sequencer::new(&config.protocol).run(&mut bench, &vectors)?;

    println!();
    println!(
        "{} passed, {} failed, {} cycles",
        report.pass_count(),
        report.fail_count(),
        report.cycles
    );
    for mismatch in report.mismatches() {
        println!("  {mismatch}");
    }
    if bench.contention_cycles() > 0 {
        log::warn!("{} cycles with bus contention", bench.contention_cycles());
    }

    if !report.passed() {
        bail!("{} of {} vectors failed", report.fail_count(), report.results.len());
    }
    Ok(())
}

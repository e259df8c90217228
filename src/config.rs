//! Configuration for fpu-harness.
//!
//! Configuration is loaded from multiple sources in priority order:
//! 1. Environment variables (`FPU_TIMEOUT_CYCLES`, `FPU_MODE`, `FPU_SEED`)
//! 2. An explicit config file, or `./fpu-harness.toml` if present
//! 3. Built-in defaults
//!
//! # Config File Format
//!
//! ```toml
//! # fpu-harness.toml
//! timeout_cycles = 1_000_000
//! mode = "full"          # or "result-only"
//! release_ack = true
//!
//! [device]
//! seed = 7
//! max_latency = 8
//! ```

use crate::bus;
use crate::codec::{RoundingMode, DIRECT_CONTROL_MODE};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default config file looked up in the working directory.
pub const LOCAL_CONFIG: &str = "fpu-harness.toml";

/// Which phases the controller drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProtocolMode {
    /// The controller drives operand 1, operand 2 and control, then reads the result.
    #[default]
    Full,
    /// Phases advance on the device side; the controller only selects the
    /// mode and then reads one result per acknowledgement.
    ResultOnly,
}

impl std::str::FromStr for ProtocolMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "full" => Ok(ProtocolMode::Full),
            "result-only" | "result_only" | "reduced" => Ok(ProtocolMode::ResultOnly),
            _ => Err(format!("unknown protocol mode '{s}'")),
        }
    }
}

/// Controller-side protocol parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Global cycle budget for the whole run.
    pub timeout_cycles: u64,
    pub mode: ProtocolMode,
    /// Value driven on `[34:32]` during mode select.
    pub mode_select: u8,
    /// Value driven on `[27:25]` during the control phase.
    pub rounding_mode: u8,
    /// Acknowledgements that complete mode select (boot-ready, config-ok).
    pub mode_acks: u8,
    /// Await a toggle after each result is sampled before starting the next vector.
    pub release_ack: bool,
    /// Return to mode select after the last vector and await a final toggle.
    pub completion_ack: bool,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            timeout_cycles: 1_000_000,
            mode: ProtocolMode::Full,
            mode_select: DIRECT_CONTROL_MODE,
            rounding_mode: RoundingMode::DEFAULT.0,
            mode_acks: 2,
            release_ack: true,
            completion_ack: true,
        }
    }
}

impl ProtocolConfig {
    pub fn rounding(&self) -> RoundingMode {
        RoundingMode(self.rounding_mode)
    }
}

/// Parameters of the reference peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Seed for the response-latency generator.
    pub seed: u64,
    /// Cycles between seeing a phase and acknowledging it, inclusive range.
    pub min_latency: u32,
    pub max_latency: u32,
    /// Cycles after reset before the boot-ready acknowledgement.
    pub boot_cycles: u32,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            min_latency: 1,
            max_latency: 8,
            boot_cycles: 16,
        }
    }
}

/// Complete harness configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    #[serde(flatten)]
    pub protocol: ProtocolConfig,
    pub device: DeviceConfig,
}

impl HarnessConfig {
    /// Load configuration from all sources.
    ///
    /// An explicit `path` must exist and parse; without one, `./fpu-harness.toml`
    /// is used if present.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(LOCAL_CONFIG).exists() => Self::from_file(Path::new(LOCAL_CONFIG))?,
            None => Self::default(),
        };
        config.apply_env_overrides()?;
        log::debug!("Loaded configuration: {:?}", config);
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config = Self::from_toml(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every field against the bus and protocol limits.
    pub fn validate(&self) -> anyhow::Result<()> {
        let protocol = &self.protocol;
        anyhow::ensure!(protocol.timeout_cycles > 0, "timeout_cycles must be positive");
        anyhow::ensure!(protocol.mode_acks > 0, "mode_acks must be at least 1 (boot-ready)");
        anyhow::ensure!(
            u64::from(protocol.mode_select) <= bus::MODE_SELECT.max_value(),
            "mode_select 0b{:b} does not fit {}",
            protocol.mode_select,
            bus::MODE_SELECT
        );
        anyhow::ensure!(
            u64::from(protocol.rounding_mode) <= bus::ROUNDING.max_value(),
            "rounding_mode 0b{:b} does not fit {}",
            protocol.rounding_mode,
            bus::ROUNDING
        );
        anyhow::ensure!(
            self.device.min_latency <= self.device.max_latency,
            "min_latency ({}) exceeds max_latency ({})",
            self.device.min_latency,
            self.device.max_latency
        );
        Ok(())
    }

    /// Apply environment variable overrides.
    fn apply_env_overrides(&mut self) -> anyhow::Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) -> anyhow::Result<()> {
        if let Some(value) = var("FPU_TIMEOUT_CYCLES") {
            log::info!("Using FPU_TIMEOUT_CYCLES from environment: {}", value);
            self.protocol.timeout_cycles = value
                .parse()
                .with_context(|| format!("FPU_TIMEOUT_CYCLES is not a number: {value}"))?;
        }
        if let Some(value) = var("FPU_MODE") {
            log::info!("Using FPU_MODE from environment: {}", value);
            self.protocol.mode = value.parse().map_err(anyhow::Error::msg)?;
        }
        if let Some(value) = var("FPU_SEED") {
            log::info!("Using FPU_SEED from environment: {}", value);
            self.device.seed = value
                .parse()
                .with_context(|| format!("FPU_SEED is not a number: {value}"))?;
        }
        self.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = HarnessConfig::default();
        assert_eq!(config.protocol.mode, ProtocolMode::Full);
        assert_eq!(config.protocol.mode_select, 0b001);
        assert_eq!(config.protocol.rounding(), RoundingMode(0b001));
        assert_eq!(config.protocol.mode_acks, 2);
        assert!(config.protocol.release_ack);
        assert!(config.protocol.completion_ack);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = HarnessConfig::from_toml(
            r#"
            timeout_cycles = 5000
            mode = "result-only"

            [device]
            seed = 42
            "#,
        )
        .unwrap();
        assert_eq!(config.protocol.timeout_cycles, 5000);
        assert_eq!(config.protocol.mode, ProtocolMode::ResultOnly);
        assert!(config.protocol.release_ack);
        assert_eq!(config.device.seed, 42);
        assert_eq!(config.device.max_latency, DeviceConfig::default().max_latency);
    }

    #[test]
    fn test_invalid_toml_rejected() {
        assert!(HarnessConfig::from_toml("mode = \"sideways\"").is_err());
        assert!(HarnessConfig::from_toml("timeout_cycles = 0").is_err());
        assert!(HarnessConfig::from_toml("mode_acks = 0").is_err());
        assert!(HarnessConfig::from_toml("[device]\nmin_latency = 9\nmax_latency = 2").is_err());
    }

    #[test]
    fn test_three_bit_fields_rejected_when_too_wide() {
        assert!(HarnessConfig::from_toml("mode_select = 0b111\nrounding_mode = 0b111").is_ok());

        let err = HarnessConfig::from_toml("mode_select = 0b1000").unwrap_err();
        assert!(err.to_string().contains("IO[34:32]"), "{err}");
        let err = HarnessConfig::from_toml("rounding_mode = 8").unwrap_err();
        assert!(err.to_string().contains("IO[27:25]"), "{err}");
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> =
            [("FPU_TIMEOUT_CYCLES", "1234"), ("FPU_MODE", "reduced"), ("FPU_SEED", "9")].into();
        let mut config = HarnessConfig::default();
        config
            .apply_overrides(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.protocol.timeout_cycles, 1234);
        assert_eq!(config.protocol.mode, ProtocolMode::ResultOnly);
        assert_eq!(config.device.seed, 9);

        let mut config = HarnessConfig::default();
        let bad = |key: &str| (key == "FPU_SEED").then(|| "many".to_string());
        assert!(config.apply_overrides(bad).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "release_ack = false\ncompletion_ack = false").unwrap();
        let config = HarnessConfig::from_file(file.path()).unwrap();
        assert!(!config.protocol.release_ack);
        assert!(!config.protocol.completion_ack);

        assert!(HarnessConfig::from_file(Path::new("/nonexistent/fpu-harness.toml")).is_err());
    }
}

//! Reference test vectors.
//!
//! Operands and results are raw IEEE-754 binary32 bit patterns. They are
//! never converted to `f32` for comparison.
//!
//! # Vector File Format
//!
//! ```toml
//! [[vector]]
//! operand1 = 0x43187d07
//! operand2 = 0x439af94e
//! opcode = "add"
//! expected = 0x43e737d2
//! ```

use crate::codec::Opcode;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// One input/expected-output case for the coprocessor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestVector {
    pub operand1: u32,
    #[serde(default)]
    pub operand2: u32,
    pub opcode: Opcode,
    pub expected: u32,
}

impl TestVector {
    pub const fn new(operand1: u32, operand2: u32, opcode: Opcode, expected: u32) -> Self {
        Self {
            operand1,
            operand2,
            opcode,
            expected,
        }
    }
}

impl fmt::Display for TestVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "0x{:08x} {} 0x{:08x} = 0x{:08x}",
            self.operand1, self.opcode, self.operand2, self.expected
        )
    }
}

/// Canonical quiet NaN produced by the coprocessor.
pub const CANONICAL_NAN: u32 = 0x7fc0_0000;

/// The reference suite the coprocessor was validated against.
pub const REFERENCE_SUITE: [TestVector; 9] = [
    TestVector::new(0x43187d07, 0x439af94e, Opcode::Add, 0x43e737d2),
    TestVector::new(0xc41ba642, 0x431292e9, Opcode::Add, 0xc3ee0310),
    TestVector::new(0x43765d11, 0xc4425485, Opcode::Multiply, 0xc83b03dd),
    TestVector::new(0xc3010b01, 0xc326b2ff, Opcode::Multiply, 0x46a80eba),
    TestVector::new(0xc38dc2c6, 0xc3983be4, Opcode::Divide, 0x3f6e6360),
    TestVector::new(0xc441751b, 0x436611ec, Opcode::Divide, 0xc05742d2),
    TestVector::new(0x4363dfa8, 0x00000000, Opcode::Round, 0x4171871b),
    TestVector::new(0x43311bc1, 0x00000000, Opcode::Round, 0x4154ee6c),
    TestVector::new(0xc3fb5d7a, 0x00000000, Opcode::Round, CANONICAL_NAN),
];

#[derive(Debug, Deserialize)]
struct VectorFile {
    #[serde(default, rename = "vector")]
    vectors: Vec<TestVector>,
}

/// Parse vectors from TOML text.
pub fn from_toml(content: &str) -> anyhow::Result<Vec<TestVector>> {
    let file: VectorFile = toml::from_str(content)?;
    anyhow::ensure!(!file.vectors.is_empty(), "no [[vector]] entries");
    for (i, v) in file.vectors.iter().enumerate() {
        if v.opcode.is_unary() && v.operand2 != 0 {
            log::warn!("vector #{i}: operand2 0x{:08x} is ignored by '{}'", v.operand2, v.opcode);
        }
    }
    Ok(file.vectors)
}

/// Load vectors from a TOML file.
pub fn from_file(path: &Path) -> anyhow::Result<Vec<TestVector>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read vectors from {}", path.display()))?;
    from_toml(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

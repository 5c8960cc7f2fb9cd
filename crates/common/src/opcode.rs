// OpScan - zkEVM Opcode Compatibility Scanner
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Opcode byte handling and upgrade rule sets.
//!
//! Persisted artifacts key histograms by the raw instruction byte rendered
//! as exactly two lowercase hex characters (`"5c"`), while execution traces
//! report instructions by mnemonic (`"TLOAD"`). [`OpcodeByte`] is the typed
//! bridge for the first form; [`UpgradeSpec`] pairs bytes with the mnemonics
//! the node reports so the two can be reconciled.

use revm::bytecode::opcode::{self, OpCode};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::{fmt, str::FromStr};

/// A single EVM instruction byte.
///
/// Serializes as two lowercase hex characters without a `0x` prefix, the key
/// format used by the persisted opcode index and conflict maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OpcodeByte(pub u8);

impl OpcodeByte {
    /// Wrap a raw instruction byte.
    pub const fn new(byte: u8) -> Self {
        Self(byte)
    }

    /// The canonical mnemonic for this byte, if it is a defined instruction.
    pub fn mnemonic(self) -> Option<&'static str> {
        OpCode::new(self.0).map(|op| op.as_str())
    }

    /// Whether this byte is in the PUSH1..=PUSH32 family.
    pub fn is_push(self) -> bool {
        (opcode::PUSH1..=opcode::PUSH32).contains(&self.0)
    }

    /// Immediate length in bytes declared by a PUSH instruction (0 otherwise).
    pub fn push_immediate_len(self) -> usize {
        if self.is_push() {
            (self.0 - opcode::PUSH1 + 1) as usize
        } else {
            0
        }
    }
}

impl fmt::Display for OpcodeByte {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02x}", self.0)
    }
}

impl From<u8> for OpcodeByte {
    fn from(byte: u8) -> Self {
        Self(byte)
    }
}

impl FromStr for OpcodeByte {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 2 {
            return Err(format!("opcode key must be two hex characters, got {s:?}"));
        }
        u8::from_str_radix(s, 16)
            .map(Self)
            .map_err(|e| format!("invalid opcode key {s:?}: {e}"))
    }
}

impl Serialize for OpcodeByte {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for OpcodeByte {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct OpcodeByteVisitor;

        impl de::Visitor<'_> for OpcodeByteVisitor {
            type Value = OpcodeByte;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a two-character lowercase hex opcode key")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                v.parse().map_err(E::custom)
            }
        }

        deserializer.deserialize_str(OpcodeByteVisitor)
    }
}

/// One opcode affected by the upgrade, with the mnemonic the node's trace
/// output uses for it.
///
/// The mnemonic is carried explicitly rather than derived from the opcode
/// table: trace endpoints of older forks may still report legacy names
/// (e.g. `DIFFICULTY` for `0x44`), and confirmation matches against what the
/// node actually returns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpcodeRule {
    /// The instruction byte as it appears in runtime bytecode.
    pub opcode: OpcodeByte,
    /// The mnemonic as it appears in `structLogs` step entries.
    pub mnemonic: String,
}

impl OpcodeRule {
    /// New rule from a raw byte and the node-reported mnemonic.
    pub fn new(byte: u8, mnemonic: impl Into<String>) -> Self {
        Self { opcode: OpcodeByte(byte), mnemonic: mnemonic.into() }
    }
}

/// The two opcode sets describing a protocol upgrade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeSpec {
    /// Instructions removed by the upgrade; executing one reverts post-upgrade.
    pub unsupported: Vec<OpcodeRule>,
    /// Instructions kept but with altered semantics; prior successful
    /// executions using one need behavioral re-validation.
    pub changed: Vec<OpcodeRule>,
}

impl Default for UpgradeSpec {
    fn default() -> Self {
        Self {
            unsupported: vec![
                OpcodeRule::new(0x49, "BLOBHASH"),
                OpcodeRule::new(0x4a, "BLOBBASEFEE"),
                OpcodeRule::new(0x5c, "TLOAD"),
                OpcodeRule::new(0x5d, "TSTORE"),
                OpcodeRule::new(0x5e, "MCOPY"),
            ],
            changed: vec![
                OpcodeRule::new(0xff, "SELFDESTRUCT"),
                OpcodeRule::new(0x3f, "EXTCODEHASH"),
                OpcodeRule::new(0x40, "BLOCKHASH"),
                OpcodeRule::new(0x44, "DIFFICULTY"),
            ],
        }
    }
}

impl UpgradeSpec {
    /// Mnemonics of every rule in `rules`, in rule order.
    pub fn mnemonics(rules: &[OpcodeRule]) -> Vec<&str> {
        rules.iter().map(|r| r.mnemonic.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_opcode_byte_display_and_parse() {
        let op = OpcodeByte(0x5c);
        assert_eq!(op.to_string(), "5c");
        assert_eq!("5c".parse::<OpcodeByte>().unwrap(), op);
        assert_eq!("ff".parse::<OpcodeByte>().unwrap(), OpcodeByte(0xff));
        assert!("5".parse::<OpcodeByte>().is_err());
        assert!("0x5c".parse::<OpcodeByte>().is_err());
        assert!("zz".parse::<OpcodeByte>().is_err());
    }

    #[test]
    fn test_opcode_byte_as_map_key() {
        let mut map = BTreeMap::new();
        map.insert(OpcodeByte(0x60), 3u64);
        map.insert(OpcodeByte(0x00), 1u64);

        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(json, r#"{"00":1,"60":3}"#);

        let back: BTreeMap<OpcodeByte, u64> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, map);
    }

    #[test]
    fn test_mnemonic_lookup() {
        assert_eq!(OpcodeByte(0x5c).mnemonic(), Some("TLOAD"));
        assert_eq!(OpcodeByte(0x60).mnemonic(), Some("PUSH1"));
        // 0x4b is undefined
        assert_eq!(OpcodeByte(0x4b).mnemonic(), None);
    }

    #[test]
    fn test_push_family() {
        assert!(!OpcodeByte(0x5f).is_push()); // PUSH0 carries no immediate
        assert!(OpcodeByte(0x60).is_push());
        assert!(OpcodeByte(0x7f).is_push());
        assert!(!OpcodeByte(0x80).is_push());

        assert_eq!(OpcodeByte(0x60).push_immediate_len(), 1);
        assert_eq!(OpcodeByte(0x7f).push_immediate_len(), 32);
        assert_eq!(OpcodeByte(0x01).push_immediate_len(), 0);
    }

    #[test]
    fn test_default_upgrade_spec() {
        let spec = UpgradeSpec::default();
        assert_eq!(spec.unsupported.len(), 5);
        assert_eq!(spec.changed.len(), 4);
        assert!(spec.unsupported.iter().any(|r| r.opcode == OpcodeByte(0x5c)));
        assert_eq!(
            UpgradeSpec::mnemonics(&spec.changed),
            vec!["SELFDESTRUCT", "EXTCODEHASH", "BLOCKHASH", "DIFFICULTY"]
        );
    }
}

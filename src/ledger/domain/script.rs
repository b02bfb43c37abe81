use serde::{Deserialize, Serialize};

pub const SECP256K1_BLAKE160_CODE_HASH: &str =
    "0x9bd7e06f3ecf4be0f2fcd2188b23f1b9fcc88e5d4b65a8637b17723bbda3cce8";

pub const SECP256K1_MULTISIG_CODE_HASH: &str =
    "0x5c5069eb0857efc65e1bca0c07df34c31663b3622fd3876c876320fc9634e2a8";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptHashType {
    Data,
    Type,
    Data1,
    Data2,
}

impl ScriptHashType {
    /// Byte used in full-format addresses.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x00 => Some(Self::Data),
            0x01 => Some(Self::Type),
            0x02 => Some(Self::Data1),
            0x04 => Some(Self::Data2),
            _ => None,
        }
    }

    pub fn to_byte(self) -> u8 {
        match self {
            Self::Data => 0x00,
            Self::Type => 0x01,
            Self::Data1 => 0x02,
            Self::Data2 => 0x04,
        }
    }
}

/// Lock or type script. Hex fields are kept as `0x`-prefixed strings and
/// compared case-insensitively.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Script {
    pub code_hash: String,
    pub hash_type: ScriptHashType,
    pub args: String,
}

impl Script {
    pub fn new(code_hash: impl AsRef<str>, hash_type: ScriptHashType, args: impl AsRef<str>) -> Self {
        Self {
            code_hash: code_hash.as_ref().to_ascii_lowercase(),
            hash_type,
            args: args.as_ref().to_ascii_lowercase(),
        }
    }

    /// secp256k1-blake160 lock for a 20-byte pubkey hash.
    pub fn secp256k1_blake160(args: impl AsRef<str>) -> Self {
        Self::new(SECP256K1_BLAKE160_CODE_HASH, ScriptHashType::Type, args)
    }

    pub fn normalized(&self) -> Self {
        Self::new(&self.code_hash, self.hash_type, &self.args)
    }

    pub fn is_secp256k1_blake160(&self) -> bool {
        self.hash_type == ScriptHashType::Type
            && self.code_hash.eq_ignore_ascii_case(SECP256K1_BLAKE160_CODE_HASH)
    }
}

impl PartialEq for Script {
    fn eq(&self, other: &Self) -> bool {
        self.hash_type == other.hash_type
            && self.code_hash.eq_ignore_ascii_case(&other.code_hash)
            && self.args.eq_ignore_ascii_case(&other.args)
    }
}

impl Eq for Script {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comparison_ignores_hex_case() {
        let a = Script {
            code_hash: SECP256K1_BLAKE160_CODE_HASH.to_uppercase().replace("0X", "0x"),
            hash_type: ScriptHashType::Type,
            args: "0xABCDEF".to_string(),
        };
        let b = Script::secp256k1_blake160("0xabcdef");
        assert_eq!(a, b);
        assert!(a.is_secp256k1_blake160());
    }

    #[test]
    fn hash_type_bytes() {
        for t in [
            ScriptHashType::Data,
            ScriptHashType::Type,
            ScriptHashType::Data1,
            ScriptHashType::Data2,
        ] {
            assert_eq!(ScriptHashType::from_byte(t.to_byte()), Some(t));
        }
        assert_eq!(ScriptHashType::from_byte(0x03), None);
    }
}

//! Hex-encoded quantities as used on the CKB JSON-RPC wire (`"0x1f"`).

use thiserror::Error;

/// 1 CKB = 10^8 shannons.
pub const SHANNONS_PER_CKB: u64 = 100_000_000;

/// Smallest capacity a secp256k1-locked cell can hold (61 CKB).
pub const MIN_CELL_CAPACITY: u64 = 61 * SHANNONS_PER_CKB;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct QuantityError(String);

pub fn parse_hex_u64(s: &str) -> Result<u64, QuantityError> {
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .ok_or_else(|| QuantityError(format!("missing 0x prefix in {:?}", s)))?;

    if digits.is_empty() {
        return Err(QuantityError(format!("empty hex quantity {:?}", s)));
    }

    u64::from_str_radix(digits, 16)
        .map_err(|e| QuantityError(format!("invalid hex quantity {:?}: {}", s, e)))
}

pub fn format_hex_u64(v: u64) -> String {
    format!("0x{:x}", v)
}

/// Human readable CKB amount, 8 decimals.
pub fn format_ckb(shannons: u64) -> String {
    format!(
        "{}.{:08}",
        shannons / SHANNONS_PER_CKB,
        shannons % SHANNONS_PER_CKB
    )
}

pub mod hex_u64 {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(v: &u64, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::format_hex_u64(*v))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
        let s = String::deserialize(d)?;
        super::parse_hex_u64(&s).map_err(D::Error::custom)
    }
}

pub mod hex_u32 {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(v: &u32, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::format_hex_u64(u64::from(*v)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<u32, D::Error> {
        let s = String::deserialize(d)?;
        let v = super::parse_hex_u64(&s).map_err(D::Error::custom)?;
        u32::try_from(v).map_err(D::Error::custom)
    }
}

pub mod option_hex_u64 {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(v: &Option<u64>, s: S) -> Result<S::Ok, S::Error> {
        match v {
            Some(v) => s.serialize_some(&super::format_hex_u64(*v)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u64>, D::Error> {
        Option::<String>::deserialize(d)?
            .map(|s| super::parse_hex_u64(&s).map_err(D::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_prefixed_hex() {
        assert_eq!(parse_hex_u64("0x0").unwrap(), 0);
        assert_eq!(parse_hex_u64("0x11a8a9e0").unwrap(), 296_266_208);
        assert!(parse_hex_u64("1234").is_err());
        assert!(parse_hex_u64("0x").is_err());
        assert!(parse_hex_u64("0xzz").is_err());
    }

    #[test]
    fn quantity_error_names_the_input() {
        let err = parse_hex_u64("1234").unwrap_err();
        assert_eq!(err.to_string(), "missing 0x prefix in \"1234\"");
        let boxed: Box<dyn std::error::Error> = Box::new(err);
        assert!(boxed.source().is_none());
    }

    #[test]
    fn formats_ckb_amounts() {
        assert_eq!(format_ckb(MIN_CELL_CAPACITY), "61.00000000");
        assert_eq!(format_ckb(12_345), "0.00012345");
    }
}

//! CKB address codec.
//!
//! Decodes the CKB2021 full format as well as the deprecated short and full
//! formats. Encoding always produces the CKB2021 full format (bech32m).

use std::str::FromStr;

use bech32::{Bech32m, Hrp};

use crate::error::ValidationError;
use crate::ledger::domain::script::{SECP256K1_BLAKE160_CODE_HASH, SECP256K1_MULTISIG_CODE_HASH};
use crate::ledger::domain::{Network, Script, ScriptHashType};

const FORMAT_FULL: u8 = 0x00;
const FORMAT_SHORT: u8 = 0x01;
const FORMAT_FULL_DATA: u8 = 0x02;
const FORMAT_FULL_TYPE: u8 = 0x04;

const SHORT_ARGS_LEN: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    network: Network,
    script: Script,
}

impl Address {
    pub fn new(network: Network, script: Script) -> Self {
        Self {
            network,
            script: script.normalized(),
        }
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn script(&self) -> &Script {
        &self.script
    }

    pub fn into_script(self) -> Script {
        self.script
    }

    pub fn parse(address: &str) -> Result<Self, ValidationError> {
        let (hrp, data) = bech32::decode(address)
            .map_err(|e| invalid(format!("bech32 decode failed: {}", e)))?;

        let network = Network::from_hrp(hrp.as_str())
            .ok_or_else(|| invalid(format!("unknown address prefix {}", hrp)))?;

        let script = decode_payload(&data)?;
        Ok(Self { network, script })
    }

    /// Parses and checks that the address belongs to `network`.
    pub fn parse_for(address: &str, network: Network) -> Result<Self, ValidationError> {
        let parsed = Self::parse(address)?;
        if parsed.network != network {
            return Err(ValidationError::NetworkMismatch {
                expected: network,
                found: parsed.network,
            });
        }
        Ok(parsed)
    }

    pub fn encode(&self) -> Result<String, ValidationError> {
        let hrp = Hrp::parse(self.network.hrp()).map_err(|e| invalid(e.to_string()))?;

        let code_hash = decode_hex(&self.script.code_hash)?;
        let args = decode_hex(&self.script.args)?;
        if code_hash.len() != 32 {
            return Err(invalid(format!("code hash must be 32 bytes, got {}", code_hash.len())));
        }

        let mut payload = Vec::with_capacity(34 + args.len());
        payload.push(FORMAT_FULL);
        payload.extend_from_slice(&code_hash);
        payload.push(self.script.hash_type.to_byte());
        payload.extend_from_slice(&args);

        bech32::encode::<Bech32m>(hrp, &payload)
            .map_err(|e| invalid(format!("bech32m encode failed: {}", e)))
    }
}

impl FromStr for Address {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn decode_payload(data: &[u8]) -> Result<Script, ValidationError> {
    let (&format, rest) = data
        .split_first()
        .ok_or_else(|| invalid("empty payload".to_string()))?;

    match format {
        FORMAT_FULL => {
            if rest.len() < 33 {
                return Err(invalid(format!("full payload too short: {} bytes", data.len())));
            }
            let hash_type = ScriptHashType::from_byte(rest[32])
                .ok_or_else(|| invalid(format!("invalid hash type byte {:#04x}", rest[32])))?;
            Ok(Script::new(hex_of(&rest[..32]), hash_type, hex_of(&rest[33..])))
        }
        FORMAT_SHORT => {
            let (&index, args) = rest
                .split_first()
                .ok_or_else(|| invalid("short payload too short".to_string()))?;
            let code_hash = match index {
                0x00 => SECP256K1_BLAKE160_CODE_HASH,
                0x01 => SECP256K1_MULTISIG_CODE_HASH,
                other => return Err(invalid(format!("unknown code hash index {}", other))),
            };
            if args.len() != SHORT_ARGS_LEN {
                return Err(invalid(format!(
                    "short format args must be {} bytes, got {}",
                    SHORT_ARGS_LEN,
                    args.len()
                )));
            }
            Ok(Script::new(code_hash, ScriptHashType::Type, hex_of(args)))
        }
        FORMAT_FULL_DATA | FORMAT_FULL_TYPE => {
            if rest.len() < 32 {
                return Err(invalid(format!("full payload too short: {} bytes", data.len())));
            }
            let hash_type = if format == FORMAT_FULL_DATA {
                ScriptHashType::Data
            } else {
                ScriptHashType::Type
            };
            Ok(Script::new(hex_of(&rest[..32]), hash_type, hex_of(&rest[32..])))
        }
        other => Err(invalid(format!("unsupported address format {:#04x}", other))),
    }
}

fn hex_of(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

fn decode_hex(s: &str) -> Result<Vec<u8>, ValidationError> {
    let digits = s.strip_prefix("0x").unwrap_or(s);
    hex::decode(digits).map_err(|e| invalid(format!("invalid hex {:?}: {}", s, e)))
}

fn invalid(msg: String) -> ValidationError {
    ValidationError::InvalidAddress(msg)
}

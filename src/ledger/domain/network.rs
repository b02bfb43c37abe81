use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::cell::OutPoint;
use super::transaction::{CellDep, DepType};

const MAINNET_SECP256K1_DEP_GROUP: &str =
    "0x71a7ba8fc96349fea0ed3a5c47992e3b4084b031a42264a018e0072e8172e46c";
const TESTNET_SECP256K1_DEP_GROUP: &str =
    "0xf8de3bb47d055cdf460d93a2a6e1b05f7432f9777c8c474abf4eec1d4aee5d37";

/// Known-good mainnet block used when the tip is not yet known.
pub const MAINNET_CHECKPOINT: u64 = 12_000_000;
/// Testnet carries no checkpoint.
pub const TESTNET_CHECKPOINT: u64 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    Testnet,
}

impl Network {
    pub fn name(self) -> &'static str {
        match self {
            Network::Mainnet => "mainnet",
            Network::Testnet => "testnet",
        }
    }

    /// Bech32 human readable part of addresses on this network.
    pub fn hrp(self) -> &'static str {
        match self {
            Network::Mainnet => "ckb",
            Network::Testnet => "ckt",
        }
    }

    pub fn from_hrp(hrp: &str) -> Option<Self> {
        if hrp.eq_ignore_ascii_case("ckb") {
            Some(Network::Mainnet)
        } else if hrp.eq_ignore_ascii_case("ckt") {
            Some(Network::Testnet)
        } else {
            None
        }
    }

    pub fn checkpoint(self) -> u64 {
        match self {
            Network::Mainnet => MAINNET_CHECKPOINT,
            Network::Testnet => TESTNET_CHECKPOINT,
        }
    }

    /// Dep group carrying the secp256k1-blake160 lock and its dependencies.
    pub fn secp256k1_dep(self) -> CellDep {
        let tx_hash = match self {
            Network::Mainnet => MAINNET_SECP256K1_DEP_GROUP,
            Network::Testnet => TESTNET_SECP256K1_DEP_GROUP,
        };
        CellDep {
            out_point: OutPoint::new(tx_hash, 0),
            dep_type: DepType::DepGroup,
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Network {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mainnet" | "main" | "mirana" => Ok(Network::Mainnet),
            "testnet" | "test" | "pudge" => Ok(Network::Testnet),
            other => Err(format!("unknown network: {}", other)),
        }
    }
}

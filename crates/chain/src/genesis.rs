//! Genesis configuration for the devnet runtime.
//!
//! Describes the network key seed, the token and NFT contracts with their
//! initial holdings, gateway settings and auction limits. Addresses are
//! hex-encoded 32-byte strings.

use serde::{Deserialize, Serialize};

use sealed_auction::AuctionParams;
use sealed_types::{address_from_label, Address};

use crate::error::ChainError;

/// Genesis configuration for the runtime.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenesisConfig {
    /// Hex-encoded 32-byte seed the network key is derived from
    pub network_seed: String,

    /// Chain clock at height zero (unix seconds)
    pub genesis_time: u64,

    pub token: TokenGenesis,

    pub nft: NftGenesis,

    pub gateway: GatewayGenesis,

    #[serde(default)]
    pub auction: AuctionParams,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TokenGenesis {
    pub name: String,
    pub symbol: String,
    /// Account allowed to mint
    pub owner: String,
    #[serde(default)]
    pub initial_mints: Vec<MintConfig>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MintConfig {
    pub to: String,
    pub amount: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NftGenesis {
    /// Account allowed to mint
    pub owner: String,
    /// One token is minted per entry, to that holder, with ids from 1
    #[serde(default)]
    pub initial_holders: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GatewayGenesis {
    /// Seconds before an unfulfilled decryption request expires
    pub request_ttl_secs: u64,
}

impl Default for GatewayGenesis {
    fn default() -> Self {
        Self {
            request_ttl_secs: 300, // 5 minutes
        }
    }
}

impl Default for GenesisConfig {
    fn default() -> Self {
        let account = |label: &str| hex::encode(address_from_label(label));
        Self {
            network_seed: hex::encode([0x42u8; 32]),
            genesis_time: 1_700_000_000,
            token: TokenGenesis {
                name: "Sealed Dollar".into(),
                symbol: "SUSD".into(),
                owner: account("treasury"),
                initial_mints: ["alice", "bob", "carol"]
                    .iter()
                    .map(|name| MintConfig {
                        to: account(name),
                        amount: 1_000_000_000,
                    })
                    .collect(),
            },
            nft: NftGenesis {
                owner: account("treasury"),
                initial_holders: vec![account("seller")],
            },
            gateway: GatewayGenesis::default(),
            auction: AuctionParams::default(),
        }
    }
}

impl GenesisConfig {
    /// Validate the genesis configuration.
    pub fn validate(&self) -> Result<(), ChainError> {
        self.seed()?;

        if self.token.name.is_empty() || self.token.symbol.is_empty() {
            return Err(invalid("token name and symbol cannot be empty"));
        }
        parse_address(&self.token.owner)?;
        let mut supply = 0u64;
        for mint in &self.token.initial_mints {
            parse_address(&mint.to)?;
            supply = supply
                .checked_add(mint.amount)
                .ok_or_else(|| invalid("initial mints overflow the total supply"))?;
        }

        parse_address(&self.nft.owner)?;
        for holder in &self.nft.initial_holders {
            parse_address(holder)?;
        }

        if self.gateway.request_ttl_secs == 0 {
            return Err(invalid("request TTL cannot be zero"));
        }
        if self.auction.max_bidders == 0 {
            return Err(invalid("max bidders cannot be zero"));
        }
        if self.auction.min_duration == 0 {
            return Err(invalid("minimum duration cannot be zero"));
        }

        Ok(())
    }

    /// Decoded network seed.
    pub fn seed(&self) -> Result<[u8; 32], ChainError> {
        let bytes = hex::decode(&self.network_seed)
            .map_err(|e| invalid(format!("network seed: {e}")))?;
        bytes
            .try_into()
            .map_err(|_| invalid("network seed must be 32 bytes"))
    }
}

/// Parse a hex-encoded 32-byte address.
pub fn parse_address(s: &str) -> Result<Address, ChainError> {
    let bytes = hex::decode(s.trim_start_matches("0x"))
        .map_err(|e| invalid(format!("address {s}: {e}")))?;
    bytes
        .try_into()
        .map_err(|_| invalid(format!("address {s} must be 32 bytes")))
}

fn invalid(msg: impl Into<String>) -> ChainError {
    ChainError::InvalidGenesis(msg.into())
}

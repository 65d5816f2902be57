//! End-to-end tests for the confidential token and the sealed-bid auction.
//!
//! Every test drives the [`Chain`] runtime with real encrypted inputs, the
//! same way a wallet would:
//! 1. Genesis mints balances and the auctioned NFT
//! 2. Transfers and allowances move encrypted amounts
//! 3. Auctions escrow the NFT and collect sealed bids
//! 4. Settlement requests the winner, the relayer delivers it

use rand::rngs::OsRng;

use sealed_auction::AuctionCall;
use sealed_chain::{
    auction_address, token_address, CallOutput, Chain, GenesisConfig, MintConfig, Receipt,
    RuntimeCall,
};
use sealed_client::encrypt_input;
use sealed_nft::NftCall;
use sealed_token::TokenCall;
use sealed_types::{address_from_label, Address, ExternalInput, FheType};

#[cfg(test)]
mod auction_flow;
#[cfg(test)]
mod ledger;

/// Bidding window used by [`Devnet::open_auction`].
pub const BIDDING_SECS: u64 = 600;
/// Seller-only settlement window after bidding closes.
pub const SETTLE_GRACE_SECS: u64 = 600;

/// A chain started from the default genesis plus test helpers.
pub struct Devnet {
    pub chain: Chain,
}

impl Devnet {
    pub fn new() -> Self {
        Self::with_genesis(GenesisConfig::default())
    }

    /// Default genesis with `dave` funded as well, for four-bidder auctions.
    pub fn with_four_bidders() -> Self {
        let mut genesis = GenesisConfig::default();
        genesis.token.initial_mints.push(MintConfig {
            to: hex_address("dave"),
            amount: 1_000_000_000,
        });
        Self::with_genesis(genesis)
    }

    pub fn with_genesis(genesis: GenesisConfig) -> Self {
        let chain = Chain::from_genesis(&genesis).expect("genesis");
        Self { chain }
    }

    pub fn account(name: &str) -> Address {
        address_from_label(name)
    }

    /// Encrypt `value` for `sender` calling the contract at `domain`.
    pub fn input(&self, domain: Address, sender: &str, value: u64) -> ExternalInput {
        encrypt_input(
            &self.chain.network_key(),
            &domain,
            &Self::account(sender),
            value,
            FheType::U64,
            &mut OsRng,
        )
        .expect("encrypt input")
        .input
    }

    pub fn submit(&mut self, sender: &str, call: RuntimeCall) -> Result<Receipt, sealed_chain::ChainError> {
        self.chain.submit(Self::account(sender), call)
    }

    /// Plaintext balance as read by its owner; zero when never credited.
    pub fn balance(&self, name: &str) -> u64 {
        let who = Self::account(name);
        match self.chain.state().token.balance(&who) {
            Some(value) => self.chain.view(&value, &who).expect("owner can view balance"),
            None => 0,
        }
    }

    pub fn allowance(&self, owner: &str, spender: Address) -> Option<u64> {
        let owner = Self::account(owner);
        let value = self.chain.state().token.allowance(&owner, &spender)?;
        Some(self.chain.view(&value, &owner).expect("owner can view allowance"))
    }

    /// Transfer and return the decrypted success flag.
    pub fn transfer(&mut self, from: &str, to: &str, amount: u64) -> bool {
        let input = self.input(token_address(), from, amount);
        let receipt = self
            .submit(
                from,
                RuntimeCall::Token(TokenCall::Transfer {
                    to: Self::account(to),
                    amount: input,
                }),
            )
            .expect("transfer never reverts on amount");
        self.flag(from, &receipt)
    }

    pub fn approve(&mut self, owner: &str, spender: Address, amount: u64) {
        let input = self.input(token_address(), owner, amount);
        self.submit(owner, RuntimeCall::Token(TokenCall::Approve { spender, amount: input }))
            .expect("approve");
    }

    /// `spender` moves `amount` from `from` to `to`; returns the flag as
    /// seen by the spender.
    pub fn transfer_from(&mut self, spender: &str, from: &str, to: &str, amount: u64) -> bool {
        let input = self.input(token_address(), spender, amount);
        let receipt = self
            .submit(
                spender,
                RuntimeCall::Token(TokenCall::TransferFrom {
                    from: Self::account(from),
                    to: Self::account(to),
                    amount: input,
                }),
            )
            .expect("transfer_from never reverts on amount");
        self.flag(spender, &receipt)
    }

    fn flag(&self, reader: &str, receipt: &Receipt) -> bool {
        match receipt.output {
            CallOutput::Encrypted(flag) => {
                self.chain.view(&flag, &Self::account(reader)).expect("caller can view flag") == 1
            }
            ref other => panic!("expected an encrypted flag, got {other:?}"),
        }
    }

    /// Escrow `token_id` from `seller` and open an auction starting now.
    pub fn open_auction(&mut self, seller: &str, token_id: u64, reserve_price: Option<u64>) -> u64 {
        let now = self.chain.timestamp();
        self.submit(
            seller,
            RuntimeCall::Nft(NftCall::Approve {
                spender: auction_address(),
                token_id,
            }),
        )
        .expect("approve nft");
        let receipt = self
            .submit(
                seller,
                RuntimeCall::Auction(AuctionCall::CreateAuction {
                    token_id,
                    start_time: now,
                    end_time: now + BIDDING_SECS,
                    settlement_deadline: now + BIDDING_SECS + SETTLE_GRACE_SECS,
                    reserve_price,
                }),
            )
            .expect("create auction");
        match receipt.output {
            CallOutput::AuctionId(id) => id,
            other => panic!("expected an auction id, got {other:?}"),
        }
    }

    /// Allow the auction to pull `amount` and place a bid of `amount`.
    pub fn bid(&mut self, auction_id: u64, bidder: &str, amount: u64) -> Receipt {
        self.approve(bidder, auction_address(), amount);
        let input = self.input(auction_address(), bidder, amount);
        self.submit(bidder, RuntimeCall::Auction(AuctionCall::Bid { auction_id, amount: input }))
            .expect("bid")
    }

    pub fn close_bidding(&mut self) {
        self.chain.advance_time(BIDDING_SECS + 1);
    }

    pub fn settle(&mut self, caller: &str, auction_id: u64) -> Result<Receipt, sealed_chain::ChainError> {
        self.submit(caller, RuntimeCall::Auction(AuctionCall::Settle { auction_id }))
    }
}

impl Default for Devnet {
    fn default() -> Self {
        Self::new()
    }
}

fn hex_address(name: &str) -> String {
    hex::encode(address_from_label(name))
}

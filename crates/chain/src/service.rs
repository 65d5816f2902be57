//! Async front end to the runtime.
//!
//! One task owns the [`Chain`]; callers talk to it over a command channel
//! and wait on a oneshot reply. The same task runs the relayer on a timer,
//! fulfilling pending decryption requests between calls.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use sealed_auction::{AuctionQuery, AuctionQueryResponse};
use sealed_fhe::DecryptionResult;
use sealed_nft::{NftQuery, NftQueryResponse};
use sealed_token::{TokenQuery, TokenQueryResponse};
use sealed_types::{Address, EncryptedValue, NetworkPublicKey};

use crate::runtime::{Chain, Receipt, RuntimeCall};

/// Service configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Run the relayer on a timer
    pub relayer_enabled: bool,
    /// Relayer poll interval in milliseconds
    pub relay_interval_ms: u64,
    /// Command channel capacity
    pub channel_capacity: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            relayer_enabled: true,
            relay_interval_ms: 500,
            channel_capacity: 1000,
        }
    }
}

/// Read-only requests.
#[derive(Clone, Debug)]
pub enum ChainQuery {
    Token(TokenQuery),
    Nft(NftQuery),
    Auction(AuctionQuery),
    NetworkKey,
}

#[derive(Clone, Debug)]
pub enum ChainQueryResponse {
    Token(TokenQueryResponse),
    Nft(NftQueryResponse),
    Auction(AuctionQueryResponse),
    NetworkKey(NetworkPublicKey),
}

/// Runtime statistics.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ServiceStats {
    pub block_height: u64,
    pub timestamp: u64,
    pub pending_decryptions: usize,
    /// Requests fulfilled by the relayer
    pub relayed: u64,
    /// Relayer fulfilments that were rejected
    pub relay_failures: u64,
}

/// Commands for the chain service
pub enum ChainCommand {
    /// Apply a call
    Submit(Address, RuntimeCall, oneshot::Sender<Result<Receipt>>),
    Query(ChainQuery, oneshot::Sender<ChainQueryResponse>),
    /// Off-chain viewer read
    View(EncryptedValue, Address, oneshot::Sender<Result<u64>>),
    /// Collect delivered decryption results
    TakeDecrypted(Address, oneshot::Sender<Vec<DecryptionResult>>),
    /// Move the clock forward; replies with the new timestamp
    AdvanceTime(u64, oneshot::Sender<u64>),
    /// Run the relayer now; replies with the number of fulfilled requests
    Relay(oneshot::Sender<usize>),
    Stats(oneshot::Sender<ServiceStats>),
    Shutdown,
}

/// Owns the runtime and the relayer loop.
struct ChainWorker {
    chain: Chain,
    relayed: u64,
    relay_failures: u64,
}

impl ChainWorker {
    fn handle(&mut self, cmd: ChainCommand) {
        match cmd {
            ChainCommand::Submit(sender, call, reply) => {
                let result = self.chain.submit(sender, call).map_err(anyhow::Error::from);
                let _ = reply.send(result);
            }
            ChainCommand::Query(query, reply) => {
                let _ = reply.send(self.query(query));
            }
            ChainCommand::View(value, principal, reply) => {
                let result = self.chain.view(&value, &principal).map_err(anyhow::Error::from);
                let _ = reply.send(result);
            }
            ChainCommand::TakeDecrypted(principal, reply) => {
                let _ = reply.send(self.chain.take_decrypted(&principal));
            }
            ChainCommand::AdvanceTime(secs, reply) => {
                self.chain.advance_time(secs);
                let _ = reply.send(self.chain.timestamp());
            }
            ChainCommand::Relay(reply) => {
                let _ = reply.send(self.relay());
            }
            ChainCommand::Stats(reply) => {
                let _ = reply.send(self.stats());
            }
            // Handled by the loop
            ChainCommand::Shutdown => {}
        }
    }

    fn query(&self, query: ChainQuery) -> ChainQueryResponse {
        let state = self.chain.state();
        match query {
            ChainQuery::Token(q) => {
                ChainQueryResponse::Token(sealed_token::queries::handle_query(&state.token, q))
            }
            ChainQuery::Nft(q) => ChainQueryResponse::Nft(sealed_nft::handle_query(&state.nft, q)),
            ChainQuery::Auction(q) => {
                ChainQueryResponse::Auction(sealed_auction::handle_query(&state.auction, q))
            }
            ChainQuery::NetworkKey => ChainQueryResponse::NetworkKey(self.chain.network_key()),
        }
    }

    fn relay(&mut self) -> usize {
        let mut fulfilled = 0;
        for result in self.chain.relay_pending() {
            match result {
                Ok(_) => {
                    fulfilled += 1;
                    self.relayed += 1;
                }
                Err(e) => {
                    self.relay_failures += 1;
                    warn!(error = %e, "relayer fulfilment rejected");
                }
            }
        }
        if fulfilled > 0 {
            debug!(fulfilled, "relayer pass complete");
        }
        fulfilled
    }

    fn stats(&self) -> ServiceStats {
        ServiceStats {
            block_height: self.chain.block_height(),
            timestamp: self.chain.timestamp(),
            pending_decryptions: self.chain.state().gateway.pending_requests().len(),
            relayed: self.relayed,
            relay_failures: self.relay_failures,
        }
    }
}

/// Handle to the running chain service.
#[derive(Clone)]
pub struct ChainService {
    command_tx: mpsc::Sender<ChainCommand>,
}

impl ChainService {
    /// Start the chain service
    pub fn start(chain: Chain, config: ServiceConfig) -> Self {
        let (command_tx, mut command_rx) = mpsc::channel::<ChainCommand>(config.channel_capacity);

        let mut worker = ChainWorker {
            chain,
            relayed: 0,
            relay_failures: 0,
        };

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(config.relay_interval_ms.max(1)));

            loop {
                tokio::select! {
                    cmd = command_rx.recv() => {
                        match cmd {
                            Some(ChainCommand::Shutdown) | None => {
                                info!("Chain service shutting down");
                                break;
                            }
                            Some(cmd) => worker.handle(cmd),
                        }
                    }
                    _ = ticker.tick(), if config.relayer_enabled => {
                        worker.relay();
                    }
                }
            }
        });

        Self { command_tx }
    }

    async fn request<T>(&self, cmd: impl FnOnce(oneshot::Sender<T>) -> ChainCommand) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command_tx
            .send(cmd(reply_tx))
            .await
            .context("chain service unavailable")?;
        reply_rx.await.context("chain service crashed")
    }

    /// Submit a call and wait for its receipt
    pub async fn submit(&self, sender: Address, call: RuntimeCall) -> Result<Receipt> {
        self.request(|reply| ChainCommand::Submit(sender, call, reply)).await?
    }

    pub async fn query(&self, query: ChainQuery) -> Result<ChainQueryResponse> {
        self.request(|reply| ChainCommand::Query(query, reply)).await
    }

    pub async fn network_key(&self) -> Result<NetworkPublicKey> {
        match self.query(ChainQuery::NetworkKey).await? {
            ChainQueryResponse::NetworkKey(key) => Ok(key),
            other => anyhow::bail!("unexpected response: {other:?}"),
        }
    }

    /// Read a ciphertext as one of its viewers
    pub async fn view(&self, value: EncryptedValue, principal: Address) -> Result<u64> {
        self.request(|reply| ChainCommand::View(value, principal, reply)).await?
    }

    pub async fn take_decrypted(&self, principal: Address) -> Result<Vec<DecryptionResult>> {
        self.request(|reply| ChainCommand::TakeDecrypted(principal, reply)).await
    }

    /// Advance the simulated clock
    pub async fn advance_time(&self, secs: u64) -> Result<u64> {
        self.request(|reply| ChainCommand::AdvanceTime(secs, reply)).await
    }

    /// Run the relayer immediately
    pub async fn relay(&self) -> Result<usize> {
        self.request(ChainCommand::Relay).await
    }

    pub async fn stats(&self) -> Result<ServiceStats> {
        self.request(ChainCommand::Stats).await
    }

    /// Shutdown the service
    pub async fn shutdown(&self) -> Result<()> {
        self.command_tx
            .send(ChainCommand::Shutdown)
            .await
            .context("chain service unavailable")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ChainError;
    use crate::genesis::GenesisConfig;
    use crate::runtime::{auction_address, token_address, CallOutput};
    use rand::rngs::OsRng;
    use sealed_auction::AuctionCall;
    use sealed_client::encrypt_input;
    use sealed_nft::NftCall;
    use sealed_token::TokenCall;
    use sealed_types::{address_from_label, AuctionOutcome, FheType};

    fn start(relayer_enabled: bool) -> ChainService {
        let chain = Chain::from_genesis(&GenesisConfig::default()).unwrap();
        ChainService::start(
            chain,
            ServiceConfig {
                relayer_enabled,
                relay_interval_ms: 10,
                ..ServiceConfig::default()
            },
        )
    }

    #[tokio::test]
    async fn test_submit_and_view() {
        let service = start(false);
        let alice = address_from_label("alice");
        let key = service.network_key().await.unwrap();

        let input = encrypt_input(&key, &token_address(), &alice, 10, FheType::U64, &mut OsRng).unwrap();
        let receipt = service
            .submit(
                alice,
                RuntimeCall::Token(TokenCall::Transfer {
                    to: address_from_label("bob"),
                    amount: input.input,
                }),
            )
            .await
            .unwrap();
        let CallOutput::Encrypted(flag) = receipt.output else {
            panic!("expected a flag");
        };
        assert_eq!(service.view(flag, alice).await.unwrap(), 1);

        let stats = service.stats().await.unwrap();
        assert_eq!(stats.block_height, 1);

        service.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_rejected_call_surfaces_chain_error() {
        let service = start(false);
        let err = service
            .submit(
                address_from_label("mallory"),
                RuntimeCall::Nft(NftCall::Mint {
                    to: address_from_label("mallory"),
                }),
            )
            .await
            .unwrap_err();
        assert!(matches!(err.downcast_ref::<ChainError>(), Some(ChainError::Nft(_))));

        service.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_relayer_settles_in_background() {
        let service = start(true);
        let seller = address_from_label("seller");
        let bidder = address_from_label("alice");
        let key = service.network_key().await.unwrap();
        let now = service.stats().await.unwrap().timestamp;

        service
            .submit(
                seller,
                RuntimeCall::Nft(NftCall::Approve {
                    spender: auction_address(),
                    token_id: 1,
                }),
            )
            .await
            .unwrap();
        service
            .submit(
                seller,
                RuntimeCall::Auction(AuctionCall::CreateAuction {
                    token_id: 1,
                    start_time: now,
                    end_time: now + 60,
                    settlement_deadline: now + 120,
                    reserve_price: None,
                }),
            )
            .await
            .unwrap();

        let allowance = encrypt_input(&key, &token_address(), &bidder, 90, FheType::U64, &mut OsRng).unwrap();
        service
            .submit(
                bidder,
                RuntimeCall::Token(TokenCall::Approve {
                    spender: auction_address(),
                    amount: allowance.input,
                }),
            )
            .await
            .unwrap();
        let bid = encrypt_input(&key, &auction_address(), &bidder, 90, FheType::U64, &mut OsRng).unwrap();
        service
            .submit(
                bidder,
                RuntimeCall::Auction(AuctionCall::Bid {
                    auction_id: 1,
                    amount: bid.input,
                }),
            )
            .await
            .unwrap();

        service.advance_time(61).await.unwrap();
        service
            .submit(seller, RuntimeCall::Auction(AuctionCall::Settle { auction_id: 1 }))
            .await
            .unwrap();

        let mut outcome: Option<AuctionOutcome> = None;
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            let response = service
                .query(ChainQuery::Auction(AuctionQuery::GetOutcome { auction_id: 1 }))
                .await
                .unwrap();
            if let ChainQueryResponse::Auction(AuctionQueryResponse::Outcome(Some(found))) = response {
                outcome = Some(found);
                break;
            }
        }

        let outcome = outcome.expect("relayer never delivered the winner");
        assert_eq!(outcome.winner, bidder);
        let stats = service.stats().await.unwrap();
        assert_eq!(stats.relayed, 1);
        assert_eq!(stats.pending_decryptions, 0);

        service.shutdown().await.unwrap();
    }
}

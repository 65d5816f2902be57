//! Devnet node for the confidential token and the sealed-bid auction.
//!
//! Starts the chain service from a genesis file (or the built-in default)
//! and can walk through a complete auction: escrow, encrypted bids,
//! settlement and the relayer's delivery of the winner.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use rand::rngs::OsRng;
use tracing::{info, warn};

use sealed_auction::{AuctionCall, AuctionQuery, AuctionQueryResponse};
use sealed_chain::{
    auction_address, parse_address, token_address, CallOutput, Chain, ChainQuery, ChainQueryResponse,
    ChainService, GenesisConfig, RuntimeCall, ServiceConfig,
};
use sealed_client::InputBuilder;
use sealed_nft::NftCall;
use sealed_token::{TokenCall, TokenQuery, TokenQueryResponse};
use sealed_types::{address_from_label, short_address, Address, AuctionOutcome};

#[derive(Parser)]
#[command(name = "sealed-node")]
#[command(about = "Confidential token and sealed-bid auction devnet")]
struct Cli {
    /// Genesis file (JSON); the built-in devnet genesis when omitted
    #[arg(long)]
    genesis: Option<PathBuf>,

    /// Relayer poll interval in milliseconds
    #[arg(long, default_value = "50")]
    relay_interval_ms: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the genesis config as JSON
    Genesis,

    /// Run one auction end to end
    Demo {
        /// Bids as label=amount, e.g. alice=120
        #[arg(long, value_delimiter = ',', default_value = "alice=120,bob=300,carol=250")]
        bids: Vec<String>,

        /// Reserve price
        #[arg(long)]
        reserve: Option<u64>,

        /// Seller account label
        #[arg(long, default_value = "seller")]
        seller: String,

        /// NFT to auction
        #[arg(long, default_value = "1")]
        token_id: u64,
    },
}

fn load_genesis(path: Option<&Path>) -> Result<GenesisConfig> {
    let config = match path {
        Some(path) => {
            let data = std::fs::read_to_string(path)
                .with_context(|| format!("reading genesis file {}", path.display()))?;
            serde_json::from_str(&data).context("parsing genesis file")?
        }
        None => GenesisConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

fn parse_bid(entry: &str) -> Result<(String, u64)> {
    let (label, amount) = entry
        .split_once('=')
        .ok_or_else(|| anyhow!("bid {entry:?} is not label=amount"))?;
    let amount = amount
        .parse()
        .with_context(|| format!("bid amount in {entry:?}"))?;
    Ok((label.to_string(), amount))
}

async fn balance_of(service: &ChainService, account: Address) -> Result<Option<u64>> {
    let response = service
        .query(ChainQuery::Token(TokenQuery::BalanceOf { account }))
        .await?;
    match response {
        ChainQueryResponse::Token(TokenQueryResponse::Balance(Some(value))) => {
            Ok(Some(service.view(value, account).await?))
        }
        ChainQueryResponse::Token(TokenQueryResponse::Balance(None)) => Ok(None),
        other => bail!("unexpected response: {other:?}"),
    }
}

async fn wait_for_outcome(service: &ChainService, auction_id: u64) -> Result<Option<AuctionOutcome>> {
    for _ in 0..100 {
        let response = service
            .query(ChainQuery::Auction(AuctionQuery::GetOutcome { auction_id }))
            .await?;
        if let ChainQueryResponse::Auction(AuctionQueryResponse::Outcome(Some(outcome))) = response {
            return Ok(Some(outcome));
        }

        let response = service
            .query(ChainQuery::Auction(AuctionQuery::GetAuction { auction_id }))
            .await?;
        if let ChainQueryResponse::Auction(AuctionQueryResponse::Auction(Some(auction))) = response {
            if auction.cancel_reason.is_some() {
                return Ok(None);
            }
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    bail!("relayer did not deliver the winner of auction {auction_id}")
}

async fn run_demo(
    service: &ChainService,
    seller_label: &str,
    token_id: u64,
    reserve_price: Option<u64>,
    bids: Vec<(String, u64)>,
) -> Result<()> {
    let seller = address_from_label(seller_label);
    let auction = auction_address();
    let key = service.network_key().await?;
    let start = service.stats().await?.timestamp;

    service
        .submit(
            seller,
            RuntimeCall::Nft(NftCall::Approve {
                spender: auction,
                token_id,
            }),
        )
        .await?;
    let receipt = service
        .submit(
            seller,
            RuntimeCall::Auction(AuctionCall::CreateAuction {
                token_id,
                start_time: start,
                end_time: start + 600,
                settlement_deadline: start + 1200,
                reserve_price,
            }),
        )
        .await?;
    let CallOutput::AuctionId(auction_id) = receipt.output else {
        bail!("create auction returned {:?}", receipt.output);
    };
    info!(auction_id, token_id, seller = %short_address(&seller), "auction open");

    for (label, amount) in &bids {
        let bidder = address_from_label(label);
        let allowance = InputBuilder::new(key.clone(), token_address(), bidder).encrypt(*amount, &mut OsRng)?;
        service
            .submit(
                bidder,
                RuntimeCall::Token(TokenCall::Approve {
                    spender: auction,
                    amount: allowance.input,
                }),
            )
            .await?;

        let bid = InputBuilder::new(key.clone(), auction, bidder).encrypt(*amount, &mut OsRng)?;
        service
            .submit(
                bidder,
                RuntimeCall::Auction(AuctionCall::Bid {
                    auction_id,
                    amount: bid.input,
                }),
            )
            .await?;
        info!(bidder = %label, "sealed bid placed");
    }

    service.advance_time(601).await?;
    let receipt = service
        .submit(seller, RuntimeCall::Auction(AuctionCall::Settle { auction_id }))
        .await?;
    match receipt.output {
        CallOutput::DecryptionRequested(request_id) => {
            info!(auction_id, request_id = %hex::encode(request_id), "settlement requested");
        }
        CallOutput::Cancelled(reason) => {
            warn!(auction_id, ?reason, "auction closed without bids");
            return Ok(());
        }
        other => bail!("settle returned {other:?}"),
    }

    match wait_for_outcome(service, auction_id).await? {
        Some(outcome) => {
            let price = service.view(outcome.clearing_price, seller).await?;
            let winner = bids
                .iter()
                .find(|(label, _)| address_from_label(label) == outcome.winner)
                .map(|(label, _)| label.as_str())
                .unwrap_or("unknown");
            println!("auction {auction_id}: won by {winner} at {price}");
        }
        None => println!("auction {auction_id}: no bid met the reserve, asset returned"),
    }

    for (label, _) in &bids {
        if let Some(balance) = balance_of(service, address_from_label(label)).await? {
            println!("  {label}: {balance}");
        }
    }
    if let Some(balance) = balance_of(service, seller).await? {
        println!("  {seller_label}: {balance}");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("sealed_node=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let genesis = load_genesis(cli.genesis.as_deref())?;

    match cli.command {
        Commands::Genesis => {
            println!("{}", serde_json::to_string_pretty(&genesis)?);
        }

        Commands::Demo {
            bids,
            reserve,
            seller,
            token_id,
        } => {
            let bids = bids
                .iter()
                .map(|entry| parse_bid(entry))
                .collect::<Result<Vec<_>>>()?;

            let token_owner = parse_address(&genesis.token.owner)?;
            info!(token_owner = %short_address(&token_owner), "starting devnet");

            let chain = Chain::from_genesis(&genesis)?;
            let service = ChainService::start(
                chain,
                ServiceConfig {
                    relay_interval_ms: cli.relay_interval_ms,
                    ..ServiceConfig::default()
                },
            );

            let result = run_demo(&service, &seller, token_id, reserve, bids).await;
            service.shutdown().await?;
            result?;
        }
    }

    Ok(())
}

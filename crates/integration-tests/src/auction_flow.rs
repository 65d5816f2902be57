//! Auction lifecycle through the runtime and the relayer.

use std::collections::BTreeSet;

use sealed_auction::{AuctionCall, AuctionError};
use sealed_chain::{auction_address, CallOutput, ChainError, Receipt, RuntimeCall};
use sealed_token::{TokenCall, TokenError};
use sealed_types::{AuctionPhase, CancelReason, EncryptedValue};

use crate::Devnet;

const START: u64 = 1_000_000_000;
const SELLER: &str = "seller";
/// Minted to the seller at genesis.
const NFT: u64 = 1;

fn escrowed(receipt: &Receipt) -> EncryptedValue {
    match receipt.output {
        CallOutput::Encrypted(value) => value,
        ref other => panic!("expected the escrowed bid, got {other:?}"),
    }
}

fn relay_one(net: &mut Devnet) -> Receipt {
    let mut relayed = net.chain.relay_pending();
    assert_eq!(relayed.len(), 1, "expected exactly one pending request");
    relayed.remove(0).expect("relayed callback")
}

fn phase(net: &Devnet, auction_id: u64) -> AuctionPhase {
    net.chain
        .state()
        .auction
        .phase_of(auction_id, net.chain.timestamp())
        .expect("auction exists")
}

#[test]
fn test_tied_top_bids() {
    let mut net = Devnet::with_four_bidders();
    let auction_id = net.open_auction(SELLER, NFT, None);

    for (bidder, amount) in [("alice", 10), ("bob", 30), ("carol", 30), ("dave", 5)] {
        net.bid(auction_id, bidder, amount);
    }
    assert_eq!(net.balance("bob"), START - 30);

    net.close_bidding();
    let receipt = net.settle(SELLER, auction_id).unwrap();
    assert!(receipt.request_id().is_some());
    assert_eq!(phase(&net, auction_id), AuctionPhase::Settling);

    let receipt = relay_one(&mut net);
    let CallOutput::Settled(outcome) = &receipt.output else {
        panic!("expected settlement, got {:?}", receipt.output);
    };

    // Earliest of the tied bids wins and pays the tied amount.
    let bob = Devnet::account("bob");
    assert_eq!(outcome.winner, bob);
    assert_eq!(outcome.num_bids, 4);
    assert_eq!(net.chain.view(&outcome.clearing_price, &bob).unwrap(), 30);

    assert_eq!(net.chain.state().nft.owner_of(NFT), Some(bob));
    assert_eq!(net.balance("bob"), START - 30);
    assert_eq!(net.balance(SELLER), 30);
    for loser in ["alice", "carol", "dave"] {
        assert_eq!(net.balance(loser), START, "{loser} refunded in full");
    }
    assert_eq!(phase(&net, auction_id), AuctionPhase::Settled);
}

#[test]
fn test_winner_pays_second_price() {
    let mut net = Devnet::new();
    let auction_id = net.open_auction(SELLER, NFT, Some(50));

    net.bid(auction_id, "alice", 120);
    net.bid(auction_id, "bob", 300);
    net.bid(auction_id, "carol", 250);

    net.close_bidding();
    net.settle(SELLER, auction_id).unwrap();
    relay_one(&mut net);

    assert_eq!(net.chain.state().nft.owner_of(NFT), Some(Devnet::account("bob")));
    assert_eq!(net.balance("bob"), START - 250);
    assert_eq!(net.balance("alice"), START);
    assert_eq!(net.balance("carol"), START);
    assert_eq!(net.balance(SELLER), 250);
}

#[test]
fn test_zero_bidder_settle_returns_asset() {
    let mut net = Devnet::new();
    let auction_id = net.open_auction(SELLER, NFT, None);
    assert_eq!(net.chain.state().nft.owner_of(NFT), Some(auction_address()));

    net.close_bidding();
    let receipt = net.settle(SELLER, auction_id).unwrap();

    assert_eq!(receipt.output, CallOutput::Cancelled(CancelReason::NoBids));
    assert_eq!(net.chain.state().nft.owner_of(NFT), Some(Devnet::account(SELLER)));
    assert_eq!(phase(&net, auction_id), AuctionPhase::Cancelled);
    assert!(net.chain.state().gateway.pending_requests().is_empty());
}

#[test]
fn test_reserve_not_met_returns_asset_and_refunds() {
    let mut net = Devnet::new();
    let auction_id = net.open_auction(SELLER, NFT, Some(1_000));

    net.bid(auction_id, "alice", 400);
    net.bid(auction_id, "bob", 999);

    net.close_bidding();
    net.settle(SELLER, auction_id).unwrap();
    let receipt = relay_one(&mut net);

    assert_eq!(receipt.output, CallOutput::Cancelled(CancelReason::NoValidBid));
    assert_eq!(net.chain.state().nft.owner_of(NFT), Some(Devnet::account(SELLER)));
    assert_eq!(net.balance("alice"), START);
    assert_eq!(net.balance("bob"), START);
    assert_eq!(net.balance(SELLER), 0);

    // Only the winner index was ever decrypted.
    assert_eq!(net.chain.state().gateway.audit_log().len(), 2);
}

#[test]
fn test_terminal_auction_rejects_settle_and_cancel() {
    let mut net = Devnet::new();
    let auction_id = net.open_auction(SELLER, NFT, None);
    net.bid(auction_id, "alice", 70);
    net.bid(auction_id, "bob", 80);
    net.close_bidding();
    net.settle(SELLER, auction_id).unwrap();
    relay_one(&mut net);

    let balances: Vec<u64> = ["alice", "bob", SELLER].iter().map(|n| net.balance(n)).collect();
    let ciphertexts = net.chain.state().fhe.len();
    let height = net.chain.block_height();

    let settle_again = net.settle(SELLER, auction_id).unwrap_err();
    assert!(matches!(
        settle_again,
        ChainError::Auction(AuctionError::InvalidStateTransition {
            phase: AuctionPhase::Settled,
            ..
        })
    ));

    let cancel = net
        .submit(SELLER, RuntimeCall::Auction(AuctionCall::Cancel { auction_id }))
        .unwrap_err();
    assert!(matches!(
        cancel,
        ChainError::Auction(AuctionError::InvalidStateTransition { .. })
    ));

    let after: Vec<u64> = ["alice", "bob", SELLER].iter().map(|n| net.balance(n)).collect();
    assert_eq!(balances, after);
    assert_eq!(net.chain.state().fhe.len(), ciphertexts);
    assert_eq!(net.chain.block_height(), height);
    assert_eq!(net.chain.state().nft.owner_of(NFT), Some(Devnet::account("bob")));
}

#[test]
fn test_cancelled_auction_rejects_settle() {
    let mut net = Devnet::new();
    let auction_id = net.open_auction(SELLER, NFT, None);
    net.close_bidding();
    net.settle(SELLER, auction_id).unwrap();

    assert!(matches!(
        net.settle(SELLER, auction_id),
        Err(ChainError::Auction(AuctionError::InvalidStateTransition {
            phase: AuctionPhase::Cancelled,
            ..
        }))
    ));
}

fn assert_only_viewer(net: &Devnet, value: &EncryptedValue, bidder: &str) {
    let tag = net.chain.state().fhe.access_tag(&value.handle).expect("escrow stored");
    assert_eq!(tag.viewers, BTreeSet::from([Devnet::account(bidder)]));
    assert!(net.chain.view(value, &Devnet::account(SELLER)).is_err());
    assert!(net.chain.view(value, &auction_address()).is_err());
}

#[test]
fn test_losing_bids_visible_only_to_their_bidders() {
    let mut net = Devnet::new();
    let auction_id = net.open_auction(SELLER, NFT, None);

    let first_alice = escrowed(&net.bid(auction_id, "alice", 90));
    assert_only_viewer(&net, &first_alice, "alice");
    let bob_bid = escrowed(&net.bid(auction_id, "bob", 200));
    assert_only_viewer(&net, &bob_bid, "bob");

    // Alice replaces her bid; the refunded escrow is dropped from the store.
    let second_alice = escrowed(&net.bid(auction_id, "alice", 95));
    assert!(net.chain.state().fhe.access_tag(&first_alice.handle).is_none());
    assert_only_viewer(&net, &second_alice, "alice");
    let carol_bid = escrowed(&net.bid(auction_id, "carol", 40));
    assert_only_viewer(&net, &carol_bid, "carol");

    net.close_bidding();
    net.settle(SELLER, auction_id).unwrap();
    relay_one(&mut net);
    assert_eq!(net.chain.state().nft.owner_of(NFT), Some(Devnet::account("bob")));

    // Settled escrows are gone: nobody can read a losing bid any more.
    for value in [second_alice, carol_bid] {
        assert!(net.chain.state().fhe.access_tag(&value.handle).is_none());
        assert!(net.chain.view(&value, &Devnet::account("bob")).is_err());
    }

    // No decryption ever touched a bid.
    let bid_handles = [first_alice, second_alice, carol_bid, bob_bid].map(|v| v.handle);
    for entry in net.chain.state().gateway.audit_log() {
        assert!(entry.handles.iter().all(|h| !bid_handles.contains(h)));
    }
}

#[test]
fn test_contract_address_cannot_read_or_move_escrow() {
    let mut net = Devnet::new();
    let auction_id = net.open_auction(SELLER, NFT, None);
    net.bid(auction_id, "alice", 400);

    // The auction's balance equals Alice's bid; nobody may read it.
    let escrow = net.chain.state().token.balance(&auction_address()).expect("escrow balance");
    assert!(net.chain.view(&escrow, &auction_address()).is_err());
    assert!(!net.chain.state().fhe.is_viewer(&escrow, &auction_address()));

    let read = net
        .chain
        .submit(auction_address(), RuntimeCall::RequestDecryption { values: vec![escrow] })
        .unwrap_err();
    assert!(matches!(read, ChainError::ReservedSender(_)));

    net.bid(auction_id, "bob", 700);
    let escrow = net.chain.state().token.balance(&auction_address()).expect("escrow balance");
    let drain = net
        .chain
        .submit(
            auction_address(),
            RuntimeCall::Token(TokenCall::TransferEncrypted {
                to: Devnet::account("mallory"),
                amount: escrow,
            }),
        )
        .unwrap_err();
    assert!(matches!(drain, ChainError::ReservedSender(_)));

    // A regular account holding no rights on the handle is refused as well.
    let stranger = net
        .submit(
            "mallory",
            RuntimeCall::Token(TokenCall::TransferEncrypted {
                to: Devnet::account("mallory"),
                amount: escrow,
            }),
        )
        .unwrap_err();
    assert!(matches!(stranger, ChainError::Token(TokenError::CiphertextNotAllowed(_))));

    assert_eq!(net.balance("mallory"), 0);
    assert!(net.chain.state().gateway.audit_log().is_empty());

    net.close_bidding();
    net.settle(SELLER, auction_id).unwrap();
    relay_one(&mut net);
    assert_eq!(net.balance("alice"), START);
    assert_eq!(net.balance("bob"), START - 400);
    assert_eq!(net.balance(SELLER), 400);
}

#[test]
fn test_expired_settlement_is_requested_again() {
    let mut net = Devnet::new();
    let auction_id = net.open_auction(SELLER, NFT, None);
    net.bid(auction_id, "alice", 10);
    net.close_bidding();

    let first = net.settle(SELLER, auction_id).unwrap().request_id().unwrap();

    // The relayer is down past the request TTL.
    let ttl = net.chain.state().gateway.ttl_secs();
    net.chain.advance_time(ttl + 1);
    assert!(net.chain.relay_pending().is_empty());

    let second = net.settle(SELLER, auction_id).unwrap().request_id().unwrap();
    assert_ne!(first, second);

    let receipt = relay_one(&mut net);
    assert!(matches!(receipt.output, CallOutput::Settled(_)));
    assert_eq!(net.chain.state().nft.owner_of(NFT), Some(Devnet::account("alice")));
}

#[test]
fn test_seller_cancel_refunds_bids() {
    let mut net = Devnet::new();
    let auction_id = net.open_auction(SELLER, NFT, None);
    net.bid(auction_id, "alice", 500);
    assert_eq!(net.balance("alice"), START - 500);

    let stranger = net.submit("bob", RuntimeCall::Auction(AuctionCall::Cancel { auction_id }));
    assert!(matches!(stranger, Err(ChainError::Auction(AuctionError::Unauthorized(_)))));

    let receipt = net
        .submit(SELLER, RuntimeCall::Auction(AuctionCall::Cancel { auction_id }))
        .unwrap();
    assert_eq!(receipt.output, CallOutput::Cancelled(CancelReason::Seller));
    assert_eq!(net.balance("alice"), START);
    assert_eq!(net.chain.state().nft.owner_of(NFT), Some(Devnet::account(SELLER)));
}

//! Token ledger properties.

use sealed_chain::token_address;

use crate::Devnet;

const START: u64 = 1_000_000_000;

#[test]
fn test_transfer_with_sufficient_funds_moves_amount() {
    let mut net = Devnet::new();

    assert!(net.transfer("alice", "bob", 250_000));

    assert_eq!(net.balance("alice"), START - 250_000);
    assert_eq!(net.balance("bob"), START + 250_000);
    assert_eq!(net.chain.state().token.total_supply, 3 * START);
}

#[test]
fn test_transfer_with_insufficient_funds_changes_nothing() {
    let mut net = Devnet::new();

    assert!(!net.transfer("alice", "bob", START + 1));

    assert_eq!(net.balance("alice"), START);
    assert_eq!(net.balance("bob"), START);
}

#[test]
fn test_transfer_to_fresh_account_and_back() {
    let mut net = Devnet::new();

    assert!(net.transfer("alice", "erin", 40));
    assert_eq!(net.balance("erin"), 40);

    // Everything, then one more than is left.
    assert!(net.transfer("erin", "alice", 40));
    assert!(!net.transfer("erin", "alice", 1));
    assert_eq!(net.balance("erin"), 0);
    assert_eq!(net.balance("alice"), START);
}

#[test]
fn test_self_transfer_keeps_balance() {
    let mut net = Devnet::new();
    assert!(net.transfer("alice", "alice", 10));
    assert_eq!(net.balance("alice"), START);
}

#[test]
fn test_allowance_never_goes_negative() {
    let mut net = Devnet::new();
    let bob = Devnet::account("bob");

    net.approve("alice", bob, 100);
    assert_eq!(net.allowance("alice", bob), Some(100));

    assert!(net.transfer_from("bob", "alice", "carol", 60));
    assert_eq!(net.allowance("alice", bob), Some(40));

    // Over the remaining allowance: nothing moves.
    assert!(!net.transfer_from("bob", "alice", "carol", 60));
    assert_eq!(net.allowance("alice", bob), Some(40));

    assert!(net.transfer_from("bob", "alice", "carol", 40));
    assert_eq!(net.allowance("alice", bob), Some(0));

    assert!(!net.transfer_from("bob", "alice", "carol", 1));
    assert_eq!(net.allowance("alice", bob), Some(0));

    assert_eq!(net.balance("alice"), START - 100);
    assert_eq!(net.balance("carol"), START + 100);

    // Approve overwrites.
    net.approve("alice", bob, 5);
    assert_eq!(net.allowance("alice", bob), Some(5));
}

#[test]
fn test_allowance_kept_when_balance_is_short() {
    let mut net = Devnet::new();
    let bob = Devnet::account("bob");

    net.approve("alice", bob, 3 * START);
    assert!(!net.transfer_from("bob", "alice", "bob", 2 * START));

    assert_eq!(net.allowance("alice", bob), Some(3 * START));
    assert_eq!(net.balance("alice"), START);
    assert_eq!(net.balance("bob"), START);
}

#[test]
fn test_transfer_from_without_approval_moves_nothing() {
    let mut net = Devnet::new();

    assert!(!net.transfer_from("mallory", "alice", "mallory", 1));
    assert_eq!(net.balance("alice"), START);
    assert_eq!(net.balance("mallory"), 0);
}

#[test]
fn test_input_bound_to_other_sender_reverts() {
    let mut net = Devnet::new();
    let stolen = net.input(token_address(), "alice", 10);

    let result = net.submit(
        "mallory",
        sealed_chain::RuntimeCall::Token(sealed_token::TokenCall::Transfer {
            to: Devnet::account("mallory"),
            amount: stolen,
        }),
    );

    assert!(result.is_err());
    assert_eq!(net.balance("alice"), START);
    assert_eq!(net.chain.block_height(), 0);
}

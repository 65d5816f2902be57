//! Client SDK for the confidential token and the sealed-bid auction.
//!
//! This crate provides a high-level API for:
//! - Encrypting an amount to the network key for one contract and sender
//! - Attaching the commitment that proves the envelope is well formed

pub mod input;

pub use input::{encrypt_input, InputBuilder, InputError, PreparedInput};

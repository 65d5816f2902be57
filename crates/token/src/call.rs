//! Call message types for the token ledger.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use sealed_types::{Address, EncryptedValue, ExternalInput};

#[derive(Clone, Debug, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub enum TokenCall {
    /// Create new supply (owner only).
    Mint { to: Address, amount: u64 },

    /// Transfer an encrypted client amount.
    Transfer { to: Address, amount: ExternalInput },

    /// Transfer an amount the caller already holds as a ciphertext.
    TransferEncrypted { to: Address, amount: EncryptedValue },

    /// Overwrite the caller's allowance for `spender`.
    Approve { spender: Address, amount: ExternalInput },

    ApproveEncrypted { spender: Address, amount: EncryptedValue },

    /// Spend from `from`'s balance against the caller's allowance.
    TransferFrom {
        from: Address,
        to: Address,
        amount: ExternalInput,
    },

    TransferFromEncrypted {
        from: Address,
        to: Address,
        amount: EncryptedValue,
    },
}

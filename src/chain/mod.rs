//! Chain-facing surface: addresses, entry-function packing, and the
//! collaborator capabilities the cryptographic core is parameterized over.
//!
//! The core never talks to a node directly. It reads state through a
//! [`ChainReader`], hands payloads to a [`Signer`] (which may be a hardware
//! wallet suspending asynchronously), and pushes the signed result through a
//! single [`Submitter`] capability. Tests plug in fakes for all three.

use core::fmt;

use async_trait::async_trait;
use codec::{Decode, Encode};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{
    balance::BalanceRecord,
    elgamal::{ChunkedCipherText, EncryptionKey},
    errors::Result,
    proofs::{NormalizationProof, RotationProof, TransferProof, WithdrawalProof},
    Amount,
};

/// A 32-byte on-chain address. Tokens are addressed the same way as
/// accounts (the token's metadata object address).
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Encode, Decode)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Address(pub [u8; 32]);

impl Address {
    pub const fn new(bytes: [u8; 32]) -> Self {
        Address(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}

/// An entry-function invocation ready for signing: the function name and
/// its packed byte-vector arguments.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransactionPayload {
    pub function: &'static str,
    pub args: Vec<Vec<u8>>,
}

/// A payload plus the host's outer-transaction authenticator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedTransaction {
    pub payload: TransactionPayload,
    pub authenticator: Vec<u8>,
}

/// Result of a successful submission.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Receipt {
    pub tx_hash: [u8; 32],
    /// Ledger version the transaction committed at.
    pub version: u64,
}

/// The logical entry functions of the on-chain confidential-asset module,
/// with typed arguments. [`ConfidentialCall::into_payload`] packs them into
/// the canonical byte-vector form.
#[derive(Clone, Debug)]
pub enum ConfidentialCall {
    Register {
        token: Address,
        encryption_key: EncryptionKey,
    },
    Deposit {
        token: Address,
        amount: Amount,
    },
    RolloverPendingBalance {
        token: Address,
    },
    Normalize {
        token: Address,
        new_available: ChunkedCipherText,
        proof: NormalizationProof,
    },
    Withdraw {
        token: Address,
        amount: Amount,
        new_available: ChunkedCipherText,
        proof: WithdrawalProof,
    },
    ConfidentialTransfer {
        token: Address,
        recipient: Address,
        new_sender_available: ChunkedCipherText,
        recipient_amount: ChunkedCipherText,
        proof: TransferProof,
    },
    RotateEncryptionKey {
        token: Address,
        new_encryption_key: EncryptionKey,
        new_available: ChunkedCipherText,
        proof: RotationProof,
    },
}

impl ConfidentialCall {
    pub fn function_name(&self) -> &'static str {
        match self {
            Self::Register { .. } => "register",
            Self::Deposit { .. } => "deposit",
            Self::RolloverPendingBalance { .. } => "rollover_pending_balance",
            Self::Normalize { .. } => "normalize",
            Self::Withdraw { .. } => "withdraw",
            Self::ConfidentialTransfer { .. } => "confidential_transfer",
            Self::RotateEncryptionKey { .. } => "rotate_encryption_key",
        }
    }

    /// Pack the arguments in the on-chain module's declared order.
    pub fn into_payload(self) -> TransactionPayload {
        let function = self.function_name();
        let args = match self {
            Self::Register {
                token,
                encryption_key,
            } => vec![token.encode(), encryption_key.encode()],
            Self::Deposit { token, amount } => vec![token.encode(), amount.encode()],
            Self::RolloverPendingBalance { token } => vec![token.encode()],
            Self::Normalize {
                token,
                new_available,
                proof,
            } => vec![token.encode(), new_available.encode(), proof.to_bytes()],
            Self::Withdraw {
                token,
                amount,
                new_available,
                proof,
            } => vec![
                token.encode(),
                amount.encode(),
                new_available.encode(),
                proof.to_bytes(),
            ],
            Self::ConfidentialTransfer {
                token,
                recipient,
                new_sender_available,
                recipient_amount,
                proof,
            } => {
                // Auditor ciphertexts ride in their own argument so the
                // module can store them for later auditor reads. An empty
                // list is the single count byte 0x00.
                let mut auditor_amounts =
                    Vec::with_capacity(1 + proof.auditors.len() * 512);
                (proof.auditors.len() as u8).encode_to(&mut auditor_amounts);
                for leg in &proof.auditors {
                    leg.amount.encode_to(&mut auditor_amounts);
                }
                vec![
                    token.encode(),
                    recipient.encode(),
                    new_sender_available.encode(),
                    recipient_amount.encode(),
                    auditor_amounts,
                    proof.to_bytes(),
                ]
            }
            Self::RotateEncryptionKey {
                token,
                new_encryption_key,
                new_available,
                proof,
            } => vec![
                token.encode(),
                new_encryption_key.encode(),
                new_available.encode(),
                proof.to_bytes(),
            ],
        };

        TransactionPayload { function, args }
    }
}

/// Read access to on-chain confidential-asset state.
///
/// `None` means the account has no record for the token (not registered).
#[async_trait]
pub trait ChainReader: Send + Sync {
    async fn balance_record(
        &self,
        account: Address,
        token: Address,
    ) -> Result<Option<BalanceRecord>>;

    async fn encryption_key(
        &self,
        account: Address,
        token: Address,
    ) -> Result<Option<EncryptionKey>>;

    /// The asset-wide auditor every transfer of this token must include,
    /// if the asset has one.
    async fn asset_auditor_key(&self, token: Address) -> Result<Option<EncryptionKey>>;
}

/// Hook for the host to sign the outer transaction. May suspend, e.g. for
/// a hardware wallet.
#[async_trait]
pub trait Signer: Send + Sync {
    async fn sign(&self, payload: TransactionPayload) -> Result<SignedTransaction>;
}

/// The single submission capability: one signed payload in, one receipt
/// out. Keeps the cryptographic core testable with a fake submitter.
#[async_trait]
pub trait Submitter: Send + Sync {
    async fn submit(&self, transaction: SignedTransaction) -> Result<Receipt>;
}

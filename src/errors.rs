//! Error taxonomy of the confidential-assets client.
//!
//! Every failure surfaces to the caller with its kind and, at the
//! orchestrator boundary, a context naming the operation and the step that
//! produced it. Only transport failures and stale-state conflicts are
//! retriable; all cryptographic errors are fatal to the current call.

use thiserror::Error;

use crate::{Amount, Balance};

/// Confidential asset error.
#[derive(Debug, PartialEq, Eq, Error)]
pub enum Error {
    /// Malformed bytes, or a non-canonical point/scalar encoding.
    #[error("invalid encoding: {0}")]
    InvalidEncoding(&'static str),

    /// A proof carried a version prefix this build does not understand.
    #[error("unsupported proof version {0:#06x}")]
    UnsupportedVersion(u16),

    /// The plaintext does not fit the claimed bit range.
    #[error("amount does not fit in {max_bits} bits")]
    AmountOutOfRange { max_bits: u32 },

    /// The discrete-log search did not find the chunk value.
    #[error("discrete-log search failed for chunk {0}")]
    ChunkDecryptFailed(usize),

    /// The caller tried to spend more than the decrypted available balance.
    #[error("amount {amount} exceeds the available balance {balance}")]
    InsufficientBalance { balance: Balance, amount: Amount },

    /// Chain state changed between fetch and submit.
    #[error("chain state changed between fetch and submit")]
    StaleState,

    /// The account is frozen while a key rotation is in flight.
    #[error("account is frozen by an in-flight key rotation")]
    FrozenAccount,

    /// A spendable operation was attempted on an unnormalized balance.
    #[error("balance must be rolled over and normalized first")]
    Unnormalized,

    /// No confidential balance record exists for this (account, token) pair.
    #[error("account is not registered for this token")]
    NotRegistered,

    /// The local self-check of a freshly built proof failed.
    #[error("self-verification of the {0} proof failed")]
    ProofFailed(&'static str),

    /// A sigma response equation did not hold.
    #[error("failed to verify check {check} of the sigma proof")]
    SigmaVerificationError { check: u16 },

    /// The number of auditors is over the `MAX_AUDITORS` limit.
    #[error("too many auditors")]
    TooManyAuditors,

    /// The auditor sections of a transfer proof are inconsistent.
    #[error("the number of auditor keys does not match the proof")]
    WrongNumberOfAuditors,

    /// A range proof failed to prove or verify.
    #[error(transparent)]
    BulletproofProvingError(#[from] bulletproofs::ProofError),

    /// Transport failure talking to the chain; may be retried.
    #[error("rpc failure: {0}")]
    RpcError(String),

    /// The submission lost a sequence-number race with another transaction.
    #[error("duplicate submission: account sequence number already used")]
    DuplicateSubmission,

    /// The operation was aborted by the caller.
    #[error("operation cancelled")]
    Cancelled,

    /// An error kind wrapped with the operation and step that produced it.
    #[error("{operation}/{step}: {source}")]
    Context {
        operation: &'static str,
        step: &'static str,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Wrap this error with the operation and step it occurred in.
    pub fn context(self, operation: &'static str, step: &'static str) -> Self {
        Error::Context {
            operation,
            step,
            source: Box::new(self),
        }
    }

    /// The innermost error kind, with any context layers stripped.
    pub fn root(&self) -> &Error {
        match self {
            Error::Context { source, .. } => source.root(),
            other => other,
        }
    }

    /// Whether the operation may be retried after refetching chain state.
    pub fn is_retriable(&self) -> bool {
        matches!(self.root(), Error::RpcError(_) | Error::StaleState)
    }
}

pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Attach `(operation, step)` context to an error result.
pub(crate) trait ResultExt<T> {
    fn ctx(self, operation: &'static str, step: &'static str) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn ctx(self, operation: &'static str, step: &'static str) -> Result<T> {
        self.map_err(|e| e.context(operation, step))
    }
}

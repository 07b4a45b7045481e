//! The operation orchestrator.
//!
//! Each public operation is a deterministic pipeline: fetch the current
//! record through the [`ChainReader`], decrypt what the proof needs, build
//! and self-verify the proof bundle, pack the entry-function call, hand it
//! to the [`Signer`], and push it through the [`Submitter`].
//!
//! Operations on the same token serialize behind a per-token cooperative
//! lock, so two in-flight proofs can never target the same pre-image.
//! Transient failures (`RpcError`, `StaleState`) retry up to three times
//! with 100 ms / 400 ms / 1.6 s backoff, refetching state each attempt.
//! Cancellation is dropping the returned future: the lock guard releases on
//! drop and scratch secrets are zeroize-on-drop.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, PoisonError, RwLock};
use std::time::Duration;

use rand_core::OsRng;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, warn};

use crate::{
    balance::{BalanceRecord, DecryptedBalance},
    chain::{Address, ChainReader, ConfidentialCall, Receipt, Signer, Submitter},
    elgamal::{ConfidentialKeys, EncryptionKey},
    errors::{Error, Result, ResultExt},
    proofs::{NormalizationProof, RotationProof, TransferProof, WithdrawalProof},
    Amount, CHUNK_BITS,
};

const MAX_RETRIES: u32 = 3;
const RETRY_BASE_DELAY: Duration = Duration::from_millis(100);
const RETRY_FACTOR: u32 = 4;

/// Immutable construction-time configuration. The auditor override is the
/// one field with a legitimate post-construction rotation path, exposed via
/// [`ConfidentialClient::set_auditor_override`].
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// The account this client signs for.
    pub account: Address,
    /// Replaces the asset's on-chain auditor key in outgoing transfers.
    pub auditor_override: Option<EncryptionKey>,
}

impl ClientConfig {
    pub fn new(account: Address) -> Self {
        ClientConfig {
            account,
            auditor_override: None,
        }
    }
}

/// Per-token serialized state: the keys currently in force for the token
/// and the last-observed balance record.
struct TokenState {
    keys: ConfidentialKeys,
    cached: Option<BalanceRecord>,
}

/// Retry loop for one operation attempt expression. The expression runs
/// inside the per-token lock and refetches chain state on every attempt.
macro_rules! with_retries {
    ($operation:expr, $attempt:expr) => {{
        let mut tries = 0u32;
        loop {
            match $attempt {
                Err(err) if err.is_retriable() && tries < MAX_RETRIES => {
                    let delay = RETRY_BASE_DELAY * RETRY_FACTOR.pow(tries);
                    warn!(
                        operation = $operation,
                        attempt = tries + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient failure, retrying",
                    );
                    tokio::time::sleep(delay).await;
                    tries += 1;
                }
                other => break other,
            }
        }
    }};
}

/// Client-side orchestrator for one account's confidential balances.
pub struct ConfidentialClient<R, S, U> {
    config: ClientConfig,
    base_keys: ConfidentialKeys,
    reader: R,
    signer: S,
    submitter: U,
    tokens: StdMutex<HashMap<Address, Arc<AsyncMutex<TokenState>>>>,
    auditor_override: RwLock<Option<EncryptionKey>>,
}

impl<R, S, U> ConfidentialClient<R, S, U>
where
    R: ChainReader,
    S: Signer,
    U: Submitter,
{
    pub fn new(config: ClientConfig, keys: ConfidentialKeys, reader: R, signer: S, submitter: U) -> Self {
        let auditor_override = RwLock::new(config.auditor_override);
        ConfidentialClient {
            config,
            base_keys: keys,
            reader,
            signer,
            submitter,
            tokens: StdMutex::new(HashMap::new()),
            auditor_override,
        }
    }

    pub fn account(&self) -> Address {
        self.config.account
    }

    /// The rotation path for the auditor key override.
    pub fn set_auditor_override(&self, key: Option<EncryptionKey>) {
        *self
            .auditor_override
            .write()
            .unwrap_or_else(PoisonError::into_inner) = key;
    }

    /// The keys currently in force for a token (rotation swaps them).
    pub async fn token_keys(&self, token: Address) -> ConfidentialKeys {
        let state = self.token_state(token);
        let state = state.lock().await;
        state.keys.clone()
    }

    /// The last-observed record for a token, if any fetch has happened.
    pub async fn cached_record(&self, token: Address) -> Option<BalanceRecord> {
        let state = self.token_state(token);
        let state = state.lock().await;
        state.cached.clone()
    }

    /// Publish the account's encryption key for `token` and allocate the
    /// zeroed on-chain record. No proof is required.
    pub async fn register(&self, token: Address) -> Result<Receipt> {
        let state = self.token_state(token);
        let mut state = state.lock().await;
        debug!(operation = "register", token = %token, "starting");
        with_retries!("register", self.try_register(&mut state, token).await)
    }

    /// Move public funds into the pending confidential balance. The amount
    /// is public at this boundary, so no proof is required.
    pub async fn deposit(&self, token: Address, amount: Amount) -> Result<Receipt> {
        let state = self.token_state(token);
        let mut state = state.lock().await;
        debug!(operation = "deposit", token = %token, amount, "starting");
        with_retries!("deposit", self.try_deposit(&mut state, token, amount).await)
    }

    /// Fold the pending balance into the available balance.
    pub async fn rollover(&self, token: Address) -> Result<Receipt> {
        let state = self.token_state(token);
        let mut state = state.lock().await;
        debug!(operation = "rollover", token = %token, "starting");
        with_retries!("rollover", self.try_rollover(&mut state, token).await)
    }

    /// Re-encrypt the available balance so every chunk fits 16 bits again.
    pub async fn normalize(&self, token: Address) -> Result<Receipt> {
        let state = self.token_state(token);
        let mut state = state.lock().await;
        debug!(operation = "normalize", token = %token, "starting");
        with_retries!("normalize", self.try_normalize(&mut state, token).await)
    }

    /// Withdraw `amount` back to the public balance. Rolls over a non-empty
    /// pending balance and normalizes first when needed.
    pub async fn withdraw(&self, token: Address, amount: Amount) -> Result<Receipt> {
        let state = self.token_state(token);
        let mut state = state.lock().await;
        debug!(operation = "withdraw", token = %token, amount, "starting");
        with_retries!("withdraw", self.try_withdraw(&mut state, token, amount).await)
    }

    /// Confidentially transfer `amount` to `recipient`. The asset's auditor
    /// (or the configured override) is always included; `extra_auditors`
    /// are appended in order.
    pub async fn transfer(
        &self,
        token: Address,
        recipient: Address,
        amount: Amount,
        extra_auditors: &[EncryptionKey],
    ) -> Result<Receipt> {
        let state = self.token_state(token);
        let mut state = state.lock().await;
        debug!(operation = "transfer", token = %token, recipient = %recipient, "starting");
        with_retries!(
            "transfer",
            self.try_transfer(&mut state, token, recipient, amount, extra_auditors)
                .await
        )
    }

    /// Rotate the token's encryption key. Refused locally unless the
    /// pending balance is empty and the available balance is normalized.
    pub async fn rotate(&self, token: Address, new_keys: &ConfidentialKeys) -> Result<Receipt> {
        let state = self.token_state(token);
        let mut state = state.lock().await;
        debug!(operation = "rotate", token = %token, "starting");
        let receipt = with_retries!(
            "rotate",
            self.try_rotate(&mut state, token, new_keys).await
        )?;
        state.keys = new_keys.clone();
        Ok(receipt)
    }

    /// Fetch and decrypt both balances of the account for `token`.
    pub async fn decrypt_balance(&self, token: Address) -> Result<DecryptedBalance> {
        let state = self.token_state(token);
        let mut state = state.lock().await;
        let record = with_retries!(
            "decrypt_balance",
            self.fetch_required(&mut state, token)
                .await
                .ctx("decrypt_balance", "fetch")
        )?;
        Ok(DecryptedBalance {
            pending: record
                .decrypt_pending(&state.keys.secret)
                .ctx("decrypt_balance", "decrypt-pending")?,
            available: record
                .decrypt_available(&state.keys.secret)
                .ctx("decrypt_balance", "decrypt-available")?,
        })
    }

    // --------------------------------------------------------------------
    // Single attempts; the retry macro re-runs these from the fetch.
    // --------------------------------------------------------------------

    async fn try_register(&self, state: &mut TokenState, token: Address) -> Result<Receipt> {
        let call = ConfidentialCall::Register {
            token,
            encryption_key: state.keys.public,
        };
        self.sign_and_submit("register", call).await
    }

    async fn try_deposit(
        &self,
        state: &mut TokenState,
        token: Address,
        amount: Amount,
    ) -> Result<Receipt> {
        let record = self
            .fetch_required(state, token)
            .await
            .ctx("deposit", "fetch")?;
        record.ensure_accepts_incoming().ctx("deposit", "state")?;

        self.sign_and_submit("deposit", ConfidentialCall::Deposit { token, amount })
            .await
    }

    async fn try_rollover(&self, state: &mut TokenState, token: Address) -> Result<Receipt> {
        let record = self
            .fetch_required(state, token)
            .await
            .ctx("rollover", "fetch")?;
        record.ensure_accepts_incoming().ctx("rollover", "state")?;

        self.sign_and_submit(
            "rollover",
            ConfidentialCall::RolloverPendingBalance { token },
        )
        .await
    }

    async fn try_normalize(&self, state: &mut TokenState, token: Address) -> Result<Receipt> {
        let record = self
            .fetch_required(state, token)
            .await
            .ctx("normalize", "fetch")?;
        ensure!(
            !record.is_frozen,
            Error::FrozenAccount.context("normalize", "state")
        );

        self.submit_normalization(&state.keys, token, &record).await
    }

    async fn try_withdraw(
        &self,
        state: &mut TokenState,
        token: Address,
        amount: Amount,
    ) -> Result<Receipt> {
        let mut record = self
            .fetch_required(state, token)
            .await
            .ctx("withdraw", "fetch")?;
        ensure!(
            !record.is_frozen,
            Error::FrozenAccount.context("withdraw", "state")
        );

        if record.has_pending(&state.keys.secret) {
            debug!(operation = "withdraw", token = %token, "rolling over pending balance");
            self.sign_and_submit(
                "withdraw",
                ConfidentialCall::RolloverPendingBalance { token },
            )
            .await
            .ctx("withdraw", "rollover")?;
            record = self
                .fetch_required(state, token)
                .await
                .ctx("withdraw", "refetch")?;
        }

        record = self
            .ensure_normalized(state, token, record, "withdraw")
            .await?;

        let keys = &state.keys;
        let balance = record
            .available
            .decrypt(&keys.secret)
            .ctx("withdraw", "decrypt")?;
        let (proof, new_available) = WithdrawalProof::new(
            keys,
            &self.config.account,
            &token,
            amount,
            balance,
            &record.available,
            &mut OsRng,
        )
        .ctx("withdraw", "prove")?;
        proof
            .verify(
                &self.config.account,
                &token,
                &keys.public,
                amount,
                &record.available,
                &new_available,
                &mut OsRng,
            )
            .map_err(|_| Error::ProofFailed("withdrawal").context("withdraw", "self-check"))?;

        self.sign_and_submit(
            "withdraw",
            ConfidentialCall::Withdraw {
                token,
                amount,
                new_available,
                proof,
            },
        )
        .await
    }

    async fn try_transfer(
        &self,
        state: &mut TokenState,
        token: Address,
        recipient: Address,
        amount: Amount,
        extra_auditors: &[EncryptionKey],
    ) -> Result<Receipt> {
        let mut record = self
            .fetch_required(state, token)
            .await
            .ctx("transfer", "fetch")?;
        ensure!(
            !record.is_frozen,
            Error::FrozenAccount.context("transfer", "state")
        );
        record = self
            .ensure_normalized(state, token, record, "transfer")
            .await?;

        let recipient_key = self
            .reader
            .encryption_key(recipient, token)
            .await
            .ctx("transfer", "fetch-recipient")?
            .ok_or(Error::NotRegistered)
            .ctx("transfer", "fetch-recipient")?;

        let override_key = *self
            .auditor_override
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let asset_auditor = match override_key {
            Some(key) => Some(key),
            None => self
                .reader
                .asset_auditor_key(token)
                .await
                .ctx("transfer", "fetch-auditor")?,
        };
        let auditor_keys: Vec<EncryptionKey> = asset_auditor
            .into_iter()
            .chain(extra_auditors.iter().copied())
            .collect();

        let keys = &state.keys;
        let balance = record
            .available
            .decrypt(&keys.secret)
            .ctx("transfer", "decrypt")?;
        let (proof, new_sender_available, recipient_amount) = TransferProof::new(
            keys,
            &self.config.account,
            &token,
            &recipient_key,
            &auditor_keys,
            amount,
            balance,
            &record.available,
            &mut OsRng,
        )
        .ctx("transfer", "prove")?;
        proof
            .verify(
                &self.config.account,
                &token,
                &keys.public,
                &recipient_key,
                &record.available,
                &new_sender_available,
                &recipient_amount,
                &mut OsRng,
            )
            .map_err(|_| Error::ProofFailed("transfer").context("transfer", "self-check"))?;

        self.sign_and_submit(
            "transfer",
            ConfidentialCall::ConfidentialTransfer {
                token,
                recipient,
                new_sender_available,
                recipient_amount,
                proof,
            },
        )
        .await
    }

    async fn try_rotate(
        &self,
        state: &mut TokenState,
        token: Address,
        new_keys: &ConfidentialKeys,
    ) -> Result<Receipt> {
        let record = self
            .fetch_required(state, token)
            .await
            .ctx("rotate", "fetch")?;
        ensure!(
            !record.is_frozen,
            Error::FrozenAccount.context("rotate", "state")
        );
        // Rotation demands a quiescent balance: roll over and normalize
        // first, explicitly. Refuse locally rather than rely on the chain.
        ensure!(
            !record.has_pending(&state.keys.secret),
            Error::Unnormalized.context("rotate", "state")
        );
        ensure!(
            record.is_normalized,
            Error::Unnormalized.context("rotate", "state")
        );

        let keys = &state.keys;
        let balance = record
            .available
            .decrypt(&keys.secret)
            .ctx("rotate", "decrypt")?;
        let (proof, new_available) = RotationProof::new(
            keys,
            new_keys,
            &self.config.account,
            &token,
            balance,
            &record.available,
            &mut OsRng,
        )
        .ctx("rotate", "prove")?;
        proof
            .verify(
                &self.config.account,
                &token,
                &keys.public,
                &new_keys.public,
                &record.available,
                &new_available,
                &mut OsRng,
            )
            .map_err(|_| Error::ProofFailed("rotation").context("rotate", "self-check"))?;

        self.sign_and_submit(
            "rotate",
            ConfidentialCall::RotateEncryptionKey {
                token,
                new_encryption_key: new_keys.public,
                new_available,
                proof,
            },
        )
        .await
    }

    // --------------------------------------------------------------------
    // Shared steps.
    // --------------------------------------------------------------------

    fn token_state(&self, token: Address) -> Arc<AsyncMutex<TokenState>> {
        let mut tokens = self
            .tokens
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        tokens
            .entry(token)
            .or_insert_with(|| {
                Arc::new(AsyncMutex::new(TokenState {
                    keys: self.base_keys.clone(),
                    cached: None,
                }))
            })
            .clone()
    }

    async fn fetch_required(
        &self,
        state: &mut TokenState,
        token: Address,
    ) -> Result<BalanceRecord> {
        let record = self
            .reader
            .balance_record(self.config.account, token)
            .await?
            .ok_or(Error::NotRegistered)?;
        state.cached = Some(record.clone());
        Ok(record)
    }

    /// Emit a normalization transaction when the record needs one, then
    /// refetch. Spendable proofs are only built over normalized state.
    async fn ensure_normalized(
        &self,
        state: &mut TokenState,
        token: Address,
        record: BalanceRecord,
        operation: &'static str,
    ) -> Result<BalanceRecord> {
        if record.is_normalized {
            return Ok(record);
        }

        debug!(operation, token = %token, "normalizing before spend");
        self.submit_normalization(&state.keys, token, &record)
            .await
            .ctx(operation, "normalize")?;
        let record = self
            .fetch_required(state, token)
            .await
            .ctx(operation, "refetch")?;
        ensure!(record.is_normalized, Error::StaleState.context(operation, "normalize"));
        Ok(record)
    }

    async fn submit_normalization(
        &self,
        keys: &ConfidentialKeys,
        token: Address,
        record: &BalanceRecord,
    ) -> Result<Receipt> {
        let balance = record
            .available
            .decrypt_with_bits(&keys.secret, 2 * CHUNK_BITS)
            .ctx("normalize", "decrypt")?;
        let (proof, new_available) = NormalizationProof::new(
            keys,
            &self.config.account,
            &token,
            balance,
            &record.available,
            &mut OsRng,
        )
        .ctx("normalize", "prove")?;
        proof
            .verify(
                &self.config.account,
                &token,
                &keys.public,
                &record.available,
                &new_available,
                &mut OsRng,
            )
            .map_err(|_| Error::ProofFailed("normalization").context("normalize", "self-check"))?;

        self.sign_and_submit(
            "normalize",
            ConfidentialCall::Normalize {
                token,
                new_available,
                proof,
            },
        )
        .await
    }

    async fn sign_and_submit(
        &self,
        operation: &'static str,
        call: ConfidentialCall,
    ) -> Result<Receipt> {
        let payload = call.into_payload();
        debug!(operation, function = payload.function, "signing");
        let signed = self.signer.sign(payload).await.ctx(operation, "sign")?;
        let receipt = self
            .submitter
            .submit(signed)
            .await
            .ctx(operation, "submit")?;
        debug!(operation, version = receipt.version, "committed");
        Ok(receipt)
    }
}

//! In-process mock of the chain: executes the Move-side verifier logic
//! locally so the whole fetch → prove → submit pipeline runs end to end.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use codec::Decode;
use rand::rngs::OsRng;

use confidential_assets_client::{
    Address, Amount, Balance, BalanceRecord, ChainReader, ChunkedCipherText, EncryptionKey, Error,
    NormalizationProof, Receipt, Result, RotationProof, Signer, Submitter, TransferProof,
    WithdrawalProof,
};
use confidential_assets_client::chain::{SignedTransaction, TransactionPayload};

/// A failure injected into the next submissions, front first.
#[derive(Copy, Clone, Debug)]
pub enum Fault {
    Transient,
    Stale,
    Duplicate,
}

#[derive(Default)]
struct ChainState {
    records: HashMap<(Address, Address), BalanceRecord>,
    asset_auditors: HashMap<Address, EncryptionKey>,
    version: u64,
    faults: VecDeque<Fault>,
    /// Function names of every successfully executed transaction.
    executed: Vec<&'static str>,
}

/// Shared fake chain; clones talk to the same state.
#[derive(Clone, Default)]
pub struct MockChain {
    state: Arc<Mutex<ChainState>>,
}

/// Signs by tagging the payload with the sender address, which is all the
/// mock executor needs.
#[derive(Clone)]
pub struct MockSigner {
    account: Address,
}

impl MockChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signer_for(&self, account: Address) -> MockSigner {
        MockSigner { account }
    }

    pub fn set_asset_auditor(&self, token: Address, key: EncryptionKey) {
        self.lock().asset_auditors.insert(token, key);
    }

    pub fn inject_fault(&self, fault: Fault) {
        self.lock().faults.push_back(fault);
    }

    pub fn freeze(&self, account: Address, token: Address, frozen: bool) {
        let mut state = self.lock();
        if let Some(record) = state.records.get_mut(&(account, token)) {
            record.is_frozen = frozen;
        }
    }

    pub fn executed(&self) -> Vec<&'static str> {
        self.lock().executed.clone()
    }

    pub fn record(&self, account: Address, token: Address) -> Option<BalanceRecord> {
        self.lock().records.get(&(account, token)).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ChainState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn execute(&self, sender: Address, payload: &TransactionPayload) -> Result<Receipt> {
        let mut guard = self.lock();
        let state = &mut *guard;
        if let Some(fault) = state.faults.pop_front() {
            return Err(match fault {
                Fault::Transient => Error::RpcError("injected transport failure".into()),
                Fault::Stale => Error::StaleState,
                Fault::Duplicate => Error::DuplicateSubmission,
            });
        }

        let args = &payload.args;
        match payload.function {
            "register" => {
                let token = decode::<Address>(&args[0])?;
                let key = decode::<EncryptionKey>(&args[1])?;
                if state.records.contains_key(&(sender, token)) {
                    return Err(Error::RpcError("already registered".into()));
                }
                state.records.insert((sender, token), BalanceRecord::new(key));
            }
            "deposit" => {
                let token = decode::<Address>(&args[0])?;
                let amount = decode::<Amount>(&args[1])?;
                let record = record_mut(state, sender, token)?;
                if record.is_frozen {
                    return Err(Error::FrozenAccount);
                }
                record.pending += ChunkedCipherText::from_value(amount as Balance);
            }
            "rollover_pending_balance" => {
                let token = decode::<Address>(&args[0])?;
                let record = record_mut(state, sender, token)?;
                if record.is_frozen {
                    return Err(Error::FrozenAccount);
                }
                let pending = record.pending;
                record.available += pending;
                record.pending = ChunkedCipherText::zero();
                // The chain cannot observe chunk magnitudes, so every
                // rollover conservatively clears the flag.
                record.is_normalized = false;
            }
            "normalize" => {
                let token = decode::<Address>(&args[0])?;
                let new_available = decode::<ChunkedCipherText>(&args[1])?;
                let proof = NormalizationProof::from_bytes(&args[2])?;
                let record = record_mut(state, sender, token)?;
                if record.is_frozen {
                    return Err(Error::FrozenAccount);
                }
                proof.verify(
                    &sender,
                    &token,
                    &record.encryption_key,
                    &record.available,
                    &new_available,
                    &mut OsRng,
                )?;
                record.available = new_available;
                record.is_normalized = true;
            }
            "withdraw" => {
                let token = decode::<Address>(&args[0])?;
                let amount = decode::<Amount>(&args[1])?;
                let new_available = decode::<ChunkedCipherText>(&args[2])?;
                let proof = WithdrawalProof::from_bytes(&args[3])?;
                let record = record_mut(state, sender, token)?;
                if record.is_frozen {
                    return Err(Error::FrozenAccount);
                }
                if !record.is_normalized {
                    return Err(Error::Unnormalized);
                }
                proof.verify(
                    &sender,
                    &token,
                    &record.encryption_key,
                    amount,
                    &record.available,
                    &new_available,
                    &mut OsRng,
                )?;
                record.available = new_available;
                record.is_normalized = true;
            }
            "confidential_transfer" => {
                let token = decode::<Address>(&args[0])?;
                let recipient = decode::<Address>(&args[1])?;
                let new_sender_available = decode::<ChunkedCipherText>(&args[2])?;
                let recipient_amount = decode::<ChunkedCipherText>(&args[3])?;
                let auditor_amounts = decode_auditor_amounts(&args[4])?;
                let proof = TransferProof::from_bytes(&args[5])?;

                if auditor_amounts.len() != proof.auditors.len()
                    || auditor_amounts
                        .iter()
                        .zip(proof.auditors.iter())
                        .any(|(amount, leg)| amount != &leg.amount)
                {
                    return Err(Error::WrongNumberOfAuditors);
                }
                if let Some(asset_auditor) = state.asset_auditors.get(&token) {
                    if proof.auditors.first().map(|leg| &leg.key) != Some(asset_auditor) {
                        return Err(Error::RpcError("asset auditor missing".into()));
                    }
                }

                let sender_record = state
                    .records
                    .get(&(sender, token))
                    .cloned()
                    .ok_or(Error::NotRegistered)?;
                if sender_record.is_frozen {
                    return Err(Error::FrozenAccount);
                }
                if !sender_record.is_normalized {
                    return Err(Error::Unnormalized);
                }
                let recipient_record = state
                    .records
                    .get(&(recipient, token))
                    .cloned()
                    .ok_or(Error::NotRegistered)?;
                if recipient_record.is_frozen {
                    return Err(Error::FrozenAccount);
                }

                proof.verify(
                    &sender,
                    &token,
                    &sender_record.encryption_key,
                    &recipient_record.encryption_key,
                    &sender_record.available,
                    &new_sender_available,
                    &recipient_amount,
                    &mut OsRng,
                )?;

                let record = record_mut(state, sender, token)?;
                record.available = new_sender_available;
                record.is_normalized = true;
                let record = record_mut(state, recipient, token)?;
                record.pending += recipient_amount;
            }
            "rotate_encryption_key" => {
                let token = decode::<Address>(&args[0])?;
                let new_key = decode::<EncryptionKey>(&args[1])?;
                let new_available = decode::<ChunkedCipherText>(&args[2])?;
                let proof = RotationProof::from_bytes(&args[3])?;
                let record = record_mut(state, sender, token)?;
                if record.is_frozen {
                    return Err(Error::FrozenAccount);
                }
                if !record.is_normalized {
                    return Err(Error::Unnormalized);
                }
                // The module freezes the record while it verifies, then
                // installs the new key and clears the freeze.
                record.is_frozen = true;
                let result = proof.verify(
                    &sender,
                    &token,
                    &record.encryption_key,
                    &new_key,
                    &record.available,
                    &new_available,
                    &mut OsRng,
                );
                match result {
                    Ok(()) => {
                        record.encryption_key = new_key;
                        record.available = new_available;
                        record.is_normalized = true;
                        record.is_frozen = false;
                    }
                    Err(err) => {
                        record.is_frozen = false;
                        return Err(err);
                    }
                }
            }
            other => return Err(Error::RpcError(format!("unknown function {other}"))),
        }

        state.version += 1;
        state.executed.push(payload.function);
        if let Some(record) = state.records.get_mut(&(sender, decode::<Address>(&args[0])?)) {
            record.version = state.version;
        }

        let mut tx_hash = [0u8; 32];
        tx_hash[..8].copy_from_slice(&state.version.to_le_bytes());
        Ok(Receipt {
            tx_hash,
            version: state.version,
        })
    }
}

fn decode<T: Decode>(bytes: &[u8]) -> Result<T> {
    T::decode(&mut &bytes[..]).map_err(|_| Error::InvalidEncoding("argument"))
}

fn decode_auditor_amounts(bytes: &[u8]) -> Result<Vec<ChunkedCipherText>> {
    let input = &mut &bytes[..];
    let count = u8::decode(input).map_err(|_| Error::InvalidEncoding("auditor amounts"))?;
    let mut amounts = Vec::with_capacity(count as usize);
    for _ in 0..count {
        amounts.push(
            ChunkedCipherText::decode(input).map_err(|_| Error::InvalidEncoding("auditor amounts"))?,
        );
    }
    Ok(amounts)
}

fn record_mut<'a>(
    state: &'a mut ChainState,
    account: Address,
    token: Address,
) -> Result<&'a mut BalanceRecord> {
    state
        .records
        .get_mut(&(account, token))
        .ok_or(Error::NotRegistered)
}

#[async_trait]
impl ChainReader for MockChain {
    async fn balance_record(
        &self,
        account: Address,
        token: Address,
    ) -> Result<Option<BalanceRecord>> {
        Ok(self.lock().records.get(&(account, token)).cloned())
    }

    async fn encryption_key(
        &self,
        account: Address,
        token: Address,
    ) -> Result<Option<EncryptionKey>> {
        Ok(self
            .lock()
            .records
            .get(&(account, token))
            .map(|record| record.encryption_key))
    }

    async fn asset_auditor_key(&self, token: Address) -> Result<Option<EncryptionKey>> {
        Ok(self.lock().asset_auditors.get(&token).copied())
    }
}

#[async_trait]
impl Signer for MockSigner {
    async fn sign(&self, payload: TransactionPayload) -> Result<SignedTransaction> {
        Ok(SignedTransaction {
            payload,
            authenticator: self.account.as_bytes().to_vec(),
        })
    }
}

#[async_trait]
impl Submitter for MockChain {
    async fn submit(&self, transaction: SignedTransaction) -> Result<Receipt> {
        let sender = Address::new(
            transaction
                .authenticator
                .as_slice()
                .try_into()
                .map_err(|_| Error::InvalidEncoding("authenticator"))?,
        );
        self.execute(sender, &transaction.payload)
    }
}

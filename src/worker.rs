//! Batch operation queue.
//!
//! Producers push operation requests into a bounded channel and get a
//! completion receiver back; a single consumer drains the queue in FIFO
//! order against the client, so queued operations on one account execute
//! strictly in submission order. The bounded channel provides backpressure;
//! a cancellation token shuts the worker down, failing everything still
//! queued with [`Error::Cancelled`].

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{
    chain::{Address, ChainReader, Receipt, Signer, Submitter},
    client::ConfidentialClient,
    elgamal::{ConfidentialKeys, EncryptionKey},
    errors::{Error, Result},
    Amount,
};

/// One queued operation.
#[derive(Clone, Debug)]
pub enum Operation {
    Register {
        token: Address,
    },
    Deposit {
        token: Address,
        amount: Amount,
    },
    Rollover {
        token: Address,
    },
    Normalize {
        token: Address,
    },
    Withdraw {
        token: Address,
        amount: Amount,
    },
    Transfer {
        token: Address,
        recipient: Address,
        amount: Amount,
        auditors: Vec<EncryptionKey>,
    },
    Rotate {
        token: Address,
        new_keys: ConfidentialKeys,
    },
}

impl Operation {
    fn name(&self) -> &'static str {
        match self {
            Self::Register { .. } => "register",
            Self::Deposit { .. } => "deposit",
            Self::Rollover { .. } => "rollover",
            Self::Normalize { .. } => "normalize",
            Self::Withdraw { .. } => "withdraw",
            Self::Transfer { .. } => "transfer",
            Self::Rotate { .. } => "rotate",
        }
    }
}

struct QueuedRequest {
    operation: Operation,
    done: oneshot::Sender<Result<Receipt>>,
}

/// Producer handle. Cloneable; all clones feed the same FIFO queue.
#[derive(Clone)]
pub struct OperationQueue {
    sender: mpsc::Sender<QueuedRequest>,
}

impl OperationQueue {
    /// Enqueue an operation. Suspends when the queue is full
    /// (backpressure) and resolves once a slot frees up. The returned
    /// receiver fires when the operation completes.
    pub async fn enqueue(&self, operation: Operation) -> Result<oneshot::Receiver<Result<Receipt>>> {
        let (done, receiver) = oneshot::channel();
        self.sender
            .send(QueuedRequest { operation, done })
            .await
            .map_err(|_| Error::Cancelled)?;
        Ok(receiver)
    }

    /// Enqueue and wait for the result in one step.
    pub async fn run(&self, operation: Operation) -> Result<Receipt> {
        self.enqueue(operation)
            .await?
            .await
            .map_err(|_| Error::Cancelled)?
    }
}

/// Running consumer; aborts its loop when the token is cancelled.
pub struct OperationWorker {
    handle: JoinHandle<()>,
    cancel: CancellationToken,
}

impl OperationWorker {
    /// Spawn the consumer task over a client. `capacity` bounds the number
    /// of queued-but-unstarted operations.
    pub fn spawn<R, S, U>(
        client: Arc<ConfidentialClient<R, S, U>>,
        capacity: usize,
    ) -> (Self, OperationQueue)
    where
        R: ChainReader + 'static,
        S: Signer + 'static,
        U: Submitter + 'static,
    {
        let (sender, mut receiver) = mpsc::channel::<QueuedRequest>(capacity);
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            loop {
                let request = tokio::select! {
                    _ = token.cancelled() => break,
                    request = receiver.recv() => match request {
                        Some(request) => request,
                        None => break,
                    },
                };

                debug!(operation = request.operation.name(), "dequeued");
                let result = tokio::select! {
                    _ = token.cancelled() => Err(Error::Cancelled),
                    result = execute(&client, request.operation.clone()) => result,
                };
                // The producer may have dropped its receiver; that is its
                // way of ignoring the outcome, not an error here.
                let _ = request.done.send(result);
            }

            // Drain whatever is still queued as cancelled.
            receiver.close();
            while let Ok(request) = receiver.try_recv() {
                let _ = request.done.send(Err(Error::Cancelled));
            }
            info!("operation worker stopped");
        });

        (OperationWorker { handle, cancel }, OperationQueue { sender })
    }

    /// Stop the worker. Queued operations fail with `Cancelled`; an
    /// already submitted transaction is not reversible and is left alone.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub async fn join(self) {
        self.cancel.cancel();
        let _ = self.handle.await;
    }
}

async fn execute<R, S, U>(
    client: &ConfidentialClient<R, S, U>,
    operation: Operation,
) -> Result<Receipt>
where
    R: ChainReader,
    S: Signer,
    U: Submitter,
{
    match operation {
        Operation::Register { token } => client.register(token).await,
        Operation::Deposit { token, amount } => client.deposit(token, amount).await,
        Operation::Rollover { token } => client.rollover(token).await,
        Operation::Normalize { token } => client.normalize(token).await,
        Operation::Withdraw { token, amount } => client.withdraw(token, amount).await,
        Operation::Transfer {
            token,
            recipient,
            amount,
            auditors,
        } => client.transfer(token, recipient, amount, &auditors).await,
        Operation::Rotate { token, new_keys } => client.rotate(token, &new_keys).await,
    }
}

//! Transaction submission.
//!
//! A [`Broadcaster`] takes the unsigned transactions produced by one stage and reports one
//! [`BroadcastResult`] per transaction. A batch in which any transaction failed is returned as a
//! [`BroadcastFailure`] error carrying every result.

use std::future::Future;

use alloy_core::primitives::{Address, B256, Bytes, U256};
use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::{ledger::Receipt, state::BlockRef};

mod keyed;
mod tx;

pub use keyed::{BroadcasterConfig, KeyedBroadcaster};
pub use tx::{Eip1559Tx, SignedTx};

/// A call destined for the L1 ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnsignedTx {
    /// `None` creates a contract.
    #[serde(default)]
    pub to: Option<Address>,
    #[serde(default)]
    pub data: Bytes,
    #[serde(default)]
    pub value: U256,
    /// Gas limit; estimated by the broadcaster when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_limit: Option<u64>,
}

/// Outcome of one transaction in a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastResult {
    pub tx: UnsignedTx,
    /// The nonce the transaction was signed with, or would have been.
    pub nonce: u64,
    /// Zero when the transaction never reached the ledger.
    pub tx_hash: B256,
    pub receipt: Option<Receipt>,
    pub error: Option<String>,
}

impl BroadcastResult {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// A batch with at least one failed transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastFailure {
    pub results: Vec<BroadcastResult>,
}

impl BroadcastFailure {
    pub fn failed(&self) -> impl Iterator<Item = &BroadcastResult> {
        self.results.iter().filter(|result| !result.is_success())
    }
}

impl std::fmt::Display for BroadcastFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let failed: Vec<_> = self.failed().collect();
        write!(
            f,
            "{} of {} transactions failed",
            failed.len(),
            self.results.len()
        )?;
        if let Some(first) = failed.first() {
            write!(
                f,
                " (nonce {}: {})",
                first.nonce,
                first.error.as_deref().unwrap_or("unknown error")
            )?;
        }
        Ok(())
    }
}

impl std::error::Error for BroadcastFailure {}

/// Signs and submits transactions under one nonce sequence.
pub trait Broadcaster: Send {
    /// Add transactions to the pending batch.
    fn queue(&mut self, txs: Vec<UnsignedTx>);

    /// Send every queued transaction, in queue order, and wait for their receipts.
    fn broadcast(&mut self) -> impl Future<Output = Result<Vec<BroadcastResult>>> + Send + '_;

    /// Queue `txs` and broadcast them.
    fn submit(
        &mut self,
        txs: Vec<UnsignedTx>,
    ) -> impl Future<Output = Result<Vec<BroadcastResult>>> + Send + '_ {
        self.queue(txs);
        self.broadcast()
    }

    /// Current head of the ledger, when the broadcaster talks to one.
    fn l1_head(&self) -> impl Future<Output = Result<Option<BlockRef>>> + Send + '_;
}

/// Records transactions without sending them. Used when only the simulated ledger matters.
#[derive(Debug, Default, Clone)]
pub struct DiscardBroadcaster {
    queue: Vec<UnsignedTx>,
    discarded: Vec<UnsignedTx>,
}

impl DiscardBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything broadcast so far.
    pub fn discarded(&self) -> &[UnsignedTx] {
        &self.discarded
    }
}

impl Broadcaster for DiscardBroadcaster {
    fn queue(&mut self, txs: Vec<UnsignedTx>) {
        self.queue.extend(txs);
    }

    async fn broadcast(&mut self) -> Result<Vec<BroadcastResult>> {
        let start = self.discarded.len() as u64;
        let batch = std::mem::take(&mut self.queue);
        tracing::debug!(count = batch.len(), "Discarding transactions");

        let results = batch
            .iter()
            .enumerate()
            .map(|(index, tx)| BroadcastResult {
                tx: tx.clone(),
                nonce: start + index as u64,
                tx_hash: B256::ZERO,
                receipt: None,
                error: None,
            })
            .collect();
        self.discarded.extend(batch);
        Ok(results)
    }

    async fn l1_head(&self) -> Result<Option<BlockRef>> {
        Ok(None)
    }
}

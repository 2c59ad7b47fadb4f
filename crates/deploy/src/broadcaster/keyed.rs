//! Broadcaster backed by a single private key.

use std::time::Duration;

use alloy_core::primitives::{Address, B256};
use alloy_signer_local::PrivateKeySigner;
use anyhow::{Context, Result};
use backon::{ConstantBuilder, Retryable};

use super::{BroadcastFailure, BroadcastResult, Broadcaster, Eip1559Tx, SignedTx, UnsignedTx};
use crate::{
    ledger::{LedgerClient, Receipt},
    state::BlockRef,
};

/// Receipt polling and gas tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcasterConfig {
    /// Estimated gas is multiplied by this percentage.
    pub gas_pad_percent: u64,
    pub receipt_poll_interval: Duration,
    /// Polls per confirmation window.
    pub receipt_polls: usize,
    /// Identical re-sends after a window passes without a receipt.
    pub max_rebroadcasts: usize,
}

impl Default for BroadcasterConfig {
    fn default() -> Self {
        Self {
            gas_pad_percent: 150,
            receipt_poll_interval: Duration::from_secs(2),
            receipt_polls: 60,
            max_rebroadcasts: 3,
        }
    }
}

#[derive(Debug, derive_more::Display)]
#[display("receipt not yet available")]
struct ReceiptPending;

impl std::error::Error for ReceiptPending {}

enum Outcome {
    /// Ledger accepted the transaction; its nonce is spent.
    Sent(SignedTx, Result<Receipt>),
    /// Never reached the ledger; the nonce is still free.
    Rejected(anyhow::Error),
}

/// Signs with one key and hands out nonces from a counter seeded from the ledger.
#[derive(Debug)]
pub struct KeyedBroadcaster<L> {
    ledger: L,
    signer: PrivateKeySigner,
    chain_id: u64,
    nonce: u64,
    config: BroadcasterConfig,
    queue: Vec<UnsignedTx>,
}

impl<L: LedgerClient> KeyedBroadcaster<L> {
    /// Read the chain id and the signer's pending nonce from `ledger`.
    pub async fn new(ledger: L, signer: PrivateKeySigner, config: BroadcasterConfig) -> Result<Self> {
        let chain_id = ledger
            .chain_id()
            .await
            .context("Failed to fetch L1 chain ID")?;
        let nonce = ledger
            .nonce_at(signer.address())
            .await
            .context("Failed to fetch deployer nonce")?;

        tracing::info!(
            from = %signer.address(),
            chain_id,
            nonce,
            "Broadcaster ready"
        );

        Ok(Self {
            ledger,
            signer,
            chain_id,
            nonce,
            config,
            queue: Vec::new(),
        })
    }

    pub fn from(&self) -> Address {
        self.signer.address()
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Nonce the next transaction will use.
    pub fn next_nonce(&self) -> u64 {
        self.nonce
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    async fn prepare(&self, tx: &UnsignedTx) -> Result<Eip1559Tx> {
        let gas_limit = match tx.gas_limit {
            Some(limit) => limit,
            None => {
                let estimate = self
                    .ledger
                    .estimate_gas(self.from(), tx)
                    .await
                    .context("Gas estimation failed")?;
                estimate.saturating_mul(self.config.gas_pad_percent) / 100
            }
        };
        let fees = self
            .ledger
            .suggest_fees()
            .await
            .context("Failed to fetch fee suggestion")?;

        Ok(Eip1559Tx {
            chain_id: self.chain_id,
            nonce: self.nonce,
            max_priority_fee_per_gas: fees.priority_fee,
            max_fee_per_gas: fees.max_fee_per_gas(),
            gas_limit,
            to: tx.to,
            value: tx.value,
            data: tx.data.clone(),
        })
    }

    async fn poll_receipt(&self, tx_hash: B256) -> Result<Receipt> {
        (|| async {
            self.ledger
                .transaction_receipt(tx_hash)
                .await?
                .ok_or_else(|| anyhow::Error::new(ReceiptPending))
        })
        .retry(
            ConstantBuilder::default()
                .with_delay(self.config.receipt_poll_interval)
                .with_max_times(self.config.receipt_polls),
        )
        .notify(|err: &anyhow::Error, _: Duration| {
            if !err.is::<ReceiptPending>() {
                tracing::debug!(error = %err, %tx_hash, "Receipt lookup failed, retrying");
            }
        })
        .await
    }

    /// Wait for a receipt, re-sending the same signed bytes between polling windows.
    async fn confirm(&self, signed: &SignedTx) -> Result<Receipt> {
        let mut rebroadcasts = 0;
        loop {
            match self.poll_receipt(signed.hash).await {
                Ok(receipt) => return Ok(receipt),
                Err(err) if rebroadcasts < self.config.max_rebroadcasts => {
                    rebroadcasts += 1;
                    tracing::warn!(
                        tx_hash = %signed.hash,
                        attempt = rebroadcasts,
                        error = %err,
                        "No receipt yet, rebroadcasting"
                    );
                    if let Err(err) = self.ledger.send_raw_transaction(&signed.raw).await {
                        tracing::debug!(error = %err, tx_hash = %signed.hash, "Rebroadcast not accepted");
                    }
                }
                Err(err) => {
                    return Err(err).with_context(|| {
                        format!("Timed out waiting for receipt of {}", signed.hash)
                    });
                }
            }
        }
    }

    async fn send(&mut self, tx: &UnsignedTx) -> Result<Outcome> {
        let prepared = match self.prepare(tx).await {
            Ok(prepared) => prepared,
            Err(err) => return Ok(Outcome::Rejected(err)),
        };
        let signed = prepared.sign(&self.signer)?;

        match self.ledger.send_raw_transaction(&signed.raw).await {
            Ok(hash) if hash != signed.hash => {
                tracing::warn!(expected = %signed.hash, reported = %hash, "Ledger reported a different transaction hash");
            }
            Ok(_) => {}
            Err(err) => return Ok(Outcome::Rejected(err.context("Transaction rejected"))),
        }

        self.nonce += 1;
        tracing::info!(
            tx_hash = %signed.hash,
            nonce = prepared.nonce,
            to = ?tx.to,
            gas_limit = prepared.gas_limit,
            "Transaction sent"
        );

        let receipt = self.confirm(&signed).await;
        Ok(Outcome::Sent(signed, receipt))
    }
}

impl<L: LedgerClient> Broadcaster for KeyedBroadcaster<L> {
    fn queue(&mut self, txs: Vec<UnsignedTx>) {
        self.queue.extend(txs);
    }

    async fn broadcast(&mut self) -> Result<Vec<BroadcastResult>> {
        let batch = std::mem::take(&mut self.queue);
        let mut results = Vec::with_capacity(batch.len());
        let mut halted = false;

        for tx in batch {
            let nonce = self.nonce;
            if halted {
                results.push(BroadcastResult {
                    tx,
                    nonce,
                    tx_hash: B256::ZERO,
                    receipt: None,
                    error: Some("not sent: an earlier transaction failed".to_string()),
                });
                continue;
            }

            // signing failures abort the whole batch
            let result = match self.send(&tx).await? {
                Outcome::Rejected(err) => BroadcastResult {
                    tx,
                    nonce,
                    tx_hash: B256::ZERO,
                    receipt: None,
                    error: Some(format!("{:#}", err)),
                },
                Outcome::Sent(signed, Ok(receipt)) => {
                    let error = (!receipt.success).then(|| "transaction reverted".to_string());
                    BroadcastResult {
                        tx,
                        nonce,
                        tx_hash: signed.hash,
                        receipt: Some(receipt),
                        error,
                    }
                }
                Outcome::Sent(signed, Err(err)) => BroadcastResult {
                    tx,
                    nonce,
                    tx_hash: signed.hash,
                    receipt: None,
                    error: Some(format!("{:#}", err)),
                },
            };

            if let Some(error) = &result.error {
                tracing::error!(nonce, tx_hash = %result.tx_hash, error = %error, "Transaction failed");
                halted = true;
            }
            results.push(result);
        }

        if halted {
            return Err(BroadcastFailure { results }.into());
        }
        Ok(results)
    }

    async fn l1_head(&self) -> Result<Option<BlockRef>> {
        let head = self
            .ledger
            .latest_block()
            .await
            .context("Failed to fetch L1 head")?;
        Ok(Some(head))
    }
}
